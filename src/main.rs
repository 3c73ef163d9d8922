//! elm327emu - an ELM327-style OBDII adapter emulator
//!
//! Speaks the adapter's line protocol over a serial byte stream: input is
//! buffered into carriage-return terminated lines, each line is classified as
//! a parameter assignment, a telemetry report or an AT command, and handled
//! accordingly. Outgoing commands are framed as `AT` + payload + CR and their
//! replies are drained before the send returns.
//!
//! # Quick Start
//!
//! ```text
//! elm327emu                       # Serve on stdin/stdout
//! elm327emu -p /dev/ttyUSB0       # Serve on a serial device
//! elm327emu -x Z -s ssid=garage   # Send ATZ and set a parameter at startup
//! elm327emu --demo                # Run a scripted session in memory
//! ```
//!
//! Logs go to `~/.elm327emu/elm327emu.log` so stdout stays free for the
//! serial stream.

mod config;
mod core;
mod prefs;
mod protocol;

use std::env;
use std::path::PathBuf;

use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::{Config, STDIO_PORT};
use crate::core::events::{DeviceEvent, EventBus, EventSender};
use crate::core::session::Emulator;
use crate::core::tick::IntervalScheduler;
use crate::core::transport::{MemoryTransport, StreamTransport, Transport};
use crate::prefs::{FilePrefStore, MemoryPrefStore, PrefStore};

/// Command line options
#[derive(Debug, Default)]
struct Args {
    config_path: Option<PathBuf>,
    port: Option<String>,
    prefs_path: Option<PathBuf>,
    debug: bool,
    demo: bool,
    /// Events injected through the bus at startup
    events: Vec<DeviceEvent>,
}

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    eprintln!("elm327emu {}", VERSION);
}

fn print_help() {
    eprintln!("elm327emu {} - ELM327 OBDII adapter emulator", VERSION);
    eprintln!();
    eprintln!("Usage: elm327emu [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <PATH>   Config file (default: ~/.elm327emu/config.toml)");
    eprintln!("  -p, --port <PORT>     Port to serve on: \"stdio\" or a device path");
    eprintln!("      --prefs <PATH>    Preference region file");
    eprintln!("  -x, --command <CMD>   Send AT<CMD> once set up (repeatable)");
    eprintln!("  -s, --set <KEY=VAL>   Set an emulator parameter (repeatable)");
    eprintln!("  -d, --debug           Debug logging");
    eprintln!("      --demo            Run a scripted in-memory session");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Parameters: identity, ssid, echo, linefeeds");
    eprintln!();
    eprintln!("The session ends when the port's input ends (EOF, hangup or read");
    eprintln!("error); settings are saved then when save_on_exit is set.");
    eprintln!("Interrupting with Ctrl-C ends the process without saving.");
    eprintln!();
    eprintln!("Configuration: ~/.elm327emu/config.toml");
    eprintln!("Log file:      ~/.elm327emu/elm327emu.log");
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut parsed = Args::default();
    let mut i = 1;

    let value = |i: &mut usize, flag: &str| -> Result<String, String> {
        *i += 1;
        args.get(*i)
            .cloned()
            .ok_or_else(|| format!("Missing argument for {}", flag))
    };

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-c" | "--config" => {
                parsed.config_path = Some(PathBuf::from(value(&mut i, "--config")?));
            }
            "-p" | "--port" => {
                parsed.port = Some(value(&mut i, "--port")?);
            }
            "--prefs" => {
                parsed.prefs_path = Some(PathBuf::from(value(&mut i, "--prefs")?));
            }
            "-x" | "--command" => {
                parsed
                    .events
                    .push(DeviceEvent::InjectCommand(value(&mut i, "--command")?));
            }
            "-s" | "--set" => {
                let pair = value(&mut i, "--set")?;
                let (key, val) = pair
                    .split_once('=')
                    .ok_or_else(|| format!("Expected KEY=VALUE, got {}", pair))?;
                parsed.events.push(DeviceEvent::SetParameter {
                    key: key.to_string(),
                    value: val.to_string(),
                });
            }
            "-d" | "--debug" => {
                parsed.debug = true;
            }
            "--demo" => {
                parsed.demo = true;
            }
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    // Announce the batch of parameter changes once they have been applied
    if parsed
        .events
        .iter()
        .any(|e| matches!(e, DeviceEvent::SetParameter { .. }))
    {
        parsed.events.push(DeviceEvent::ConfigChange);
    }

    Ok(parsed)
}

/// Install the file logger; RUST_LOG overrides the configured level
fn init_logging(level: &str) {
    let log_path = config::config_dir()
        .map(|dir| dir.join("elm327emu.log"))
        .unwrap_or_else(|| PathBuf::from("elm327emu.log"));

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

/// True when the installed subscriber records debug events
fn debug_enabled() -> bool {
    tracing::enabled!(Level::DEBUG)
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let args = match parse_args(&args) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    let mut config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    if args.debug {
        config.log_level = "debug".to_string();
    }
    if let Some(prefs_path) = &args.prefs_path {
        config.prefs_path = Some(prefs_path.clone());
    }

    init_logging(&config.log_level);
    info!("elm327emu {} starting...", VERSION);

    if args.demo {
        return run_demo(&config);
    }

    let port = args
        .port
        .clone()
        .unwrap_or_else(|| config.port().to_string());
    info!(
        "System type {} selects {:?} port: {}",
        config.system_type,
        config.port_selection(),
        port
    );

    let transport = if port == STDIO_PORT {
        StreamTransport::stdio()
    } else {
        StreamTransport::device(&port)?
    };
    let store = FilePrefStore::open(config.prefs_path())?;
    info!("Preferences: {}", store.path().display());

    let mut emulator = Emulator::new(transport, store)
        .with_verbose(debug_enabled())
        .with_baud(config.baud)
        .with_tick_interval(config.tick_interval());

    let (tx, mut bus) = EventBus::channel();
    queue_events(&tx, args.events);

    run(&mut emulator, &mut bus, &config)
}

fn queue_events(tx: &EventSender, events: Vec<DeviceEvent>) {
    for event in events {
        // The bus is owned by the run loop and outlives this call
        let _ = tx.send(event);
    }
}

/// Drive the emulator until its transport closes
fn run<T: Transport, S: PrefStore>(
    emulator: &mut Emulator<T, S>,
    bus: &mut EventBus,
    config: &Config,
) -> anyhow::Result<()> {
    let mut scheduler = IntervalScheduler::new();

    emulator.load_configuration();
    emulator.setup(&mut scheduler)?;

    while scheduler.wait_tick() {
        emulator.on_tick();
        for event in bus.drain() {
            emulator.handle_event(event);
        }
        emulator.process();

        if emulator.is_closed() {
            if emulator.cursor() > 0 {
                warn!(
                    "Input ended inside a line, dropping {} buffered characters",
                    emulator.cursor()
                );
            }
            info!("Transport closed after {} ticks", emulator.tick_count());
            break;
        }
    }

    if config.save_on_exit {
        if let Err(e) = emulator.save_configuration() {
            warn!("Failed to save configuration: {}", e);
        }
    }

    Ok(())
}

/// Scripted session over an in-memory transport
fn run_demo(config: &Config) -> anyhow::Result<()> {
    let mut transport = MemoryTransport::new();
    transport.push_input(b"ssid=garage\r\n12,34,56\r\nATI\r\n");
    transport.queue_reply(b"echo=0\r\n");
    transport.close();

    let mut emulator = Emulator::new(transport, MemoryPrefStore::new())
        .with_verbose(debug_enabled())
        .with_tick_interval(config.tick_interval());

    let (tx, mut bus) = EventBus::channel();
    queue_events(
        &tx,
        vec![
            DeviceEvent::SetParameter {
                key: "identity".into(),
                value: "ELM327 v2.1".into(),
            },
            DeviceEvent::InjectCommand("E0".into()),
            DeviceEvent::ConfigChange,
        ],
    );

    run(&mut emulator, &mut bus, config)?;

    eprintln!(
        "Sent: {:?}",
        String::from_utf8_lossy(emulator.transport().output())
    );
    for key in prefs::EmulatorConfig::KEYS {
        eprintln!(
            "{} = {}",
            key,
            emulator.config().get(key).unwrap_or_default()
        );
    }

    Ok(())
}
