//! Emulator session
//!
//! Owns the line buffer, dispatcher, settings and transport of one emulated
//! adapter, and exposes the entry points the host loop drives: `setup`,
//! `on_tick`, `process`, `handle_event` and `send_command`.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::events::DeviceEvent;
use super::line::LineBuffer;
use super::tick::{TickScheduler, TICK_INTERVAL};
use super::transport::{ReadByte, Transport, TransportError, DEFAULT_BAUD};
use crate::prefs::{self, EmulatorConfig, PrefStore, StoreError};
use crate::protocol::{classify, frame_command, Dispatcher, OutboundAction};

#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("A command is already waiting for its reply")]
    ReentrantSend,

    #[error("Emulator has not been set up")]
    NotInitialized,
}

/// Where the session is in its processing cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    /// Set up, nothing processed yet
    Ready,
    /// No partial line buffered
    Idle,
    /// A partial line is buffered
    Buffering,
    /// A completed line is being handled
    Dispatching,
}

/// One emulated ELM327 adapter
pub struct Emulator<T: Transport, S: PrefStore> {
    transport: T,
    store: S,
    config: EmulatorConfig,
    dispatcher: Dispatcher,
    buffer: LineBuffer,
    state: SessionState,
    tick_counter: u64,
    baud: u32,
    tick_interval: Duration,
    /// Set while `send_command` drains the reply
    awaiting_reply: bool,
}

impl<T: Transport, S: PrefStore> Emulator<T, S> {
    pub fn new(transport: T, store: S) -> Self {
        Self {
            transport,
            store,
            config: EmulatorConfig::default(),
            dispatcher: Dispatcher::new(false),
            buffer: LineBuffer::new(),
            state: SessionState::Uninitialized,
            tick_counter: 0,
            baud: DEFAULT_BAUD,
            tick_interval: TICK_INTERVAL,
            awaiting_reply: false,
        }
    }

    /// Log unhandled protocol lines at debug level
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.dispatcher = Dispatcher::new(verbose);
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_baud(mut self, baud: u32) -> Self {
        self.baud = baud;
        self
    }

    /// Register for ticks, open the transport and reset session state
    pub fn setup(&mut self, scheduler: &mut dyn TickScheduler) -> Result<(), EmulatorError> {
        scheduler.detach();

        self.tick_counter = 0;
        self.buffer.reset();
        self.awaiting_reply = false;
        self.transport.open(self.baud)?;

        scheduler.attach(self.tick_interval);
        self.state = SessionState::Ready;
        info!(
            "ELM327 emulator ready at {} baud, tick {:?}",
            self.baud, self.tick_interval
        );
        Ok(())
    }

    /// Periodic tick from the scheduler
    pub fn on_tick(&mut self) {
        self.tick_counter = self.tick_counter.wrapping_add(1);
    }

    /// Drain everything the transport has buffered.
    ///
    /// Returns the number of completed lines. Never blocks: returns as soon as
    /// the transport has nothing more to give.
    pub fn process(&mut self) -> usize {
        if self.state == SessionState::Uninitialized {
            debug!("process called before setup");
            return 0;
        }

        let mut lines = 0;
        while self.transport.available() {
            let input = self.transport.read();
            if input == ReadByte::EndOfStream {
                break;
            }

            self.state = SessionState::Buffering;
            let action = match self.buffer.feed(input) {
                Some(line) => {
                    let category = classify(&line);
                    Some(self.dispatcher.dispatch(category, &line))
                }
                None => None,
            };

            if let Some(action) = action {
                self.state = SessionState::Dispatching;
                self.apply(action);
                lines += 1;
            }
        }

        self.state = if self.buffer.cursor() == 0 {
            SessionState::Idle
        } else {
            SessionState::Buffering
        };
        lines
    }

    /// Send an adapter command and consume its reply before returning.
    ///
    /// `AT` and the terminator are added here. Returns the number of reply
    /// lines processed.
    ///
    /// Nothing handled during the drain sends today; the guard stops a reply
    /// handler that does from recursing into the drain.
    pub fn send_command(&mut self, command: &str) -> Result<usize, EmulatorError> {
        if self.state == SessionState::Uninitialized {
            return Err(EmulatorError::NotInitialized);
        }
        if self.awaiting_reply {
            return Err(EmulatorError::ReentrantSend);
        }

        self.transport.write(&frame_command(command))?;

        self.awaiting_reply = true;
        let lines = self.process();
        self.awaiting_reply = false;
        Ok(lines)
    }

    /// Handle an event from the message bus
    pub fn handle_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::SetParameter { key, value } => self.set_parameter(&key, &value),
            DeviceEvent::ConfigChange => {
                let config = &self.config;
                info!(
                    "Configuration changed: identity {:?}, ssid {:?}, echo {}, linefeeds {}",
                    config.identity, config.ssid, config.echo, config.linefeeds
                );
            }
            DeviceEvent::InjectCommand(command) => {
                if let Err(e) = self.send_command(&command) {
                    warn!("Failed to send command AT{}: {}", command, e);
                }
            }
        }
    }

    /// Replace the in-memory settings with what the store holds
    pub fn load_configuration(&mut self) {
        self.config = prefs::load(&self.store);
    }

    /// Write the in-memory settings to the store
    pub fn save_configuration(&mut self) -> Result<(), StoreError> {
        prefs::save(&mut self.store, &self.config)?;
        info!("Saved elm327 emulator config");
        Ok(())
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    #[cfg(test)]
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    /// Characters buffered for the current partial line
    pub fn cursor(&self) -> usize {
        self.buffer.cursor()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[cfg(test)]
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// True once the transport has no more input coming
    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    fn apply(&mut self, action: OutboundAction) {
        match action {
            OutboundAction::ApplyParameter(key, value) => self.set_parameter(&key, &value),
            OutboundAction::LogTelemetry(line) => info!("{}", line),
            OutboundAction::LogDebug(line) => debug!("{}", line),
            OutboundAction::NoOp => {}
        }
    }

    fn set_parameter(&mut self, key: &str, value: &str) {
        match self.config.set(key, value) {
            Ok(()) => info!("Parameter {} set to {:?}", key.trim(), value.trim()),
            Err(e) => warn!("Ignoring parameter change: {}", e),
        }
    }
}
