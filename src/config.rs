//! Host configuration for elm327emu.
//!
//! Loaded from `~/.elm327emu/config.toml`; every field is optional:
//!
//! ```toml
//! # 3 and 4 bind the primary port, anything else the legacy port
//! system_type = 3
//! primary_port = "stdio"
//! legacy_port = "/dev/ttyS2"
//!
//! tick_interval_ms = 200
//! baud = 9600
//!
//! # Persisted emulator settings (256 byte region)
//! prefs_path = "/home/me/.elm327emu/prefs.bin"
//!
//! # error, warn, info, debug, trace
//! log_level = "info"
//! save_on_exit = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::transport::DEFAULT_BAUD;

/// Port name meaning the process's stdin/stdout
pub const STDIO_PORT: &str = "stdio";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hardware generation; decides which port the adapter is bound to
    pub system_type: u8,
    /// Port used by system types 3 and 4
    pub primary_port: String,
    /// Port used by older hardware
    pub legacy_port: String,
    pub tick_interval_ms: u64,
    pub baud: u32,
    /// Preference region file; defaults to `~/.elm327emu/prefs.bin`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefs_path: Option<PathBuf>,
    pub log_level: String,
    /// Save emulator settings when the session ends
    pub save_on_exit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            system_type: 3,
            primary_port: STDIO_PORT.to_string(),
            legacy_port: STDIO_PORT.to_string(),
            tick_interval_ms: 200,
            baud: DEFAULT_BAUD,
            prefs_path: None,
            log_level: "info".to_string(),
            save_on_exit: true,
        }
    }
}

/// Which physical port the adapter is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSelection {
    Primary,
    Legacy,
}

impl PortSelection {
    pub fn from_system_type(system_type: u8) -> Self {
        match system_type {
            3 | 4 => PortSelection::Primary,
            _ => PortSelection::Legacy,
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to defaults
    pub fn load() -> Self {
        match Self::get_config_path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|e| {
                tracing::warn!("{}; using defaults", e);
                Self::default()
            }),
            _ => Self::default(),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get config file path
    pub fn get_config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn port_selection(&self) -> PortSelection {
        PortSelection::from_system_type(self.system_type)
    }

    /// Port name resolved from the system type
    pub fn port(&self) -> &str {
        match self.port_selection() {
            PortSelection::Primary => &self.primary_port,
            PortSelection::Legacy => &self.legacy_port,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Preference region path, configured or default
    pub fn prefs_path(&self) -> PathBuf {
        self.prefs_path
            .clone()
            .or_else(|| config_dir().map(|dir| dir.join("prefs.bin")))
            .unwrap_or_else(|| PathBuf::from("prefs.bin"))
    }
}

/// `~/.elm327emu`, created on demand
pub fn config_dir() -> Option<PathBuf> {
    let dir = home_dir()?.join(".elm327emu");
    if !dir.exists() {
        let _ = fs::create_dir_all(&dir);
    }
    Some(dir)
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_selection() {
        assert_eq!(PortSelection::from_system_type(3), PortSelection::Primary);
        assert_eq!(PortSelection::from_system_type(4), PortSelection::Primary);
        assert_eq!(PortSelection::from_system_type(2), PortSelection::Legacy);
        assert_eq!(PortSelection::from_system_type(5), PortSelection::Legacy);
    }

    #[test]
    fn test_port_follows_system_type() {
        let mut config = Config {
            primary_port: "/dev/ttyS1".into(),
            legacy_port: "/dev/ttyS2".into(),
            ..Config::default()
        };
        assert_eq!(config.port(), "/dev/ttyS1");
        config.system_type = 1;
        assert_eq!(config.port(), "/dev/ttyS2");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str("system_type = 2\nlog_level = \"debug\"").unwrap();
        assert_eq!(config.system_type, 2);
        assert_eq!(config.baud, 9600);
        assert_eq!(config.tick_interval(), Duration::from_millis(200));
        assert_eq!(config.log_level, "debug");
        assert!(config.save_on_exit);
    }

    #[test]
    fn test_written_file_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config {
            system_type: 1,
            prefs_path: Some(dir.path().join("prefs.bin")),
            save_on_exit: false,
            ..Config::default()
        };

        fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_parse_error_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "system_type = \"three\"").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
