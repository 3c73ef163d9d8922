//! Emulator settings and their mapping onto preference slots

use thiserror::Error;

use super::store::FieldId;

/// Default identification string reported by the adapter
pub const DEFAULT_IDENTITY: &str = "ELM327 v1.5";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParamError {
    #[error("Unknown parameter: {0}")]
    UnknownKey(String),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Value for {key} exceeds {max} bytes")]
    TooLong { key: &'static str, max: usize },
}

/// Settings persisted for the emulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulatorConfig {
    /// Identification string (`ATI`)
    pub identity: String,
    /// Network name for a wireless bridge; empty when unused
    pub ssid: String,
    /// Echo received characters
    pub echo: bool,
    /// Follow carriage returns with a line feed
    pub linefeeds: bool,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            identity: DEFAULT_IDENTITY.to_string(),
            ssid: String::new(),
            echo: true,
            linefeeds: false,
        }
    }
}

impl EmulatorConfig {
    /// Key names accepted by [`EmulatorConfig::set`]
    pub const KEYS: [&'static str; 4] = ["identity", "ssid", "echo", "linefeeds"];

    /// Set one field from its textual form
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ParamError> {
        let key = key.trim();
        let value = value.trim();
        match key.to_ascii_lowercase().as_str() {
            "identity" => self.identity = parse_text("identity", FieldId::Identity, value)?,
            "ssid" => self.ssid = parse_text("ssid", FieldId::Ssid, value)?,
            "echo" => self.echo = parse_flag("echo", value)?,
            "linefeeds" => self.linefeeds = parse_flag("linefeeds", value)?,
            _ => return Err(ParamError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// Textual form of one field
    pub fn get(&self, key: &str) -> Option<String> {
        match key.trim().to_ascii_lowercase().as_str() {
            "identity" => Some(self.identity.clone()),
            "ssid" => Some(self.ssid.clone()),
            "echo" => Some(flag_text(self.echo).to_string()),
            "linefeeds" => Some(flag_text(self.linefeeds).to_string()),
            _ => None,
        }
    }
}

fn parse_text(key: &'static str, field: FieldId, value: &str) -> Result<String, ParamError> {
    if value.len() > field.len() {
        return Err(ParamError::TooLong {
            key,
            max: field.len(),
        });
    }
    if value.contains('\0') {
        return Err(ParamError::InvalidValue {
            key,
            value: value.to_string(),
        });
    }
    Ok(value.to_string())
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ParamError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "on" | "true" | "yes" => Ok(true),
        "0" | "off" | "false" | "no" => Ok(false),
        _ => Err(ParamError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

fn flag_text(flag: bool) -> &'static str {
    if flag {
        "1"
    } else {
        "0"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EmulatorConfig::default();
        assert_eq!(config.identity, "ELM327 v1.5");
        assert!(config.echo);
        assert!(!config.linefeeds);
        assert!(config.ssid.is_empty());
    }

    #[test]
    fn test_set_and_get() {
        let mut config = EmulatorConfig::default();
        config.set("ssid", "garage").unwrap();
        config.set("ECHO", "off").unwrap();
        config.set(" linefeeds ", " 1 ").unwrap();

        assert_eq!(config.get("ssid").as_deref(), Some("garage"));
        assert_eq!(config.get("echo").as_deref(), Some("0"));
        assert!(config.linefeeds);
        assert_eq!(config.get("speed"), None);
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let mut config = EmulatorConfig::default();
        assert_eq!(
            config.set("speed", "55"),
            Err(ParamError::UnknownKey("speed".into()))
        );
        assert!(matches!(
            config.set("echo", "maybe"),
            Err(ParamError::InvalidValue { key: "echo", .. })
        ));
        assert_eq!(
            config.set("identity", &"x".repeat(33)),
            Err(ParamError::TooLong {
                key: "identity",
                max: 32
            })
        );
        assert_eq!(config, EmulatorConfig::default());
    }

    #[test]
    fn test_every_key_round_trips() {
        let config = EmulatorConfig::default();
        for key in EmulatorConfig::KEYS {
            let value = config.get(key).unwrap();
            let mut copy = EmulatorConfig::default();
            copy.set(key, &value).unwrap();
            assert_eq!(copy, config);
        }
    }
}
