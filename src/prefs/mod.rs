//! Persisted emulator settings.
//!
//! - **store**: the checksummed byte region and its memory/file backends
//! - **settings**: the [`EmulatorConfig`] block and its key/value surface
//!
//! [`load`] and [`save`] move the settings between memory and a store. Both
//! are explicit; nothing is written back implicitly when a field changes.

pub mod settings;
pub mod store;

pub use settings::EmulatorConfig;
pub use store::{FieldId, FilePrefStore, MemoryPrefStore, PrefStore, StoreError};

use tracing::{debug, info, warn};

/// Load settings from a store.
///
/// An invalid checksum yields defaults. A slot that does not decode keeps that
/// field's default.
pub fn load(store: &dyn PrefStore) -> EmulatorConfig {
    let mut config = EmulatorConfig::default();

    if !store.checksum_valid() {
        info!("Invalid checksum, using default elm327 emulator config values");
        return config;
    }

    debug!("Valid checksum so using stored elm327 emulator config values");

    if let Some(identity) = read_text(store, FieldId::Identity) {
        config.identity = identity;
    }
    if let Some(ssid) = read_text(store, FieldId::Ssid) {
        config.ssid = ssid;
    }
    if let Some(echo) = read_flag(store, FieldId::Echo) {
        config.echo = echo;
    }
    if let Some(linefeeds) = read_flag(store, FieldId::Linefeeds) {
        config.linefeeds = linefeeds;
    }

    config
}

/// Write every field and commit a fresh checksum
pub fn save(store: &mut dyn PrefStore, config: &EmulatorConfig) -> Result<(), StoreError> {
    store.write(FieldId::Identity, config.identity.as_bytes())?;
    store.write(FieldId::Ssid, config.ssid.as_bytes())?;
    store.write(FieldId::Echo, &[config.echo as u8])?;
    store.write(FieldId::Linefeeds, &[config.linefeeds as u8])?;
    store.save_checksum()
}

fn read_text(store: &dyn PrefStore, field: FieldId) -> Option<String> {
    let mut buf = vec![0u8; field.len()];
    store.read(field, &mut buf);
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    match String::from_utf8(buf[..end].to_vec()) {
        Ok(text) => Some(text),
        Err(_) => {
            warn!("Stored {:?} is not valid text, keeping default", field);
            None
        }
    }
}

fn read_flag(store: &dyn PrefStore, field: FieldId) -> Option<bool> {
    let mut buf = [0u8; 1];
    store.read(field, &mut buf);
    match buf[0] {
        0 => Some(false),
        1 => Some(true),
        other => {
            warn!("Stored {:?} has invalid flag byte {:#04x}, keeping default", field, other);
            None
        }
    }
}
