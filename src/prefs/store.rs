//! Persistent preference region
//!
//! The emulator's settings live in a fixed 256-byte region laid out like an
//! EEPROM page: byte 0 holds an additive checksum over the remaining bytes,
//! and every setting owns a fixed slot. An erased region reads as all `0xFF`
//! and never has a valid checksum.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

/// Size of the preference region in bytes
pub const REGION_SIZE: usize = 256;

/// Value of an erased byte
pub const ERASED: u8 = 0xFF;

const CHECKSUM_OFFSET: usize = 0;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read preference file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write preference file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Value of {len} bytes does not fit the {capacity} byte slot for {field:?}")]
    SlotOverflow {
        field: FieldId,
        len: usize,
        capacity: usize,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Slots within the preference region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldId {
    Identity,
    Ssid,
    Echo,
    Linefeeds,
}

impl FieldId {
    #[cfg(test)]
    pub const ALL: [FieldId; 4] = [
        FieldId::Identity,
        FieldId::Ssid,
        FieldId::Echo,
        FieldId::Linefeeds,
    ];

    /// Byte offset of the slot
    pub const fn offset(self) -> usize {
        match self {
            FieldId::Identity => 1,
            FieldId::Ssid => 33,
            FieldId::Echo => 65,
            FieldId::Linefeeds => 66,
        }
    }

    /// Slot length in bytes
    pub const fn len(self) -> usize {
        match self {
            FieldId::Identity | FieldId::Ssid => 32,
            FieldId::Echo | FieldId::Linefeeds => 1,
        }
    }

    fn range(self) -> std::ops::Range<usize> {
        self.offset()..self.offset() + self.len()
    }
}

/// Byte-addressed preference storage with a checksum guard
pub trait PrefStore {
    /// Copy a slot into `buf`; `buf` shorter than the slot gets a prefix
    fn read(&self, field: FieldId, buf: &mut [u8]);

    /// Overwrite a slot; shorter values are zero padded
    fn write(&mut self, field: FieldId, bytes: &[u8]) -> Result<()>;

    /// True when the stored checksum matches the region contents
    fn checksum_valid(&self) -> bool;

    /// Recompute the checksum and commit the region
    fn save_checksum(&mut self) -> Result<()>;
}

/// Raw region shared by the store implementations
#[derive(Clone)]
pub struct PrefRegion {
    bytes: [u8; REGION_SIZE],
}

impl Default for PrefRegion {
    fn default() -> Self {
        Self::erased()
    }
}

impl PrefRegion {
    pub fn erased() -> Self {
        Self {
            bytes: [ERASED; REGION_SIZE],
        }
    }

    pub fn from_bytes(bytes: [u8; REGION_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; REGION_SIZE] {
        &self.bytes
    }

    /// Additive checksum over everything after the checksum byte
    pub fn compute_checksum(&self) -> u8 {
        self.bytes[CHECKSUM_OFFSET + 1..]
            .iter()
            .fold(0u8, |acc, b| acc.wrapping_add(*b))
    }

    pub fn checksum_valid(&self) -> bool {
        self.bytes[CHECKSUM_OFFSET] == self.compute_checksum()
    }

    pub fn update_checksum(&mut self) {
        self.bytes[CHECKSUM_OFFSET] = self.compute_checksum();
    }

    pub fn read(&self, field: FieldId, buf: &mut [u8]) {
        let slot = &self.bytes[field.range()];
        let n = buf.len().min(slot.len());
        buf[..n].copy_from_slice(&slot[..n]);
    }

    pub fn write(&mut self, field: FieldId, value: &[u8]) -> Result<()> {
        if value.len() > field.len() {
            return Err(StoreError::SlotOverflow {
                field,
                len: value.len(),
                capacity: field.len(),
            });
        }
        let slot = &mut self.bytes[field.range()];
        slot.fill(0);
        slot[..value.len()].copy_from_slice(value);
        Ok(())
    }
}

/// Volatile store, starts erased
#[derive(Clone, Default)]
pub struct MemoryPrefStore {
    region: PrefRegion,
}

impl MemoryPrefStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PrefStore for MemoryPrefStore {
    fn read(&self, field: FieldId, buf: &mut [u8]) {
        self.region.read(field, buf);
    }

    fn write(&mut self, field: FieldId, bytes: &[u8]) -> Result<()> {
        self.region.write(field, bytes)
    }

    fn checksum_valid(&self) -> bool {
        self.region.checksum_valid()
    }

    fn save_checksum(&mut self) -> Result<()> {
        self.region.update_checksum();
        Ok(())
    }
}

/// Store backed by a file holding the raw region.
///
/// Slot writes stay in memory until [`PrefStore::save_checksum`] commits the
/// whole region to disk.
pub struct FilePrefStore {
    path: PathBuf,
    region: PrefRegion,
}

impl FilePrefStore {
    /// Open the region file; a missing or mis-sized file reads as erased
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let region = match fs::read(&path) {
            Ok(content) => match <[u8; REGION_SIZE]>::try_from(content.as_slice()) {
                Ok(bytes) => PrefRegion::from_bytes(bytes),
                Err(_) => {
                    warn!(
                        "Preference file {} has {} bytes, expected {}; treating as erased",
                        path.display(),
                        content.len(),
                        REGION_SIZE
                    );
                    PrefRegion::erased()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No preference file at {}", path.display());
                PrefRegion::erased()
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };
        Ok(Self { path, region })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PrefStore for FilePrefStore {
    fn read(&self, field: FieldId, buf: &mut [u8]) {
        self.region.read(field, buf);
    }

    fn write(&mut self, field: FieldId, bytes: &[u8]) -> Result<()> {
        self.region.write(field, bytes)
    }

    fn checksum_valid(&self) -> bool {
        self.region.checksum_valid()
    }

    fn save_checksum(&mut self) -> Result<()> {
        self.region.update_checksum();
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                    path: self.path.clone(),
                    source,
                })?;
            }
        }
        fs::write(&self.path, self.region.as_bytes()).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
