//! Core adapter emulation components.
//!
//! - **transport**: byte stream the adapter talks over
//! - **line**: carriage-return line assembly with a fixed ceiling
//! - **tick**: periodic scheduling of the emulator
//! - **events**: message bus events delivered to the emulator
//! - **session**: the emulator itself, tying the pieces together
//!
//! # Architecture
//!
//! ```text
//! Emulator
//! ├── Transport (serial byte stream)
//! ├── LineBuffer (127 character line assembly)
//! ├── Dispatcher (classified line -> action)
//! └── EmulatorConfig (cached from the PrefStore)
//! ```

pub mod events;
pub mod line;
pub mod session;
pub mod tick;
pub mod transport;
