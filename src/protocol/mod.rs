//! AT line protocol
//!
//! - **classify**: decides what kind of line arrived
//! - **dispatch**: turns a classified line into an action, frames outgoing commands

pub mod classify;
pub mod dispatch;

pub use classify::classify;
pub use dispatch::{frame_command, Dispatcher, OutboundAction};
