//! ifcast protocol - Wire messages for daemon communication
//!
//! This crate provides the message types exchanged between the daemon
//! and browser clients over the WebSocket transport. All payloads are
//! internally tagged JSON records (field names, never positions) so
//! clients can evolve independently of the daemon.

pub mod message;
pub mod version;

pub use message::{ClientMessage, ServerMessage};
pub use version::ProtocolVersion;
