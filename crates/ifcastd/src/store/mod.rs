//! Interface state store.
//!
//! One entry per configured interface, holding the latest valid
//! sample. Updated only by that interface's sampler task; read by
//! session handlers and the broadcaster. Implemented as an actor so
//! replacement is atomic: a reader sees the previous sample or the new
//! one, never a mix.

mod actor;
mod commands;
mod handle;

pub use actor::StoreActor;
pub use commands::{StoreCommand, StoreError, StoreEvent};
pub use handle::StoreHandle;

use ifcast_core::InterfaceConfig;
use tokio::sync::{broadcast, mpsc};

/// Command channel depth; writers are few (one per interface) and the
/// actor drains fast.
const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Event channel depth for the broadcaster subscription.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Spawns the store actor and returns a handle to it.
///
/// The actor runs until every handle is dropped.
pub fn spawn_store(configs: Vec<InterfaceConfig>) -> StoreHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (event_tx, _event_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    let actor = StoreActor::new(configs, cmd_rx, event_tx.clone());
    tokio::spawn(actor.run());

    StoreHandle::new(cmd_tx, event_tx)
}
