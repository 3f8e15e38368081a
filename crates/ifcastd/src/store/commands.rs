//! Store actor commands, errors, and events.
//!
//! Message types for communicating with the `StoreActor`:
//! - `StoreCommand`: commands sent to the actor
//! - `StoreError`: errors that can occur during store operations
//! - `StoreEvent`: events published by the store for the broadcaster

use ifcast_core::{InterfaceEntry, InterfaceId, InterfaceSample};
use thiserror::Error;
use tokio::sync::oneshot;

/// Commands sent to the store actor.
///
/// Commands that need an answer carry a oneshot channel; observability
/// updates are fire-and-forget.
#[derive(Debug)]
pub enum StoreCommand {
    /// Atomically replace an interface's current sample.
    ///
    /// # Errors
    /// - `StoreError::UnknownInterface` if the sample's interface is
    ///   not configured (the sample is dropped)
    ApplySample {
        /// The new sample (boxed to reduce enum size variance)
        sample: Box<InterfaceSample>,
        /// Channel to send the result
        respond_to: oneshot::Sender<Result<(), StoreError>>,
    },

    /// Record a sampler failure count for observability.
    ///
    /// Fire-and-forget; unknown interfaces are ignored.
    RecordFailure {
        /// The interface whose sampler failed
        interface: InterfaceId,
        /// Consecutive failures so far
        consecutive: u32,
    },

    /// Mark an interface as permanently failed.
    ///
    /// Fire-and-forget; the last good sample is kept so clients can
    /// still show it alongside the failed flag.
    MarkFailed {
        /// The interface that will produce no further data
        interface: InterfaceId,
    },

    /// Get one interface's current entry.
    ///
    /// Responds `None` for unconfigured interfaces.
    Snapshot {
        /// Interface to look up
        interface: InterfaceId,
        /// Channel to send the result
        respond_to: oneshot::Sender<Option<InterfaceEntry>>,
    },

    /// Get every configured interface's current entry, in
    /// configuration order. Interfaces with no data yet are present
    /// with `sample: None`, never omitted.
    SnapshotAll {
        /// Channel to send the results
        respond_to: oneshot::Sender<Vec<InterfaceEntry>>,
    },
}

/// Errors that can occur during store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// A sample arrived for an interface that is not configured.
    #[error("interface not configured: {0}")]
    UnknownInterface(InterfaceId),

    /// The response channel was closed before receiving a response,
    /// typically because the actor shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

/// Events published by the store to the broadcaster.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// An interface's client-visible state changed: a new sample
    /// arrived or its sampler transitioned to failed.
    InterfaceChanged {
        /// The updated entry (boxed to reduce enum size variance)
        entry: Box<InterfaceEntry>,
    },
}
