//! Client interface for interacting with the StoreActor.
//!
//! The `StoreHandle` is a cheap-to-clone interface for sending
//! commands to the store actor and subscribing to change events.
//! Samplers write through it, session handlers read through it, and
//! the broadcaster subscribes through it.

use tokio::sync::{broadcast, mpsc, oneshot};

use ifcast_core::{InterfaceEntry, InterfaceId, InterfaceSample};

use super::commands::{StoreCommand, StoreError, StoreEvent};

/// Handle for interacting with the store actor.
///
/// All methods are async and communicate with the actor via channels;
/// channel closure maps to `StoreError::ChannelClosed` or an empty
/// answer depending on what the caller can do about it.
#[derive(Clone)]
pub struct StoreHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<StoreCommand>,

    /// Event broadcaster for subscribing to updates
    event_sender: broadcast::Sender<StoreEvent>,
}

impl StoreHandle {
    /// Create a new store handle.
    pub fn new(
        sender: mpsc::Sender<StoreCommand>,
        event_sender: broadcast::Sender<StoreEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Atomically replace an interface's current sample.
    ///
    /// # Errors
    ///
    /// - `StoreError::UnknownInterface` if the interface is not configured
    /// - `StoreError::ChannelClosed` if the actor has shut down
    pub async fn apply_sample(&self, sample: InterfaceSample) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(StoreCommand::ApplySample {
                sample: Box::new(sample),
                respond_to: tx,
            })
            .await
            .map_err(|_| StoreError::ChannelClosed)?;

        rx.await.map_err(|_| StoreError::ChannelClosed)?
    }

    /// Record a sampler failure count for observability.
    ///
    /// Fire-and-forget; send errors are ignored (the actor may be
    /// shutting down).
    pub async fn record_failure(&self, interface: InterfaceId, consecutive: u32) {
        let _ = self
            .sender
            .send(StoreCommand::RecordFailure {
                interface,
                consecutive,
            })
            .await;
    }

    /// Mark an interface as permanently failed.
    ///
    /// Fire-and-forget; the change still reaches clients through the
    /// store's event stream.
    pub async fn mark_failed(&self, interface: InterfaceId) {
        let _ = self
            .sender
            .send(StoreCommand::MarkFailed { interface })
            .await;
    }

    /// Get one interface's current entry.
    ///
    /// Returns `None` for unconfigured interfaces or if communication
    /// with the actor fails.
    pub async fn snapshot(&self, interface: InterfaceId) -> Option<InterfaceEntry> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(StoreCommand::Snapshot {
                interface,
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Get every configured interface's current entry, in
    /// configuration order.
    ///
    /// Returns an empty vector if communication with the actor fails.
    pub async fn snapshot_all(&self) -> Vec<InterfaceEntry> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(StoreCommand::SnapshotAll { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Subscribe to interface change events.
    ///
    /// This is a synchronous operation - it doesn't communicate with
    /// the actor.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.event_sender.subscribe()
    }

    /// Check if the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
