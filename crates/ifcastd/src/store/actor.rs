//! Store actor - owns the per-interface state and processes commands.
//!
//! The StoreActor is the single owner of interface state in the
//! system. It receives commands via an mpsc channel and publishes
//! change events via broadcast. Because all mutations happen inside
//! one task, a reader can never observe a partially applied sample:
//! replacement is wholesale or not at all.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use ifcast_core::{InterfaceConfig, InterfaceEntry, InterfaceId, InterfaceSample, LinkStatus};

use super::commands::{StoreCommand, StoreError, StoreEvent};

/// Per-interface state held by the actor.
struct InterfaceState {
    config: InterfaceConfig,
    status: LinkStatus,
    consecutive_failures: u32,
    sample: Option<Arc<InterfaceSample>>,
}

impl InterfaceState {
    fn new(config: InterfaceConfig) -> Self {
        Self {
            config,
            status: LinkStatus::Waiting,
            consecutive_failures: 0,
            sample: None,
        }
    }

    fn entry(&self) -> InterfaceEntry {
        InterfaceEntry {
            id: self.config.id.clone(),
            capacity_bps: self.config.capacity_bps,
            status: self.status,
            consecutive_failures: self.consecutive_failures,
            sample: self.sample.as_deref().cloned(),
        }
    }
}

/// The store actor - owns all interface state.
///
/// Seeded from configuration: every configured interface exists from
/// startup in `Waiting` status, so `SnapshotAll` can always answer for
/// the full set. Samples for unconfigured interfaces are rejected.
pub struct StoreActor {
    /// Command receiver
    receiver: mpsc::Receiver<StoreCommand>,

    /// State per configured interface
    interfaces: HashMap<InterfaceId, InterfaceState>,

    /// Configuration order, for stable SnapshotAll output
    order: Vec<InterfaceId>,

    /// Event publisher consumed by the broadcaster
    event_publisher: broadcast::Sender<StoreEvent>,
}

impl StoreActor {
    /// Creates a new store actor seeded with the configured
    /// interfaces.
    pub fn new(
        configs: Vec<InterfaceConfig>,
        receiver: mpsc::Receiver<StoreCommand>,
        event_publisher: broadcast::Sender<StoreEvent>,
    ) -> Self {
        let order: Vec<InterfaceId> = configs.iter().map(|c| c.id.clone()).collect();
        let interfaces = configs
            .into_iter()
            .map(|c| (c.id.clone(), InterfaceState::new(c)))
            .collect();
        Self {
            receiver,
            interfaces,
            order,
            event_publisher,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders
    /// dropped). Call this in a spawned task.
    pub async fn run(mut self) {
        info!(interfaces = self.interfaces.len(), "Store actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("Store actor stopped");
    }

    fn handle_command(&mut self, cmd: StoreCommand) {
        match cmd {
            StoreCommand::ApplySample { sample, respond_to } => {
                let result = self.handle_apply_sample(*sample);
                // Ignore send error - the sampler may have shut down
                let _ = respond_to.send(result);
            }
            StoreCommand::RecordFailure {
                interface,
                consecutive,
            } => {
                self.handle_record_failure(interface, consecutive);
            }
            StoreCommand::MarkFailed { interface } => {
                self.handle_mark_failed(interface);
            }
            StoreCommand::Snapshot {
                interface,
                respond_to,
            } => {
                let result = self.interfaces.get(&interface).map(InterfaceState::entry);
                let _ = respond_to.send(result);
            }
            StoreCommand::SnapshotAll { respond_to } => {
                let result = self.snapshot_all();
                let _ = respond_to.send(result);
            }
        }
    }

    /// Replaces an interface's sample wholesale and publishes the
    /// change.
    fn handle_apply_sample(&mut self, sample: InterfaceSample) -> Result<(), StoreError> {
        let Some(state) = self.interfaces.get_mut(&sample.interface) else {
            warn!(
                interface = %sample.interface,
                "Dropping sample for unconfigured interface"
            );
            return Err(StoreError::UnknownInterface(sample.interface));
        };

        debug!(
            interface = %sample.interface,
            connections = sample.top_connections.len(),
            combined_bps = sample.totals.combined.short_bps,
            "Sample applied"
        );

        state.sample = Some(Arc::new(sample));
        state.status = LinkStatus::Live;
        state.consecutive_failures = 0;

        let entry = state.entry();
        self.publish(entry);
        Ok(())
    }

    fn handle_record_failure(&mut self, interface: InterfaceId, consecutive: u32) {
        let Some(state) = self.interfaces.get_mut(&interface) else {
            debug!(interface = %interface, "Failure report for unconfigured interface, ignoring");
            return;
        };
        state.consecutive_failures = consecutive;

        debug!(
            interface = %interface,
            consecutive_failures = consecutive,
            "Sampler failure recorded"
        );
    }

    fn handle_mark_failed(&mut self, interface: InterfaceId) {
        let Some(state) = self.interfaces.get_mut(&interface) else {
            debug!(interface = %interface, "Failure mark for unconfigured interface, ignoring");
            return;
        };

        state.status = LinkStatus::Failed;

        warn!(
            interface = %interface,
            consecutive_failures = state.consecutive_failures,
            "Interface marked permanently failed"
        );

        let entry = state.entry();
        self.publish(entry);
    }

    fn snapshot_all(&self) -> Vec<InterfaceEntry> {
        self.order
            .iter()
            .filter_map(|id| self.interfaces.get(id))
            .map(InterfaceState::entry)
            .collect()
    }

    fn publish(&self, entry: InterfaceEntry) {
        // No subscribers is fine (e.g. broadcaster not started yet)
        let _ = self.event_publisher.send(StoreEvent::InterfaceChanged {
            entry: Box::new(entry),
        });
    }

    /// Returns the number of configured interfaces.
    #[cfg(test)]
    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }
}
