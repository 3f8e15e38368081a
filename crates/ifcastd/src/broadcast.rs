//! Client registry and update fan-out.
//!
//! Every connected client owns one bounded queue of serialized
//! messages. The broadcaster serializes each store change once and
//! pushes the shared string onto every queue; a full queue drops its
//! oldest entry and keeps the newest, so a slow client goes stale but
//! can never stall the broadcast, other clients, or the sampling
//! pipeline.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ifcast_protocol::ServerMessage;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::store::{StoreEvent, StoreHandle};

/// Unique identifier for one connected client session.
pub type SessionId = u64;

/// Bounded outbound queue for one client session.
///
/// Single consumer (the session's write loop); any number of pushers.
/// `push` never waits: when the queue is at capacity the oldest entry
/// is dropped (latest-state-wins per client).
pub struct SessionQueue {
    capacity: usize,
    inner: Mutex<QueueInner>,
    notify: Notify,
}

struct QueueInner {
    items: VecDeque<Arc<str>>,
    closed: bool,
    dropped: u64,
}

impl SessionQueue {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                closed: false,
                dropped: 0,
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueues a message, dropping the oldest queued entry if the
    /// queue is full. No-op after close.
    pub async fn push(&self, item: Arc<str>) {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return;
        }
        if inner.items.len() >= self.capacity {
            inner.items.pop_front();
            inner.dropped += 1;
        }
        inner.items.push_back(item);
        drop(inner);
        self.notify.notify_one();
    }

    /// Dequeues the next message in FIFO order, waiting until one is
    /// available. Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<Arc<str>> {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(item) = inner.items.pop_front() {
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Closes the queue, waking the consumer.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        drop(inner);
        self.notify.notify_one();
    }

    /// Number of currently queued messages.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.items.len()
    }

    /// True when nothing is queued.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.items.is_empty()
    }

    /// Total messages dropped to make room for newer ones.
    pub async fn dropped(&self) -> u64 {
        self.inner.lock().await.dropped
    }
}

/// One registered client session: its id and its queue.
pub struct ClientSession {
    pub id: SessionId,
    pub queue: Arc<SessionQueue>,
}

/// Errors that can occur registering a client.
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("too many clients (max: {max})")]
    RegistryFull { max: usize },
}

/// Registry of connected client sessions.
///
/// Sole owner of session lifetime: sessions exist from `register` to
/// `unregister`, and their queues are closed on removal. Safe under
/// concurrent connect/disconnect.
pub struct ClientRegistry {
    max_clients: usize,
    queue_depth: usize,
    counter: AtomicU64,
    sessions: Mutex<HashMap<SessionId, Arc<SessionQueue>>>,
}

impl ClientRegistry {
    /// Creates a registry with the given client and queue limits.
    pub fn new(max_clients: usize, queue_depth: usize) -> Self {
        Self {
            max_clients,
            queue_depth,
            counter: AtomicU64::new(0),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a new session, allocating its queue.
    ///
    /// # Errors
    ///
    /// `BroadcastError::RegistryFull` when the client limit is
    /// reached.
    pub async fn register(&self) -> Result<ClientSession, BroadcastError> {
        let mut sessions = self.sessions.lock().await;

        if sessions.len() >= self.max_clients {
            warn!(
                current = sessions.len(),
                max = self.max_clients,
                "Registry is full, rejecting client"
            );
            return Err(BroadcastError::RegistryFull {
                max: self.max_clients,
            });
        }

        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(SessionQueue::new(self.queue_depth));
        sessions.insert(id, Arc::clone(&queue));

        info!(session_id = id, total_clients = sessions.len(), "Client registered");
        Ok(ClientSession { id, queue })
    }

    /// Removes a session and closes its queue.
    pub async fn unregister(&self, id: SessionId) {
        let removed = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(&id)
        };

        if let Some(queue) = removed {
            queue.close().await;
            let dropped = queue.dropped().await;
            info!(session_id = id, dropped_updates = dropped, "Client unregistered");
        }
    }

    /// Enqueues a serialized message onto every live session queue.
    ///
    /// Pushes never wait, so one session's backlog cannot delay the
    /// others.
    pub async fn broadcast(&self, payload: Arc<str>) {
        let queues: Vec<Arc<SessionQueue>> = {
            let sessions = self.sessions.lock().await;
            sessions.values().map(Arc::clone).collect()
        };

        for queue in queues {
            queue.push(Arc::clone(&payload)).await;
        }
    }

    /// Number of currently registered sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

/// Spawns the broadcaster task.
///
/// Receives store change events, serializes each update once, and
/// fans the shared payload out to every registered session. Uses
/// cooperative shutdown via CancellationToken.
pub fn spawn_broadcaster(
    store: &StoreHandle,
    registry: Arc<ClientRegistry>,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    let mut event_rx = store.subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("Broadcaster shutting down");
                    break;
                }

                result = event_rx.recv() => {
                    match result {
                        Ok(StoreEvent::InterfaceChanged { entry }) => {
                            let msg = ServerMessage::interface_update(*entry);
                            let json = match serde_json::to_string(&msg) {
                                Ok(j) => j,
                                Err(e) => {
                                    error!(error = %e, "Failed to serialize update");
                                    continue;
                                }
                            };
                            registry.broadcast(Arc::from(json)).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "Broadcaster lagged, skipped store events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("Store event channel closed");
                            break;
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(n: u64) -> Arc<str> {
        Arc::from(format!("update-{n}"))
    }

    #[tokio::test]
    async fn test_queue_fifo_order() {
        let queue = SessionQueue::new(8);
        queue.push(payload(1)).await;
        queue.push(payload(2)).await;
        queue.push(payload(3)).await;

        assert_eq!(queue.pop().await.as_deref(), Some("update-1"));
        assert_eq!(queue.pop().await.as_deref(), Some("update-2"));
        assert_eq!(queue.pop().await.as_deref(), Some("update-3"));
    }

    #[tokio::test]
    async fn test_queue_drops_oldest_when_full() {
        let queue = SessionQueue::new(2);
        queue.push(payload(1)).await;
        queue.push(payload(2)).await;
        queue.push(payload(3)).await;

        assert_eq!(queue.len().await, 2);
        assert_eq!(queue.dropped().await, 1);
        assert_eq!(queue.pop().await.as_deref(), Some("update-2"));
        assert_eq!(queue.pop().await.as_deref(), Some("update-3"));
    }

    #[tokio::test]
    async fn test_queue_pop_waits_for_push() {
        let queue = Arc::new(SessionQueue::new(4));

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        queue.push(payload(9)).await;

        let item = consumer.await.unwrap();
        assert_eq!(item.as_deref(), Some("update-9"));
    }

    #[tokio::test]
    async fn test_queue_close_wakes_consumer() {
        let queue = Arc::new(SessionQueue::new(4));

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        queue.close().await;

        assert!(consumer.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_queue_drains_before_reporting_closed() {
        let queue = SessionQueue::new(4);
        queue.push(payload(1)).await;
        queue.close().await;

        assert_eq!(queue.pop().await.as_deref(), Some("update-1"));
        assert!(queue.pop().await.is_none());
    }

    #[tokio::test]
    async fn test_push_after_close_is_noop() {
        let queue = SessionQueue::new(4);
        queue.close().await;
        queue.push(payload(1)).await;
        assert!(queue.pop().await.is_none());
    }

    #[tokio::test]
    async fn test_registry_register_unregister() {
        let registry = ClientRegistry::new(4, 8);

        let session = registry.register().await.unwrap();
        assert_eq!(registry.session_count().await, 1);

        registry.unregister(session.id).await;
        assert_eq!(registry.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_registry_enforces_max_clients() {
        let registry = ClientRegistry::new(2, 8);

        let _a = registry.register().await.unwrap();
        let _b = registry.register().await.unwrap();

        assert!(matches!(
            registry.register().await,
            Err(BroadcastError::RegistryFull { max: 2 })
        ));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_sessions() {
        let registry = ClientRegistry::new(4, 8);
        let a = registry.register().await.unwrap();
        let b = registry.register().await.unwrap();

        registry.broadcast(payload(1)).await;

        assert_eq!(a.queue.pop().await.as_deref(), Some("update-1"));
        assert_eq!(b.queue.pop().await.as_deref(), Some("update-1"));
    }

    #[tokio::test]
    async fn test_slow_session_does_not_block_others() {
        // One session never drains its depth-1 queue; the other must
        // still see every update.
        let registry = ClientRegistry::new(4, 1);
        let slow = registry.register().await.unwrap();
        let fast = registry.register().await.unwrap();

        for n in 0..100 {
            registry.broadcast(payload(n)).await;
            assert_eq!(fast.queue.pop().await.as_deref(), Some(format!("update-{n}").as_str()));
        }

        // The slow session kept only the newest update.
        assert_eq!(slow.queue.len().await, 1);
        assert_eq!(slow.queue.dropped().await, 99);
        assert_eq!(slow.queue.pop().await.as_deref(), Some("update-99"));
    }

    #[tokio::test]
    async fn test_unregister_closes_queue() {
        let registry = ClientRegistry::new(4, 8);
        let session = registry.register().await.unwrap();

        registry.unregister(session.id).await;
        assert!(session.queue.pop().await.is_none());
    }
}
