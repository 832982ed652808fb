use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use circle_types::events::LiveEvent;

/// Outbound frames buffered per connection before sends start failing.
pub const QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("cannot serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("outbound queue for {0} is full")]
    QueueFull(String),

    #[error("connection for {0} is closed")]
    Closed(String),
}

/// The hub's side of one live connection: a bounded queue drained by the
/// connection's writer task. Dropping the handle closes the connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: Uuid,
    queue: mpsc::Sender<String>,
}

impl ConnectionHandle {
    /// A new handle plus the receiver its writer task drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (queue, rx) = mpsc::channel(capacity);
        (
            Self {
                id: Uuid::new_v4(),
                queue,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn push(&self, identity: &str, frame: String) -> Result<(), HubError> {
        self.queue.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => HubError::QueueFull(identity.to_string()),
            mpsc::error::TrySendError::Closed(_) => HubError::Closed(identity.to_string()),
        })
    }
}

/// Outcome of a fan-out.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Recipients that were online and got the event queued.
    pub delivered: usize,
    /// Recipients that were not connected.
    pub offline: usize,
    /// Recipients whose connection refused the event.
    pub failed: usize,
}

/// Registry of live connections, at most one per identity.
///
/// Every operation takes the same lock for its whole duration, so a
/// broadcast never interleaves with a register or unregister. Sends only
/// enqueue and never wait on a socket while the lock is held.
#[derive(Clone, Default)]
pub struct ConnectionHub {
    entries: Arc<Mutex<HashMap<String, ConnectionHandle>>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` for `identity`. A previous connection for the same
    /// identity is dropped, which closes it; its id is returned.
    pub async fn register(&self, identity: &str, handle: ConnectionHandle) -> Option<Uuid> {
        let conn_id = handle.id();
        let displaced = self
            .entries
            .lock()
            .await
            .insert(identity.to_string(), handle)
            .map(|old| old.id());

        match displaced {
            Some(old) => info!(
                "{} reconnected: connection {} replaces {}",
                identity, conn_id, old
            ),
            None => debug!("{} registered connection {}", identity, conn_id),
        }
        displaced
    }

    /// Remove whatever connection `identity` has.
    pub async fn unregister(&self, identity: &str) -> bool {
        self.entries.lock().await.remove(identity).is_some()
    }

    /// Remove `identity`'s entry only if it is still connection `conn_id`,
    /// so a closing connection never evicts the one that replaced it.
    pub async fn unregister_connection(&self, identity: &str, conn_id: Uuid) -> bool {
        let mut entries = self.entries.lock().await;
        match entries.get(identity) {
            Some(handle) if handle.id() == conn_id => {
                entries.remove(identity);
                true
            }
            _ => false,
        }
    }

    /// Push `event` to `identity`. `Ok(false)` when nobody is connected under
    /// that identity; an error when the connection refused the frame.
    pub async fn send_to(&self, identity: &str, event: &LiveEvent) -> Result<bool, HubError> {
        let frame = serde_json::to_string(event)?;
        let entries = self.entries.lock().await;

        let Some(handle) = entries.get(identity) else {
            return Ok(false);
        };
        handle.push(identity, frame).inspect_err(|e| {
            warn!("{} event to {} not delivered: {}", event.kind(), identity, e);
        })?;
        Ok(true)
    }

    /// Push `event` to every identity in `identities` under one lock
    /// acquisition. Failures are counted, not returned.
    pub async fn broadcast<S: AsRef<str>>(
        &self,
        identities: &[S],
        event: &LiveEvent,
    ) -> Result<Delivery, HubError> {
        let frame = serde_json::to_string(event)?;
        let entries = self.entries.lock().await;

        let mut delivery = Delivery::default();
        for identity in identities {
            let identity = identity.as_ref();
            match entries.get(identity) {
                None => delivery.offline += 1,
                Some(handle) => match handle.push(identity, frame.clone()) {
                    Ok(()) => delivery.delivered += 1,
                    Err(e) => {
                        warn!("{} event to {} not delivered: {}", event.kind(), identity, e);
                        delivery.failed += 1;
                    }
                },
            }
        }
        Ok(delivery)
    }

    pub async fn is_online(&self, identity: &str) -> bool {
        self.entries.lock().await.contains_key(identity)
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
