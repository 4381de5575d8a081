use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::error::DeliveryError;
use crate::message::Outbound;

/// Upper bound on a single delivery; a slow observer never holds up a cycle
/// for longer than this.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// A context that receives pushed state, e.g. a ticker in an open page.
#[async_trait]
pub trait Observer: Send + Sync {
    fn id(&self) -> &str;

    async fn deliver(&self, message: &Outbound) -> Result<(), DeliveryError>;
}

/// Observer backed by a bounded channel. Delivery never waits: it fails
/// when the buffer is full or the receiver is dropped.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    id: String,
    tx: mpsc::Sender<Outbound>,
}

impl ChannelObserver {
    pub fn new(id: impl Into<String>, tx: mpsc::Sender<Outbound>) -> Self {
        Self { id: id.into(), tx }
    }

    pub fn pair(id: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(id, tx), rx)
    }
}

#[async_trait]
impl Observer for ChannelObserver {
    fn id(&self) -> &str {
        &self.id
    }

    async fn deliver(&self, message: &Outbound) -> Result<(), DeliveryError> {
        self.tx.try_send(message.clone()).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full(self.id.clone()),
            TrySendError::Closed(_) => DeliveryError::Gone(self.id.clone()),
        })
    }
}

async fn deliver_with_deadline(
    observer: &dyn Observer,
    message: &Outbound,
) -> Result<(), DeliveryError> {
    match tokio::time::timeout(DELIVERY_TIMEOUT, observer.deliver(message)).await {
        Ok(result) => result,
        Err(_) => Err(DeliveryError::TimedOut(observer.id().to_owned())),
    }
}

#[derive(Clone, Default)]
pub struct ObserverRegistry {
    observers: Arc<RwLock<Vec<Arc<dyn Observer>>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer, replacing any previous one with the same id.
    pub async fn register(&self, observer: Arc<dyn Observer>) {
        let mut observers = self.observers.write().await;
        observers.retain(|existing| existing.id() != observer.id());
        observers.push(observer);
    }

    pub async fn unregister(&self, observer_id: &str) {
        let mut observers = self.observers.write().await;
        observers.retain(|existing| existing.id() != observer_id);
    }

    pub async fn contains(&self, observer_id: &str) -> bool {
        self.observers
            .read()
            .await
            .iter()
            .any(|observer| observer.id() == observer_id)
    }

    pub async fn len(&self) -> usize {
        self.observers.read().await.len()
    }

    /// Best-effort fan-out: each delivery stands alone, is bounded by
    /// [`DELIVERY_TIMEOUT`] and failures are only logged. Observers that are
    /// gone are dropped from the registry. Returns how many observers
    /// accepted the message.
    pub async fn broadcast(&self, message: &Outbound) -> usize {
        let snapshot = self.observers.read().await.clone();
        let mut delivered = 0;
        let mut gone = Vec::new();
        for observer in snapshot {
            match deliver_with_deadline(observer.as_ref(), message).await {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(observer = observer.id(), kind = message.kind(), error = %err, "could not deliver to observer");
                    if matches!(err, DeliveryError::Gone(_)) {
                        gone.push(observer);
                    }
                }
            }
        }
        if !gone.is_empty() {
            let mut observers = self.observers.write().await;
            // Compare by pointer so an observer re-registered under the same
            // id during the broadcast survives.
            observers.retain(|existing| !gone.iter().any(|dead| Arc::ptr_eq(existing, dead)));
            debug!(pruned = gone.len(), "dropped unreachable observers");
        }
        debug!(kind = message.kind(), delivered, "broadcast finished");
        delivered
    }

    /// Delivers to one observer only. Unknown ids and failures are logged.
    pub async fn send_to(&self, observer_id: &str, message: &Outbound) -> bool {
        let target = self
            .observers
            .read()
            .await
            .iter()
            .find(|observer| observer.id() == observer_id)
            .cloned();
        let Some(observer) = target else {
            debug!(observer = observer_id, "no such observer");
            return false;
        };
        match deliver_with_deadline(observer.as_ref(), message).await {
            Ok(()) => true,
            Err(err) => {
                warn!(observer = observer_id, kind = message.kind(), error = %err, "could not deliver to observer");
                false
            }
        }
    }
}
