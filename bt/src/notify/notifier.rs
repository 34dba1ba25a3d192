//! Notifier - fans out tree deltas to subscribers
//!
//! The Notifier uses a tokio broadcast channel so that a slow subscriber never
//! stalls producers. Each subscriber reads from its own cursor into a bounded
//! ring; once it falls more than the channel capacity behind, the oldest
//! deltas are dropped for it and its next receive reports how many it missed.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;
use tracing::debug;

use crate::store::SequencedDelta;

/// Default channel capacity (deltas buffered per subscriber)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Identifies a subscription within its session, for logging and unsubscribe
pub type SubscriberId = u64;

/// Publishing side of the delta stream for one session
pub struct Notifier {
    /// None once the session is closed
    tx: Option<broadcast::Sender<SequencedDelta>>,
    channel_capacity: usize,
    next_subscriber_id: AtomicU64,
}

impl Notifier {
    /// Create a new notifier with the given capacity
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        debug!(capacity, "Notifier::new: creating notifier");
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx: Some(tx),
            channel_capacity: capacity,
            next_subscriber_id: AtomicU64::new(1),
        }
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    /// Deliver a delta to all current subscribers
    ///
    /// Never blocks. With no subscribers the delta is simply dropped.
    pub fn publish(&self, delta: SequencedDelta) {
        if let Some(tx) = &self.tx {
            debug!(seq = delta.seq, delta_type = delta.delta.delta_type(), "Notifier::publish");
            // No subscribers is OK
            let _ = tx.send(delta);
        }
    }

    /// Register a subscriber; it sees only deltas published after this call
    ///
    /// Returns None once the notifier is closed.
    pub fn subscribe(&self) -> Option<Subscription> {
        let tx = self.tx.as_ref()?;
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        debug!(subscriber_id = id, "Notifier::subscribe: new subscriber");
        Some(Subscription { id, rx: tx.subscribe() })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.as_ref().map(|tx| tx.receiver_count()).unwrap_or(0)
    }

    /// End every subscription stream; buffered deltas can still be drained
    pub fn close(&mut self) {
        if self.tx.take().is_some() {
            debug!("Notifier::close: closing delta stream");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }
}

/// One item read from a subscription
#[derive(Clone, Debug, PartialEq)]
pub enum Delivery {
    Delta(SequencedDelta),
    /// The subscriber fell behind and `missed` deltas were dropped for it
    Lagged { missed: u64 },
}

/// Receiving side of the delta stream
pub struct Subscription {
    id: SubscriberId,
    rx: broadcast::Receiver<SequencedDelta>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next delivery; None once the session is closed and drained
    pub async fn recv(&mut self) -> Option<Delivery> {
        match self.rx.recv().await {
            Ok(delta) => Some(Delivery::Delta(delta)),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                debug!(subscriber_id = self.id, missed, "Subscription::recv: lagged");
                Some(Delivery::Lagged { missed })
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Next delivery if one is ready; None when empty or closed
    pub fn try_recv(&mut self) -> Option<Delivery> {
        match self.rx.try_recv() {
            Ok(delta) => Some(Delivery::Delta(delta)),
            Err(broadcast::error::TryRecvError::Lagged(missed)) => Some(Delivery::Lagged { missed }),
            Err(broadcast::error::TryRecvError::Empty) | Err(broadcast::error::TryRecvError::Closed) => None,
        }
    }

    /// Blocking receive for consumers outside an async runtime
    ///
    /// Panics if called from within an async context, like
    /// `broadcast::Receiver::blocking_recv`.
    pub fn blocking_recv(&mut self) -> Option<Delivery> {
        match self.rx.blocking_recv() {
            Ok(delta) => Some(Delivery::Delta(delta)),
            Err(broadcast::error::RecvError::Lagged(missed)) => Some(Delivery::Lagged { missed }),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Drain everything currently buffered
    pub fn drain(&mut self) -> Vec<Delivery> {
        let mut out = Vec::new();
        while let Some(delivery) = self.try_recv() {
            out.push(delivery);
        }
        out
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
