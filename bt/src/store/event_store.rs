//! EventStore - the single source of truth for a session's tree
//!
//! All mutation goes through [`EventStore::ingest`]. One mutex guards the
//! assembler, the sequence counter and the notifier, which gives every
//! accepted event a place in one global arrival order and lets a subscriber
//! take a snapshot and start listening without missing or repeating a delta.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::event::{Event, EventId};
use crate::notify::{Notifier, Subscription};

use super::assembler::{LateMessagePolicy, TreeAssembler};
use super::delta::{NodeDelta, SequencedDelta};
use super::error::{IngestError, SessionError};
use super::node::{Node, NodeSnapshot, TreeSnapshot};

struct StoreInner {
    assembler: TreeAssembler,
    notifier: Notifier,
    /// Sequence number of the last accepted ingest
    seq: u64,
    closed: bool,
}

impl StoreInner {
    /// Apply one event and publish its delta
    fn ingest(&mut self, event: Event, policy: LateMessagePolicy) -> Result<NodeDelta, IngestError> {
        if self.closed {
            return Err(IngestError::SessionClosed);
        }
        let delta = self.assembler.apply(event, policy)?;
        self.seq += 1;
        self.notifier.publish(SequencedDelta {
            delta: delta.clone(),
            seq: self.seq,
        });
        Ok(delta)
    }

    fn tree_snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            seq: self.seq,
            root: self.assembler.snapshot(),
        }
    }
}

/// Concurrency-safe registry of the nodes of one build session
pub struct EventStore {
    inner: Mutex<StoreInner>,
    late_messages: LateMessagePolicy,
}

impl EventStore {
    /// Create a store with default settings
    pub fn new(root_title: impl Into<String>) -> Self {
        Self::with_config(root_title, &Config::default())
    }

    pub fn with_config(root_title: impl Into<String>, config: &Config) -> Self {
        let root_title = root_title.into();
        debug!(
            %root_title,
            late_messages = ?config.store.late_messages,
            max_depth = config.store.max_depth,
            "EventStore::with_config: called"
        );
        Self {
            inner: Mutex::new(StoreInner {
                assembler: TreeAssembler::with_max_depth(root_title, config.store.max_depth),
                notifier: Notifier::new(config.notifier.channel_capacity),
                seq: 0,
                closed: false,
            }),
            late_messages: config.store.late_messages,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A panic while holding the lock cannot leave the tree half-updated:
        // the assembler validates before it mutates
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ingest one event from a producer
    ///
    /// On success the returned delta has also been published to subscribers.
    /// On error nothing changes and nothing is published.
    pub fn ingest(&self, event: Event) -> Result<NodeDelta, IngestError> {
        let event_id = event.id().clone();
        let kind = event.kind();
        debug!(%event_id, kind, "ingest: called");

        let result = self.lock().ingest(event, self.late_messages);
        if let Err(e) = &result {
            warn!(%event_id, kind, error = %e, error_kind = e.kind(), "ingest: event rejected");
        }
        result
    }

    /// Deep copy of the tree from the root, if a root has been started
    pub fn snapshot(&self) -> Option<NodeSnapshot> {
        debug!("snapshot: called");
        self.lock().assembler.snapshot()
    }

    /// Snapshot tagged with the sequence number it reflects
    pub fn tree_snapshot(&self) -> TreeSnapshot {
        self.lock().tree_snapshot()
    }

    /// Get a copy of a single node
    pub fn get(&self, id: &EventId) -> Option<Node> {
        debug!(%id, "get: called");
        self.lock().assembler.get(id).cloned()
    }

    /// Number of nodes in the tree
    pub fn len(&self) -> usize {
        self.lock().assembler.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sequence number of the last accepted ingest
    pub fn seq(&self) -> u64 {
        self.lock().seq
    }

    /// Take a snapshot and subscribe to every delta after it, atomically
    ///
    /// The first delta the subscription yields has `seq == snapshot.seq + 1`.
    pub fn subscribe(&self) -> Result<(TreeSnapshot, Subscription), SessionError> {
        let inner = self.lock();
        let subscription = inner.notifier.subscribe().ok_or(SessionError::Closed)?;
        let snapshot = inner.tree_snapshot();
        debug!(subscriber_id = subscription.id(), seq = snapshot.seq, "subscribe: registered");
        Ok((snapshot, subscription))
    }

    /// Stop receiving deltas
    pub fn unsubscribe(&self, subscription: Subscription) {
        debug!(subscriber_id = subscription.id(), "unsubscribe: called");
        drop(subscription);
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().notifier.subscriber_count()
    }

    /// Finish every running node as cancelled, deepest first
    ///
    /// Each synthesized finish goes through the regular ingest path under a
    /// single lock hold, so it is sequenced and published like any other.
    pub fn cancel(&self, message: &str) -> Result<Vec<NodeDelta>, SessionError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(SessionError::Closed);
        }

        let running = inner.assembler.running_deepest_first();
        info!(count = running.len(), "cancel: cancelling running nodes");

        let mut deltas = Vec::with_capacity(running.len());
        for id in running {
            let event = TreeAssembler::cancel_event(id.clone(), message);
            match inner.ingest(event, self.late_messages) {
                Ok(delta) => deltas.push(delta),
                Err(e) => warn!(%id, error = %e, "cancel: could not finish node"),
            }
        }
        Ok(deltas)
    }

    /// Release all nodes and end every subscription stream
    pub fn close(&self) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        let nodes = inner.assembler.len();
        inner.closed = true;
        inner.assembler.clear();
        inner.notifier.close();
        info!(nodes, seq = inner.seq, "close: session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("EventStore")
            .field("nodes", &inner.assembler.len())
            .field("seq", &inner.seq)
            .field("closed", &inner.closed)
            .finish()
    }
}
