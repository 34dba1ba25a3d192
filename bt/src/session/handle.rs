//! SessionHandle - what producers and consumers hold for one build session

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::event::{Event, EventId};
use crate::notify::Subscription;
use crate::store::{EventStore, IngestError, Node, NodeDelta, NodeSnapshot, SessionError, TreeSnapshot};

use super::emitter::EventEmitter;

/// Unique identifier for a build session (UUID v7, time-sortable)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to a live build session
///
/// Cheap to clone; every clone shares the same store. Pass it to the build
/// tool's worker threads as the producer entry point and to the console as
/// the consumer entry point.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    title: Arc<str>,
    store: Arc<EventStore>,
}

impl SessionHandle {
    pub(crate) fn new(id: SessionId, title: &str, store: Arc<EventStore>) -> Self {
        debug!(%id, %title, "SessionHandle::new: called");
        Self {
            id,
            title: Arc::from(title),
            store,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Title given when the session was created
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Ingest one event (the sole write entry point)
    pub fn ingest(&self, event: Event) -> Result<NodeDelta, IngestError> {
        self.store.ingest(event)
    }

    /// Create an emitter with convenience methods for producers
    pub fn emitter(&self) -> EventEmitter {
        EventEmitter::new(Arc::clone(&self.store))
    }

    pub fn snapshot(&self) -> Option<NodeSnapshot> {
        self.store.snapshot()
    }

    pub fn tree_snapshot(&self) -> TreeSnapshot {
        self.store.tree_snapshot()
    }

    pub fn get(&self, id: &EventId) -> Option<Node> {
        self.store.get(id)
    }

    /// Snapshot plus a stream of every later delta
    pub fn subscribe(&self) -> Result<(TreeSnapshot, Subscription), SessionError> {
        debug!(session_id = %self.id, "subscribe: called");
        self.store.subscribe()
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        self.store.unsubscribe(subscription);
    }

    /// Finish every running node as cancelled, deepest first
    pub fn cancel(&self, message: &str) -> Result<Vec<NodeDelta>, SessionError> {
        debug!(session_id = %self.id, %message, "cancel: called");
        self.store.cancel(message)
    }

    pub fn is_closed(&self) -> bool {
        self.store.is_closed()
    }

    pub(crate) fn close(&self) {
        self.store.close();
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("store", &self.store)
            .finish()
    }
}
