//! Errors from ingesting events into a session

use thiserror::Error;

use crate::event::EventId;

/// Why a single event was rejected
///
/// A rejected event leaves the tree unchanged and emits no delta.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("Event {id} refers to unknown parent {parent_id}")]
    UnknownParent { id: EventId, parent_id: EventId },

    #[error("Unknown node: {0}")]
    UnknownNode(EventId),

    #[error("Duplicate id: {0}")]
    DuplicateId(EventId),

    #[error("Node {0} is already finished")]
    DuplicateFinish(EventId),

    #[error("Node {0} is closed")]
    NodeClosed(EventId),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Session is closed")]
    SessionClosed,
}

impl IngestError {
    /// Short name of the error kind for logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::UnknownParent { .. } => "UnknownParent",
            IngestError::UnknownNode(_) => "UnknownNode",
            IngestError::DuplicateId(_) => "DuplicateId",
            IngestError::DuplicateFinish(_) => "DuplicateFinish",
            IngestError::NodeClosed(_) => "NodeClosed",
            IngestError::MalformedEvent(_) => "MalformedEvent",
            IngestError::SessionClosed => "SessionClosed",
        }
    }
}

/// Errors from session-level operations other than ingest
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Session is closed")]
    Closed,
}
