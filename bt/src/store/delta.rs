//! Incremental tree changes
//!
//! Every accepted event produces exactly one [`NodeDelta`]. Deltas carry
//! enough context (parent id, position) for a subscriber to apply them to its
//! own copy of the tree without querying the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{BuildResult, EventId};

use super::node::{MessageEntry, Node, OutputChunk, Progress};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "delta", rename_all = "snake_case")]
pub enum NodeDelta {
    /// A node was started and attached at `position` among its parent's children
    NodeAdded {
        node: Node,
        parent_id: Option<EventId>,
        position: usize,
    },
    ProgressUpdated {
        id: EventId,
        progress: Progress,
        message: String,
    },
    OutputAppended { id: EventId, chunk: OutputChunk },
    /// A message was appended at `position` in the parent's message list
    MessageAppended {
        parent_id: EventId,
        position: usize,
        entry: MessageEntry,
    },
    NodeFinished {
        id: EventId,
        parent_id: Option<EventId>,
        result: BuildResult,
        end_time: DateTime<Utc>,
        message: String,
    },
}

impl NodeDelta {
    /// Id of the node this delta changes
    pub fn node_id(&self) -> &EventId {
        match self {
            NodeDelta::NodeAdded { node, .. } => &node.id,
            NodeDelta::ProgressUpdated { id, .. }
            | NodeDelta::OutputAppended { id, .. }
            | NodeDelta::NodeFinished { id, .. } => id,
            NodeDelta::MessageAppended { parent_id, .. } => parent_id,
        }
    }

    /// Get the delta type name
    pub fn delta_type(&self) -> &'static str {
        match self {
            NodeDelta::NodeAdded { .. } => "NodeAdded",
            NodeDelta::ProgressUpdated { .. } => "ProgressUpdated",
            NodeDelta::OutputAppended { .. } => "OutputAppended",
            NodeDelta::MessageAppended { .. } => "MessageAppended",
            NodeDelta::NodeFinished { .. } => "NodeFinished",
        }
    }
}

/// A delta stamped with its position in the session's acceptance order
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SequencedDelta {
    // Flattened first so the `delta` tag leads the serialized object
    #[serde(flatten)]
    pub delta: NodeDelta,
    pub seq: u64,
}
