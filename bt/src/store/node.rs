//! Node types derived from ingested events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{BuildResult, EventId, FilePosition, ProgressAmount, Severity};

/// Lifecycle state of a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Running,
    Finished,
}

/// Latest progress reported for a node
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub amount: ProgressAmount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A piece of tool output appended to a node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChunk {
    pub text: String,
    pub is_std_err: bool,
    pub timestamp: DateTime<Utc>,
}

/// A diagnostic attached to a node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_position: Option<FilePosition>,
    /// Arrived after the parent node finished
    #[serde(default)]
    pub late: bool,
}

/// A node in the build tree, as held by the store
///
/// Children are referenced by id in arrival order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: EventId,
    pub parent_id: Option<EventId>,
    pub title: String,
    pub state: NodeState,
    pub result: Option<BuildResult>,
    pub children: Vec<EventId>,
    /// Distance from the root (root = 0)
    pub depth: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub progress: Option<Progress>,
    pub output: Vec<OutputChunk>,
    pub messages: Vec<MessageEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_finished(&self) -> bool {
        self.state == NodeState::Finished
    }

    pub fn is_running(&self) -> bool {
        self.state == NodeState::Running
    }
}

/// Deep, immutable copy of a node and its subtree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: EventId,
    pub parent_id: Option<EventId>,
    pub title: String,
    pub state: NodeState,
    pub result: Option<BuildResult>,
    pub depth: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub progress: Option<Progress>,
    pub output: Vec<OutputChunk>,
    pub messages: Vec<MessageEntry>,
    pub working_dir: Option<String>,
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    /// Find a node in this subtree by id
    pub fn find(&self, id: &EventId) -> Option<&NodeSnapshot> {
        self.iter().find(|node| &node.id == id)
    }

    /// Number of nodes in this subtree, including this one
    pub fn node_count(&self) -> usize {
        self.iter().count()
    }

    /// Nodes of this subtree in depth-first, display order
    pub fn iter(&self) -> SnapshotIter<'_> {
        SnapshotIter { stack: vec![self] }
    }

    /// Child ids in display order
    pub fn child_ids(&self) -> Vec<&EventId> {
        self.children.iter().map(|c| &c.id).collect()
    }
}

// Dropped with a work list: a deeply nested chain would otherwise recurse once per level
impl Drop for NodeSnapshot {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut child) = pending.pop() {
            pending.append(&mut child.children);
        }
    }
}

/// Pre-order walk over a snapshot subtree
pub struct SnapshotIter<'a> {
    stack: Vec<&'a NodeSnapshot>,
}

impl<'a> Iterator for SnapshotIter<'a> {
    type Item = &'a NodeSnapshot;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Point-in-time view of a session's tree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    /// Sequence number of the last accepted ingest included in this view
    pub seq: u64,
    pub root: Option<NodeSnapshot>,
}
