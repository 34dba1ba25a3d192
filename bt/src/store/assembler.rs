//! Tree assembler - links incoming events into the build tree
//!
//! The assembler owns the node map for one session. It validates an event
//! against the current tree, applies it, and describes the change as a
//! [`NodeDelta`]. It does no locking of its own; the [`EventStore`] serializes
//! access to it.
//!
//! [`EventStore`]: super::EventStore

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::event::{
    BuildResult, Event, EventCommon, EventId, FinishEvent, MessageEvent, OutputEvent, ProgressAmount, ProgressEvent,
    StartEvent,
};

use super::delta::NodeDelta;
use super::error::IngestError;
use super::node::{MessageEntry, Node, NodeSnapshot, NodeState, OutputChunk, Progress};

/// What to do with a message whose parent node already finished
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LateMessagePolicy {
    /// Append the message and flag it as late
    #[default]
    Accept,
    /// Reject the message with `NodeClosed`
    Reject,
}

/// Deepest level a start may open; the root is level 0
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Builds and holds the tree of nodes for one build session
#[derive(Debug)]
pub struct TreeAssembler {
    nodes: HashMap<EventId, Node>,
    /// Ids of accepted messages; they share the session's id space with nodes
    message_ids: HashSet<EventId>,
    root: Option<EventId>,
    /// Node ids in the order their start events were accepted
    arrival: Vec<EventId>,
    /// Title used for a root start that carries none
    root_title: String,
    max_depth: usize,
}

impl TreeAssembler {
    pub fn new(root_title: impl Into<String>) -> Self {
        Self::with_max_depth(root_title, DEFAULT_MAX_DEPTH)
    }

    /// Assembler that rejects starts nested deeper than `max_depth`
    pub fn with_max_depth(root_title: impl Into<String>, max_depth: usize) -> Self {
        Self {
            nodes: HashMap::new(),
            message_ids: HashSet::new(),
            root: None,
            arrival: Vec::new(),
            root_title: root_title.into(),
            max_depth,
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// True if `id` names a node or an accepted message
    fn id_taken(&self, id: &EventId) -> bool {
        self.nodes.contains_key(id) || self.message_ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root_id(&self) -> Option<&EventId> {
        self.root.as_ref()
    }

    pub fn get(&self, id: &EventId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Validate and apply one event, returning the resulting change
    ///
    /// On error the tree is left exactly as it was.
    pub fn apply(&mut self, event: Event, policy: LateMessagePolicy) -> Result<NodeDelta, IngestError> {
        validate_shape(&event)?;
        match event {
            Event::Start(e) => self.apply_start(e),
            Event::Progress(e) => self.apply_progress(e),
            Event::Output(e) => self.apply_output(e),
            Event::Message(e) => self.apply_message(e, policy),
            Event::Finish(e) => self.apply_finish(e),
        }
    }

    fn apply_start(&mut self, event: StartEvent) -> Result<NodeDelta, IngestError> {
        let StartEvent {
            common: EventCommon { id, timestamp, .. },
            parent_id,
            title,
            working_dir,
        } = event;

        let (depth, position) = match &parent_id {
            Some(parent_id) => {
                let parent = self.nodes.get(parent_id).ok_or_else(|| IngestError::UnknownParent {
                    id: id.clone(),
                    parent_id: parent_id.clone(),
                })?;
                if self.id_taken(&id) {
                    return Err(IngestError::DuplicateId(id));
                }
                let depth = parent.depth + 1;
                if depth > self.max_depth {
                    return Err(IngestError::MalformedEvent(format!(
                        "start {} at depth {} exceeds max depth {}",
                        id, depth, self.max_depth
                    )));
                }
                if parent.is_finished() {
                    warn!(%id, %parent_id, "apply_start: parent already finished");
                }
                (depth, parent.children.len())
            }
            None => {
                if self.id_taken(&id) {
                    return Err(IngestError::DuplicateId(id));
                }
                if let Some(root) = &self.root {
                    return Err(IngestError::MalformedEvent(format!(
                        "start {} has no parent but session already has root {}",
                        id, root
                    )));
                }
                (0, 0)
            }
        };

        let title = if title.trim().is_empty() && parent_id.is_none() {
            self.root_title.clone()
        } else {
            title
        };

        let node = Node {
            id: id.clone(),
            parent_id: parent_id.clone(),
            title,
            state: NodeState::Running,
            result: None,
            children: Vec::new(),
            depth,
            start_time: timestamp,
            end_time: None,
            progress: None,
            output: Vec::new(),
            messages: Vec::new(),
            working_dir,
        };

        match &parent_id {
            Some(parent_id) => {
                if let Some(parent) = self.nodes.get_mut(parent_id) {
                    parent.children.push(id.clone());
                }
            }
            None => self.root = Some(id.clone()),
        }
        self.arrival.push(id.clone());
        self.nodes.insert(id, node.clone());

        debug!(node_id = %node.id, depth, position, "apply_start: node added");
        Ok(NodeDelta::NodeAdded {
            node,
            parent_id,
            position,
        })
    }

    fn apply_progress(&mut self, event: ProgressEvent) -> Result<NodeDelta, IngestError> {
        let ProgressEvent { common, amount, unit } = event;
        let node = self.open_node_mut(&common.id)?;
        let progress = Progress {
            amount,
            unit,
            updated_at: common.timestamp,
        };
        node.progress = Some(progress.clone());
        Ok(NodeDelta::ProgressUpdated {
            id: common.id,
            progress,
            message: common.message,
        })
    }

    fn apply_output(&mut self, event: OutputEvent) -> Result<NodeDelta, IngestError> {
        let OutputEvent {
            common,
            text,
            is_std_err,
        } = event;
        let node = self.open_node_mut(&common.id)?;
        let chunk = OutputChunk {
            text,
            is_std_err,
            timestamp: common.timestamp,
        };
        node.output.push(chunk.clone());
        Ok(NodeDelta::OutputAppended { id: common.id, chunk })
    }

    fn apply_message(&mut self, event: MessageEvent, policy: LateMessagePolicy) -> Result<NodeDelta, IngestError> {
        let MessageEvent {
            common,
            parent_id,
            severity,
            detail,
            group,
            file_position,
        } = event;

        if !self.nodes.contains_key(&parent_id) {
            return Err(IngestError::UnknownParent {
                id: common.id,
                parent_id,
            });
        }
        if self.id_taken(&common.id) {
            return Err(IngestError::DuplicateId(common.id));
        }

        let parent = self
            .nodes
            .get_mut(&parent_id)
            .ok_or_else(|| IngestError::UnknownParent {
                id: common.id.clone(),
                parent_id: parent_id.clone(),
            })?;

        let late = parent.is_finished();
        if late {
            if policy == LateMessagePolicy::Reject {
                return Err(IngestError::NodeClosed(parent_id));
            }
            warn!(message_id = %common.id, %parent_id, %severity, "apply_message: message arrived after parent finished");
        }

        let entry = MessageEntry {
            id: common.id,
            timestamp: common.timestamp,
            severity,
            message: common.message,
            detail,
            group,
            file_position,
            late,
        };
        let position = parent.messages.len();
        parent.messages.push(entry.clone());
        self.message_ids.insert(entry.id.clone());

        Ok(NodeDelta::MessageAppended {
            parent_id,
            position,
            entry,
        })
    }

    fn apply_finish(&mut self, event: FinishEvent) -> Result<NodeDelta, IngestError> {
        let FinishEvent { common, result } = event;
        let node = self
            .nodes
            .get_mut(&common.id)
            .ok_or_else(|| IngestError::UnknownNode(common.id.clone()))?;
        if node.is_finished() {
            return Err(IngestError::DuplicateFinish(common.id));
        }

        // Producer clocks are not ordered; never end before the start
        let end_time = common.timestamp.max(node.start_time);
        node.state = NodeState::Finished;
        node.result = Some(result.clone());
        node.end_time = Some(end_time);

        debug!(node_id = %common.id, status = result.status(), "apply_finish: node finished");
        Ok(NodeDelta::NodeFinished {
            id: common.id,
            parent_id: node.parent_id.clone(),
            result,
            end_time,
            message: common.message,
        })
    }

    /// Look up a node that may still receive updates
    fn open_node_mut(&mut self, id: &EventId) -> Result<&mut Node, IngestError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| IngestError::UnknownNode(id.clone()))?;
        if node.is_finished() {
            return Err(IngestError::NodeClosed(id.clone()));
        }
        Ok(node)
    }

    /// Running nodes ordered deepest first; equal depths go latest-started first
    pub fn running_deepest_first(&self) -> Vec<EventId> {
        let mut running: Vec<(usize, EventId)> = self
            .arrival
            .iter()
            .rev()
            .filter_map(|id| self.nodes.get(id))
            .filter(|node| node.is_running())
            .map(|node| (node.depth, node.id.clone()))
            .collect();
        running.sort_by_key(|(depth, _)| Reverse(*depth));
        running.into_iter().map(|(_, id)| id).collect()
    }

    /// Deep copy of the tree from the root
    ///
    /// Built bottom-up with an explicit stack, so tree depth never grows the
    /// call stack.
    pub fn snapshot(&self) -> Option<NodeSnapshot> {
        let root = self.root.as_ref().and_then(|id| self.nodes.get(id))?;
        let mut stack = vec![SnapshotFrame::new(root)];
        while let Some(mut frame) = stack.pop() {
            if let Some(child) = frame.next_child(&self.nodes) {
                stack.push(frame);
                stack.push(SnapshotFrame::new(child));
                continue;
            }
            let snapshot = frame.finish();
            match stack.last_mut() {
                Some(parent) => parent.children.push(snapshot),
                None => return Some(snapshot),
            }
        }
        None
    }

    /// Drop every node
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.message_ids.clear();
        self.arrival.clear();
        self.root = None;
    }

    /// Synthesized finish used when a session is cancelled
    pub(crate) fn cancel_event(id: EventId, message: &str) -> Event {
        Event::finish(id, BuildResult::Cancelled).with_message(message)
    }
}

/// A node whose children are still being snapshotted
struct SnapshotFrame<'a> {
    node: &'a Node,
    /// Index of the next child id to visit
    next: usize,
    children: Vec<NodeSnapshot>,
}

impl<'a> SnapshotFrame<'a> {
    fn new(node: &'a Node) -> Self {
        Self {
            node,
            next: 0,
            children: Vec::with_capacity(node.children.len()),
        }
    }

    fn next_child(&mut self, nodes: &'a HashMap<EventId, Node>) -> Option<&'a Node> {
        while let Some(id) = self.node.children.get(self.next) {
            self.next += 1;
            if let Some(child) = nodes.get(id) {
                return Some(child);
            }
        }
        None
    }

    fn finish(self) -> NodeSnapshot {
        let node = self.node;
        NodeSnapshot {
            id: node.id.clone(),
            parent_id: node.parent_id.clone(),
            title: node.title.clone(),
            state: node.state,
            result: node.result.clone(),
            depth: node.depth,
            start_time: node.start_time,
            end_time: node.end_time,
            progress: node.progress.clone(),
            output: node.output.clone(),
            messages: node.messages.clone(),
            working_dir: node.working_dir.clone(),
            children: self.children,
        }
    }
}

/// Checks that need no tree state
fn validate_shape(event: &Event) -> Result<(), IngestError> {
    let id = event.id();
    if id.is_empty() {
        return Err(IngestError::MalformedEvent(format!("{} event has an empty id", event.kind())));
    }
    if let Some(parent_id) = event.parent_id() {
        if parent_id.is_empty() {
            return Err(IngestError::MalformedEvent(format!("event {} has an empty parent id", id)));
        }
        if matches!(event, Event::Start(_)) && parent_id == id {
            return Err(IngestError::MalformedEvent(format!("start {} names itself as parent", id)));
        }
    }
    if let Event::Progress(progress) = event {
        match progress.amount {
            ProgressAmount::Fraction(f) if !f.is_finite() || !(0.0..=1.0).contains(&f) => {
                return Err(IngestError::MalformedEvent(format!(
                    "progress {} has fraction {} outside [0, 1]",
                    id, f
                )));
            }
            ProgressAmount::Count { done, total } if done > total => {
                return Err(IngestError::MalformedEvent(format!(
                    "progress {} reports {} done of {}",
                    id, done, total
                )));
            }
            _ => {}
        }
    }
    Ok(())
}
