//! Build report - flattens a snapshot into indented lines for display
//!
//! Nodes come out in tree order with their messages right after them, the
//! way a build console lists them.

use crate::event::{BuildResult, Severity};
use crate::store::{NodeSnapshot, NodeState};

/// Display status of a node line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeStatus {
    Running,
    Success,
    UpToDate,
    Failure,
    Skipped,
    Cancelled,
}

impl NodeStatus {
    fn of(node: &NodeSnapshot) -> Self {
        match (&node.state, &node.result) {
            (NodeState::Finished, Some(BuildResult::Success { up_to_date: true })) => NodeStatus::UpToDate,
            (NodeState::Finished, Some(BuildResult::Success { .. })) => NodeStatus::Success,
            (NodeState::Finished, Some(BuildResult::Failure { .. })) => NodeStatus::Failure,
            (NodeState::Finished, Some(BuildResult::Skipped)) => NodeStatus::Skipped,
            (NodeState::Finished, Some(BuildResult::Cancelled)) => NodeStatus::Cancelled,
            _ => NodeStatus::Running,
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            NodeStatus::Running => "…",
            NodeStatus::Success => "✓",
            NodeStatus::UpToDate => "=",
            NodeStatus::Failure => "✗",
            NodeStatus::Skipped => "-",
            NodeStatus::Cancelled => "⊘",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineKind {
    Node(NodeStatus),
    Message(Severity),
}

/// One line of a rendered report
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportLine {
    pub depth: usize,
    pub kind: LineKind,
    pub text: String,
}

impl ReportLine {
    /// Plain-text form with two spaces of indent per level
    pub fn plain(&self) -> String {
        let icon = match self.kind {
            LineKind::Node(status) => status.icon(),
            LineKind::Message(Severity::Error) => "E",
            LineKind::Message(Severity::Warning) => "W",
            LineKind::Message(Severity::Info) => "i",
        };
        format!("{}{} {}", "  ".repeat(self.depth), icon, self.text)
    }
}

/// Flatten a snapshot into report lines
pub fn render(root: &NodeSnapshot) -> Vec<ReportLine> {
    let mut lines = Vec::new();
    for node in root.iter() {
        render_node(node, &mut lines);
    }
    lines
}

/// The node's own line followed by its messages
fn render_node(node: &NodeSnapshot, lines: &mut Vec<ReportLine>) {
    let mut text = node.title.clone();
    if let Some(end) = node.end_time {
        text.push_str(&format!(" ({})", format_duration((end - node.start_time).num_milliseconds())));
    } else if let Some(fraction) = node.progress.as_ref().and_then(|p| p.amount.fraction()) {
        text.push_str(&format!(" [{:.0}%]", fraction * 100.0));
    }
    lines.push(ReportLine {
        depth: node.depth,
        kind: LineKind::Node(NodeStatus::of(node)),
        text,
    });

    for entry in &node.messages {
        let mut text = entry.message.clone();
        if let Some(pos) = &entry.file_position {
            text = format!("{}: {}", pos, text);
        }
        if entry.late {
            text.push_str(" (late)");
        }
        lines.push(ReportLine {
            depth: node.depth + 1,
            kind: LineKind::Message(entry.severity),
            text,
        });
    }
}

fn format_duration(ms: i64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}

/// Counts over a whole build tree
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub nodes: usize,
    pub running: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub errors: usize,
    pub warnings: usize,
    pub late_messages: usize,
}

impl BuildSummary {
    pub fn from_snapshot(root: &NodeSnapshot) -> Self {
        let mut summary = Self::default();
        for node in root.iter() {
            summary.add(node);
        }
        summary
    }

    fn add(&mut self, node: &NodeSnapshot) {
        self.nodes += 1;
        match NodeStatus::of(node) {
            NodeStatus::Running => self.running += 1,
            NodeStatus::Failure => self.failed += 1,
            NodeStatus::Cancelled => self.cancelled += 1,
            _ => {}
        }
        for entry in &node.messages {
            match entry.severity {
                Severity::Error => self.errors += 1,
                Severity::Warning => self.warnings += 1,
                Severity::Info => {}
            }
            if entry.late {
                self.late_messages += 1;
            }
        }
    }

    /// True when every node finished
    pub fn is_complete(&self) -> bool {
        self.running == 0
    }
}
