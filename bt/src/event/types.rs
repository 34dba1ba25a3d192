//! Event types for build activity
//!
//! These events are the vocabulary a build tool uses to describe a session:
//! - Node lifecycle (start, finish)
//! - Live updates on open nodes (progress, output)
//! - Leaf diagnostics attached under a node (message)

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Producer-supplied identifier, unique within a build session
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EventId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for EventId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Fields every event carries
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventCommon {
    pub id: EventId,
    /// Producer-assigned wall-clock time (not globally ordered)
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub message: String,
}

impl EventCommon {
    pub fn now(id: impl Into<EventId>) -> Self {
        Self {
            id: id.into(),
            timestamp: Utc::now(),
            message: String::new(),
        }
    }
}

/// Core event enum - one occurrence reported by a build tool
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// Opens a node; the root build is the only start without a parent
    Start(StartEvent),
    /// Updates progress on an open node
    Progress(ProgressEvent),
    /// Appends tool output to a node
    Output(OutputEvent),
    /// Attaches a diagnostic under a node
    Message(MessageEvent),
    /// Closes an open node
    Finish(FinishEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StartEvent {
    #[serde(flatten)]
    pub common: EventCommon,
    #[serde(default)]
    pub parent_id: Option<EventId>,
    #[serde(default)]
    pub title: String,
    /// Working directory of the build, reported on the root start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(flatten)]
    pub common: EventCommon,
    pub amount: ProgressAmount,
    /// Unit of the counted work (e.g. "files", "bytes")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputEvent {
    #[serde(flatten)]
    pub common: EventCommon,
    pub text: String,
    #[serde(default)]
    pub is_std_err: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(flatten)]
    pub common: EventCommon,
    pub parent_id: EventId,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Grouping label used by consoles to cluster related diagnostics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_position: Option<FilePosition>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinishEvent {
    #[serde(flatten)]
    pub common: EventCommon,
    pub result: BuildResult,
}

/// Amount of work done on a node
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressAmount {
    /// Completed fraction in `[0, 1]`
    Fraction(f64),
    /// Completed units out of a known total
    Count { done: u64, total: u64 },
}

impl ProgressAmount {
    /// Completed fraction, if one can be derived
    pub fn fraction(&self) -> Option<f64> {
        match self {
            ProgressAmount::Fraction(f) => Some(*f),
            ProgressAmount::Count { total: 0, .. } => None,
            ProgressAmount::Count { done, total } => Some(*done as f64 / *total as f64),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

/// Source location a message refers to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePosition {
    pub path: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub column: Option<u32>,
}

impl fmt::Display for FilePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(f, "{}:{}:{}", self.path, line, column),
            (Some(line), None) => write!(f, "{}:{}", self.path, line),
            _ => f.write_str(&self.path),
        }
    }
}

/// Outcome of a finished node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildResult {
    Success {
        #[serde(default)]
        up_to_date: bool,
    },
    Failure {
        #[serde(default)]
        failures: Vec<Failure>,
    },
    Skipped,
    Cancelled,
}

impl BuildResult {
    pub fn success() -> Self {
        BuildResult::Success { up_to_date: false }
    }

    pub fn failure() -> Self {
        BuildResult::Failure { failures: Vec::new() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BuildResult::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, BuildResult::Failure { .. })
    }

    /// Short status name
    pub fn status(&self) -> &'static str {
        match self {
            BuildResult::Success { .. } => "success",
            BuildResult::Failure { .. } => "failure",
            BuildResult::Skipped => "skipped",
            BuildResult::Cancelled => "cancelled",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Event {
    /// Start event for the root of a build
    pub fn start_build(id: impl Into<EventId>, title: impl Into<String>) -> Self {
        Event::Start(StartEvent {
            common: EventCommon::now(id),
            parent_id: None,
            title: title.into(),
            working_dir: None,
        })
    }

    /// Start event for a node under `parent_id`
    pub fn start(id: impl Into<EventId>, parent_id: impl Into<EventId>, title: impl Into<String>) -> Self {
        Event::Start(StartEvent {
            common: EventCommon::now(id),
            parent_id: Some(parent_id.into()),
            title: title.into(),
            working_dir: None,
        })
    }

    pub fn progress_count(id: impl Into<EventId>, done: u64, total: u64) -> Self {
        Event::Progress(ProgressEvent {
            common: EventCommon::now(id),
            amount: ProgressAmount::Count { done, total },
            unit: None,
        })
    }

    pub fn progress_fraction(id: impl Into<EventId>, fraction: f64) -> Self {
        Event::Progress(ProgressEvent {
            common: EventCommon::now(id),
            amount: ProgressAmount::Fraction(fraction),
            unit: None,
        })
    }

    pub fn output(id: impl Into<EventId>, text: impl Into<String>, is_std_err: bool) -> Self {
        Event::Output(OutputEvent {
            common: EventCommon::now(id),
            text: text.into(),
            is_std_err,
        })
    }

    pub fn message(
        id: impl Into<EventId>,
        parent_id: impl Into<EventId>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        let mut common = EventCommon::now(id);
        common.message = message.into();
        Event::Message(MessageEvent {
            common,
            parent_id: parent_id.into(),
            severity,
            detail: None,
            group: None,
            file_position: None,
        })
    }

    pub fn finish(id: impl Into<EventId>, result: BuildResult) -> Self {
        Event::Finish(FinishEvent {
            common: EventCommon::now(id),
            result,
        })
    }

    /// Override the producer timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.common_mut().timestamp = timestamp;
        self
    }

    /// Override the human-readable message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.common_mut().message = message.into();
        self
    }

    pub fn common(&self) -> &EventCommon {
        match self {
            Event::Start(e) => &e.common,
            Event::Progress(e) => &e.common,
            Event::Output(e) => &e.common,
            Event::Message(e) => &e.common,
            Event::Finish(e) => &e.common,
        }
    }

    fn common_mut(&mut self) -> &mut EventCommon {
        match self {
            Event::Start(e) => &mut e.common,
            Event::Progress(e) => &mut e.common,
            Event::Output(e) => &mut e.common,
            Event::Message(e) => &mut e.common,
            Event::Finish(e) => &mut e.common,
        }
    }

    /// Get the event ID
    pub fn id(&self) -> &EventId {
        &self.common().id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.common().timestamp
    }

    /// Parent this event links to, if the kind carries one
    pub fn parent_id(&self) -> Option<&EventId> {
        match self {
            Event::Start(e) => e.parent_id.as_ref(),
            Event::Message(e) => Some(&e.parent_id),
            Event::Progress(_) | Event::Output(_) | Event::Finish(_) => None,
        }
    }

    /// Get the event kind name
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Start(_) => "start",
            Event::Progress(_) => "progress",
            Event::Output(_) => "output",
            Event::Message(_) => "message",
            Event::Finish(_) => "finish",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_from_number() {
        let id = EventId::from(42u64);
        assert_eq!(id.as_str(), "42");
        assert_eq!(id, EventId::from("42"));
    }

    #[test]
    fn test_event_accessors() {
        let event = Event::start("2", "1", "Compile");
        assert_eq!(event.id().as_str(), "2");
        assert_eq!(event.parent_id(), Some(&EventId::from("1")));
        assert_eq!(event.kind(), "start");

        let root = Event::start_build("1", "Build");
        assert!(root.parent_id().is_none());

        let finish = Event::finish("1", BuildResult::success());
        assert!(finish.parent_id().is_none());
        assert_eq!(finish.kind(), "finish");
    }

    #[test]
    fn test_with_timestamp_and_message() {
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let event = Event::output("7", "hello", false)
            .with_timestamp(ts)
            .with_message("stdout");
        assert_eq!(event.timestamp(), ts);
        assert_eq!(event.common().message, "stdout");
    }

    #[test]
    fn test_event_serialization_puts_kind_first() {
        let event = Event::message("m1", "2", Severity::Error, "syntax error");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.starts_with(r#"{"kind":"message""#), "got {json}");
        assert!(json.contains(r#""severity":"error""#));

        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_event_deserialization_from_producer_json() {
        let json = r#"{"kind":"start","id":"1","timestamp":"2024-01-01T00:00:00Z","title":"Build"}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        match event {
            Event::Start(start) => {
                assert_eq!(start.common.id.as_str(), "1");
                assert!(start.parent_id.is_none());
                assert_eq!(start.title, "Build");
                assert!(start.common.message.is_empty());
            }
            _ => panic!("Expected Start event"),
        }
    }

    #[test]
    fn test_finish_result_serialization() {
        let result = BuildResult::Failure {
            failures: vec![Failure {
                message: "compilation failed".to_string(),
                description: None,
            }],
        };
        let event = Event::finish("2", result.clone());
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""status":"failure""#));

        let parsed: Event = serde_json::from_str(&json).unwrap();
        if let Event::Finish(finish) = parsed {
            assert_eq!(finish.result, result);
        } else {
            panic!("Expected Finish event");
        }
    }

    #[test]
    fn test_progress_amount_fraction() {
        assert_eq!(ProgressAmount::Count { done: 1, total: 4 }.fraction(), Some(0.25));
        assert_eq!(ProgressAmount::Count { done: 0, total: 0 }.fraction(), None);
        assert_eq!(ProgressAmount::Fraction(0.5).fraction(), Some(0.5));
    }

    #[test]
    fn test_file_position_display() {
        let pos = FilePosition {
            path: "src/main.rs".to_string(),
            line: Some(3),
            column: Some(9),
        };
        assert_eq!(pos.to_string(), "src/main.rs:3:9");

        let pos = FilePosition {
            path: "build.gradle".to_string(),
            line: None,
            column: None,
        };
        assert_eq!(pos.to_string(), "build.gradle");
    }
}
