//! Replay - feeds a JSONL file of build events through a session
//!
//! Each non-blank line is one [`Event`] in its tagged JSON form. Lines that
//! fail to parse are reported as `MalformedEvent` rejections alongside the
//! events the store itself rejected, with the line they came from.

use std::fs;
use std::path::Path;

use eyre::{Context, Result};
use tracing::{debug, warn};

use crate::event::Event;
use crate::session::SessionHandle;
use crate::store::IngestError;

/// One line of an event file
#[derive(Debug, Clone)]
pub struct EventLine {
    /// 1-based line number in the source file
    pub line: usize,
    pub event: Result<Event, IngestError>,
}

/// An event that did not make it into the tree
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub line: usize,
    pub error: IngestError,
}

/// Outcome of replaying a file
#[derive(Debug, Default, Clone)]
pub struct ReplayOutcome {
    pub accepted: usize,
    pub rejections: Vec<Rejection>,
}

impl ReplayOutcome {
    pub fn is_clean(&self) -> bool {
        self.rejections.is_empty()
    }
}

/// Parse events from JSONL text
pub fn parse_events(content: &str) -> Vec<EventLine> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| EventLine {
            line: idx + 1,
            event: serde_json::from_str::<Event>(line).map_err(|e| {
                warn!(line = idx + 1, error = %e, "parse_events: failed to parse line");
                IngestError::MalformedEvent(e.to_string())
            }),
        })
        .collect()
}

/// Read events from a JSONL file
pub fn read_events(path: impl AsRef<Path>) -> Result<Vec<EventLine>> {
    let path = path.as_ref();
    debug!(?path, "read_events: reading event file");
    let content = fs::read_to_string(path).context(format!("Failed to read event file {}", path.display()))?;
    let lines = parse_events(&content);
    debug!(count = lines.len(), "read_events: loaded lines");
    Ok(lines)
}

/// Ingest parsed lines in file order
pub fn replay(session: &SessionHandle, lines: Vec<EventLine>) -> ReplayOutcome {
    let mut outcome = ReplayOutcome::default();
    for EventLine { line, event } in lines {
        match event.and_then(|event| session.ingest(event)) {
            Ok(_) => outcome.accepted += 1,
            Err(error) => outcome.rejections.push(Rejection { line, error }),
        }
    }
    debug!(
        accepted = outcome.accepted,
        rejected = outcome.rejections.len(),
        "replay: done"
    );
    outcome
}
