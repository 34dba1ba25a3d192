//! EventEmitter - producer-side convenience over a session's store

use std::sync::Arc;

use tracing::debug;

use crate::event::{BuildResult, Event, EventCommon, EventId, ProgressAmount, ProgressEvent, Severity};
use crate::store::{EventStore, IngestError, NodeDelta};

/// Handle for build-tool threads to report events without owning the session
///
/// EventEmitter is cheap to clone. Every method stamps the current time and
/// returns the ingest result, so rejected events are always visible to the
/// caller.
#[derive(Clone)]
pub struct EventEmitter {
    store: Arc<EventStore>,
}

impl EventEmitter {
    pub(crate) fn new(store: Arc<EventStore>) -> Self {
        Self { store }
    }

    /// Emit a raw event
    pub fn emit(&self, event: Event) -> Result<NodeDelta, IngestError> {
        debug!(event_id = %event.id(), kind = event.kind(), "EventEmitter::emit");
        self.store.ingest(event)
    }

    // === Convenience methods ===

    /// Emit the root start of a build
    pub fn start_build(&self, id: impl Into<EventId>, title: &str, message: &str) -> Result<NodeDelta, IngestError> {
        self.emit(Event::start_build(id, title).with_message(message))
    }

    /// Emit a start under `parent_id`
    pub fn start(
        &self,
        id: impl Into<EventId>,
        parent_id: impl Into<EventId>,
        title: &str,
    ) -> Result<NodeDelta, IngestError> {
        self.emit(Event::start(id, parent_id, title))
    }

    /// Emit counted progress with an optional unit
    pub fn progress(
        &self,
        id: impl Into<EventId>,
        done: u64,
        total: u64,
        unit: Option<&str>,
    ) -> Result<NodeDelta, IngestError> {
        self.emit(Event::Progress(ProgressEvent {
            common: EventCommon::now(id),
            amount: ProgressAmount::Count { done, total },
            unit: unit.map(str::to_string),
        }))
    }

    /// Emit a chunk of tool output
    pub fn output(&self, id: impl Into<EventId>, text: &str, is_std_err: bool) -> Result<NodeDelta, IngestError> {
        self.emit(Event::output(id, text, is_std_err))
    }

    /// Emit an info message under `parent_id`
    pub fn info(
        &self,
        id: impl Into<EventId>,
        parent_id: impl Into<EventId>,
        message: &str,
    ) -> Result<NodeDelta, IngestError> {
        self.emit(Event::message(id, parent_id, Severity::Info, message))
    }

    /// Emit a warning message under `parent_id`
    pub fn warning(
        &self,
        id: impl Into<EventId>,
        parent_id: impl Into<EventId>,
        message: &str,
    ) -> Result<NodeDelta, IngestError> {
        self.emit(Event::message(id, parent_id, Severity::Warning, message))
    }

    /// Emit an error message under `parent_id`
    pub fn error(
        &self,
        id: impl Into<EventId>,
        parent_id: impl Into<EventId>,
        message: &str,
    ) -> Result<NodeDelta, IngestError> {
        self.emit(Event::message(id, parent_id, Severity::Error, message))
    }

    /// Emit a finish with the given result
    pub fn finish(&self, id: impl Into<EventId>, result: BuildResult) -> Result<NodeDelta, IngestError> {
        self.emit(Event::finish(id, result))
    }
}
