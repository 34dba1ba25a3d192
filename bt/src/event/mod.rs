//! Build events
//!
//! A build tool reports its activity as a stream of [`Event`]s. Each event is
//! an immutable value; validation happens when the event is ingested by a
//! session's store, not at construction.
//!
//! # Event Kinds
//!
//! - `Start`: opens a node (the root build has no parent)
//! - `Progress`, `Output`: update an open node
//! - `Message`: attaches an info/warning/error diagnostic under a node
//! - `Finish`: closes a node with a [`BuildResult`]
//!
//! On the wire, events are JSON objects tagged by `kind`:
//!
//! ```text
//! {"kind":"start","id":"1","timestamp":"2024-01-01T00:00:00Z","title":"Build"}
//! {"kind":"start","id":"2","parent_id":"1","timestamp":"...","title":"Compile"}
//! {"kind":"message","id":"m1","parent_id":"2","severity":"error","message":"syntax error","timestamp":"..."}
//! {"kind":"finish","id":"2","result":{"status":"failure"},"timestamp":"..."}
//! ```

mod types;

pub use types::{
    BuildResult, Event, EventCommon, EventId, Failure, FilePosition, FinishEvent, MessageEvent, OutputEvent,
    ProgressAmount, ProgressEvent, Severity, StartEvent,
};
