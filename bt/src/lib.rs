//! buildtree - build event aggregation
//!
//! A build tool emits a flat stream of start, progress, output, message and
//! finish events. buildtree folds that stream into a live tree per build
//! session and fans incremental deltas out to any number of consumers.
//!
//! # Core Concepts
//!
//! - **One store per session**: no global state; a [`SessionHandle`] carries it
//! - **Validate, then mutate**: a rejected event never changes the tree
//! - **Self-contained deltas**: each delta can be applied without a lookup
//! - **Snapshot then subscribe**: consumers attach without gaps or repeats
//!
//! # Modules
//!
//! - [`event`] - Event types and wire format
//! - [`store`] - Tree assembly, event store, deltas and errors
//! - [`notify`] - Bounded broadcast of sequenced deltas
//! - [`session`] - Session registry, handles and emitters
//! - [`replay`] - Feeding JSONL event files through a session
//! - [`report`] - Rendering a snapshot for display
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod event;
pub mod notify;
pub mod replay;
pub mod report;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use event::{BuildResult, Event, EventId, ProgressAmount, Severity};
pub use notify::{Delivery, Subscription};
pub use session::{EventEmitter, SessionHandle, SessionId, SessionRegistry};
pub use store::{
    EventStore, IngestError, LateMessagePolicy, NodeDelta, NodeSnapshot, NodeState, SequencedDelta, SessionError,
    TreeSnapshot,
};
