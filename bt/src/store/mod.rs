//! Event store and tree assembly
//!
//! The [`EventStore`] owns one session's build tree. Producers feed it events;
//! it validates each one against the structural invariants, applies it via the
//! [`TreeAssembler`], and publishes a [`NodeDelta`] describing the change.
//!
//! # Invariants
//!
//! - every non-root node's parent existed when the node was started
//! - exactly one root (a start without parent) per session
//! - children keep arrival order
//! - a node finishes at most once; `end_time >= start_time`
//! - node and message ids share one namespace per session
//! - no node sits deeper than the configured max depth

mod assembler;
mod delta;
mod error;
mod event_store;
mod node;

pub use assembler::{DEFAULT_MAX_DEPTH, LateMessagePolicy, TreeAssembler};
pub use delta::{NodeDelta, SequencedDelta};
pub use error::{IngestError, SessionError};
pub use event_store::EventStore;
pub use node::{MessageEntry, Node, NodeSnapshot, NodeState, OutputChunk, Progress, SnapshotIter, TreeSnapshot};
