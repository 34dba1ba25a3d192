//! Build sessions
//!
//! A session is one end-to-end run of a build. The [`SessionRegistry`] hands
//! out [`SessionHandle`]s; each handle wraps the session's own event store and
//! is passed explicitly to whoever produces or consumes its events.
//!
//! # Usage
//!
//! ```rust,ignore
//! use buildtree::{BuildResult, SessionRegistry};
//!
//! let registry = SessionRegistry::default();
//! let session = registry.new_session("Gradle build");
//!
//! // Consumer: snapshot, then every later delta
//! let (snapshot, mut deltas) = session.subscribe()?;
//!
//! // Producer
//! let emitter = session.emitter();
//! emitter.start_build("1", "Build", "")?;
//! emitter.start("2", "1", ":compileJava")?;
//! emitter.error("m1", "2", "cannot find symbol")?;
//! emitter.finish("2", BuildResult::failure())?;
//!
//! registry.close_session(&session);
//! ```

mod emitter;
mod handle;
mod registry;

pub use emitter::EventEmitter;
pub use handle::{SessionHandle, SessionId};
pub use registry::SessionRegistry;
