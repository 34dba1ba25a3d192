//! Delta notification for live consumers
//!
//! ```text
//!   producers ──ingest──▶ EventStore ──publish──▶ Notifier (broadcast)
//!                                                   │      │      │
//!                                                   ▼      ▼      ▼
//!                                                 console  UI   logger
//! ```
//!
//! Deltas are published while the store lock is held, so every subscriber
//! sees them in acceptance order.

mod notifier;

pub use notifier::{DEFAULT_CHANNEL_CAPACITY, Delivery, Notifier, SubscriberId, Subscription};
