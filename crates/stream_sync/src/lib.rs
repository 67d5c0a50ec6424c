//! stream_sync - Real-time synchronization for branching conversations
//!
//! Reconciles partial, out-of-order and interrupted streamed AI output into
//! the conversation store while keeping the session consistent across an
//! asynchronous push channel:
//! - `streaming` - per-message fragment accumulation, decoupled from the tree
//! - `lifecycle` - the single in-flight request lease and its cancellation
//! - `events` - the closed union of inbound push events
//! - `session` - the per-client singleton wiring everything together

pub mod events;
pub mod lifecycle;
pub mod session;
pub mod streaming;

pub use events::{ClientEvent, MessagePayload, TransportCommand};
pub use lifecycle::{RequestLease, RequestLifecycleManager};
pub use session::ChatSession;
pub use streaming::{StreamingCoordinator, StreamingState};
