//! conv_store - Canonical owner of conversation state
//!
//! One `ConvStore` per client session holds every loaded conversation, the
//! active-conversation pointer and the selected message (the tip the next
//! turn branches from). All mutations are synchronous state transitions;
//! network side effects are queued as [`Effect`] values and executed by the
//! session layer, fire-and-forget.

pub mod conversation;
pub mod effect;
pub mod error;
pub mod storage;
pub mod store;

pub use conversation::Conversation;
pub use effect::Effect;
pub use error::{Result, StoreError};
pub use storage::{AttachmentStore, ConvStorage, FileConvStorage};
pub use store::{ConvStore, SelectionOverride};
