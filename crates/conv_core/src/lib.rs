//! conv_core - Core types for branching conversations
//!
//! This crate provides the foundational types used across the chat client:
//! - `message` - Message nodes, sources, attachments
//! - `metadata` - Token and cost accounting
//! - `graph` - Pure algorithms over flat message collections

pub mod graph;
pub mod message;
pub mod metadata;

// Re-export commonly used types
pub use graph::{GraphError, MessageGraph};
pub use message::{Attachment, Message, MessageSource};
pub use metadata::{CostInfo, TokenUsage};
