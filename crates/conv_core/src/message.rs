use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metadata::CostInfo;

/// Who produced a message.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    User,
    /// AI-generated. Some upstream event sources report this as "assistant".
    #[serde(alias = "assistant")]
    Ai,
    System,
}

/// Reference to an attachment owned by a message. The payload itself lives
/// with the attachment collaborator; only the handle is carried here.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub mime_type: String,
}

/// A node in the conversation tree.
///
/// Tree shape is carried entirely by `parent_id`; child lists are always
/// recomputed from parent pointers. Only a conversation root has
/// `parent_id == None`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub source: MessageSource,
    pub content: String,
    /// Ordering tie-breaker only; not authoritative for tree shape.
    pub timestamp: DateTime<Utc>,
    /// Set only on AI messages once the response is complete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_info: Option<CostInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Message {
    pub fn new(source: MessageSource, content: impl Into<String>) -> Self {
        Self {
            id: generate_message_id(),
            parent_id: None,
            source,
            content: content.into(),
            timestamp: Utc::now(),
            duration_ms: None,
            cost_info: None,
            attachments: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageSource::User, content)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::new(MessageSource::Ai, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageSource::System, content)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_ai(&self) -> bool {
        self.source == MessageSource::Ai
    }
}

/// Generate an opaque message id.
pub fn generate_message_id() -> String {
    format!("msg_{}", Uuid::new_v4())
}

/// Generate an opaque conversation id.
pub fn generate_conversation_id() -> String {
    format!("conv_{}", Uuid::new_v4())
}
