//! The closed union of push events the core consumes, and the commands it
//! emits back toward the transport.
//!
//! Delivery contract: at-least-once, ordered within a single message id's
//! stream, unordered across distinct ids and event kinds. Every handler is
//! therefore idempotent or state-checked.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use conv_core::{Attachment, CostInfo, Message, MessageSource};

/// Message fields as they arrive on the push channel. Upstream sources do
/// not always supply `parent_id` or `timestamp`; the store infers them.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MessagePayload {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub source: MessageSource,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_info: Option<CostInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl MessagePayload {
    pub fn into_message(self) -> Message {
        Message {
            id: self.id,
            parent_id: self.parent_id,
            source: self.source,
            content: self.content,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            duration_ms: self.duration_ms,
            cost_info: self.cost_info,
            attachments: self.attachments,
        }
    }
}

/// Inbound push events. A closed enum with exhaustive dispatch: adding an
/// event kind is a compile-time-checked change.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// A message was created or updated upstream.
    ConversationUpdated {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conv_id: Option<String>,
        message: MessagePayload,
    },

    /// A historical conversation arrived as a flat message list.
    ConversationLoaded {
        conv_id: String,
        messages: Vec<MessagePayload>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selection_hint: Option<String>,
    },

    /// An incremental piece of streamed content for one message.
    StreamFragment { message_id: String, content: String },

    /// The stream for one message finished.
    StreamEnded { message_id: String },

    /// The in-flight request was cancelled upstream.
    RequestCancelled,
}

/// Outbound commands toward the transport collaborator.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportCommand {
    SendCancelRequest { conv_id: String, message_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_round_trip_through_tagged_json() {
        let event = ClientEvent::StreamFragment {
            message_id: "m1".to_string(),
            content: "tok".to_string(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stream_fragment");

        let back: ClientEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn payload_tolerates_missing_optional_fields() {
        let event: ClientEvent = serde_json::from_str(
            r#"{
                "type": "conversation_updated",
                "message": { "id": "m1", "source": "assistant", "content": "hi" }
            }"#,
        )
        .unwrap();

        match event {
            ClientEvent::ConversationUpdated { conv_id, message } => {
                assert!(conv_id.is_none());
                assert_eq!(message.source, MessageSource::Ai);
                assert!(message.parent_id.is_none());
                assert!(message.timestamp.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
