use serde::{Deserialize, Serialize};

/// A side effect queued by a synchronous store mutation.
///
/// The in-memory transition has already been applied by the time an effect is
/// observed; executing the effect must never roll it back. The session layer
/// drains these and runs them against the external collaborators.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    /// Persist an edited message body to the storage collaborator.
    PersistContent {
        conv_id: String,
        message_id: String,
        content: String,
    },

    /// Release attachment resources held by dropped messages.
    ReleaseAttachments { attachment_ids: Vec<String> },
}
