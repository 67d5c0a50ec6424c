//! Persistence and attachment collaborator interfaces.
//!
//! The store never awaits these: mutations queue [`crate::Effect`] values and
//! the session layer runs them fire-and-forget. Failures are logged and
//! surfaced on the store's error field, never rolled back into state.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::conversation::Conversation;
use crate::error::{Result, StoreError};

/// Conversation persistence collaborator.
#[async_trait]
pub trait ConvStorage: Send + Sync {
    /// Load a conversation by id.
    async fn load_conversation(&self, conv_id: &str) -> Result<Conversation>;

    /// Save a full conversation snapshot.
    async fn save_conversation(&self, conv: &Conversation) -> Result<()>;

    /// Persist an edited message body.
    async fn save_edited_content(
        &self,
        conv_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<()>;

    /// Delete a conversation.
    async fn delete_conversation(&self, conv_id: &str) -> Result<()>;

    /// Check if a conversation exists.
    async fn conversation_exists(&self, conv_id: &str) -> bool;
}

/// Attachment resource collaborator. Dropping messages releases the
/// resources their attachments reference.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn release_resources(&self, attachment_ids: &[String]) -> Result<()>;
}

/// File-based conversation storage, one JSON document per conversation.
#[derive(Clone)]
pub struct FileConvStorage {
    base_path: PathBuf,
}

impl FileConvStorage {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    fn conv_path(&self, conv_id: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", conv_id))
    }
}

#[async_trait]
impl ConvStorage for FileConvStorage {
    async fn load_conversation(&self, conv_id: &str) -> Result<Conversation> {
        let path = self.conv_path(conv_id);

        if !path.exists() {
            return Err(StoreError::ConversationNotFound(conv_id.to_string()));
        }

        let contents = fs::read_to_string(&path).await?;
        let conv: Conversation = serde_json::from_str(&contents)?;

        Ok(conv)
    }

    async fn save_conversation(&self, conv: &Conversation) -> Result<()> {
        fs::create_dir_all(&self.base_path).await?;

        let path = self.conv_path(&conv.id);
        let contents = serde_json::to_string_pretty(conv)?;
        fs::write(&path, contents).await?;

        debug!(conv_id = %conv.id, path = %path.display(), "saved conversation");
        Ok(())
    }

    async fn save_edited_content(
        &self,
        conv_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<()> {
        let mut conv = self.load_conversation(conv_id).await?;

        let message = conv
            .get_message_mut(message_id)
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;
        message.content = content.to_string();

        self.save_conversation(&conv).await
    }

    async fn delete_conversation(&self, conv_id: &str) -> Result<()> {
        let path = self.conv_path(conv_id);

        if path.exists() {
            fs::remove_file(&path).await?;
        }

        Ok(())
    }

    async fn conversation_exists(&self, conv_id: &str) -> bool {
        self.conv_path(conv_id).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conv_core::Message;
    use tempfile::tempdir;

    fn sample_conv() -> Conversation {
        let mut conv = Conversation::new("c1", Message::system("root").with_id("r"));
        conv.messages
            .push(Message::user("hello").with_id("u1").with_parent("r"));
        conv
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let storage = FileConvStorage::new(dir.path());

        let conv = sample_conv();
        storage.save_conversation(&conv).await.unwrap();

        let loaded = storage.load_conversation("c1").await.unwrap();
        assert_eq!(loaded, conv);
    }

    #[tokio::test]
    async fn load_missing_conversation_fails() {
        let dir = tempdir().unwrap();
        let storage = FileConvStorage::new(dir.path());

        let result = storage.load_conversation("nope").await;
        assert!(matches!(result, Err(StoreError::ConversationNotFound(_))));
    }

    #[tokio::test]
    async fn save_edited_content_updates_one_message() {
        let dir = tempdir().unwrap();
        let storage = FileConvStorage::new(dir.path());

        storage.save_conversation(&sample_conv()).await.unwrap();
        storage
            .save_edited_content("c1", "u1", "edited")
            .await
            .unwrap();

        let loaded = storage.load_conversation("c1").await.unwrap();
        assert_eq!(loaded.get_message("u1").unwrap().content, "edited");
        assert_eq!(loaded.get_message("r").unwrap().content, "root");
    }

    #[tokio::test]
    async fn delete_conversation_is_idempotent() {
        let dir = tempdir().unwrap();
        let storage = FileConvStorage::new(dir.path());

        storage.save_conversation(&sample_conv()).await.unwrap();
        assert!(storage.conversation_exists("c1").await);

        storage.delete_conversation("c1").await.unwrap();
        assert!(!storage.conversation_exists("c1").await);

        // Deleting again is not an error.
        storage.delete_conversation("c1").await.unwrap();
    }
}
