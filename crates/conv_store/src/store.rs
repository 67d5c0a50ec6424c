//! The single writer of conversation state.
//!
//! Operations referencing conversations or messages that no longer exist are
//! no-ops, not errors: inbound events race conversation creation and deletion
//! under at-least-once delivery, and a stale event must not corrupt state.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use conv_core::message::generate_conversation_id;
use conv_core::{CostInfo, Message};

use crate::conversation::Conversation;
use crate::effect::Effect;

/// How `append_message_with_selection` moves the selection pointer.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum SelectionOverride {
    /// The appended message becomes the tip.
    #[default]
    Appended,
    /// Leave the selection where it is (historical replay).
    Keep,
    /// Point the selection at a specific message in the conversation.
    Select(String),
}

/// Canonical store of all conversations for one client session.
#[derive(Debug, Default)]
pub struct ConvStore {
    convs: HashMap<String, Conversation>,
    active_conv_id: Option<String>,
    /// The tip the next user turn will be parented to. Never dangling.
    selected_message_id: Option<String>,
    effects: Vec<Effect>,
    /// Most recent external-collaborator failure, for UI display. Non-blocking:
    /// the in-memory state that triggered the failed call stays authoritative.
    last_error: Option<String>,
}

impl ConvStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- queries -------------------------------------------------------

    pub fn conversation(&self, conv_id: &str) -> Option<&Conversation> {
        self.convs.get(conv_id)
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active_conv_id
            .as_deref()
            .and_then(|id| self.convs.get(id))
    }

    pub fn active_conversation_id(&self) -> Option<&str> {
        self.active_conv_id.as_deref()
    }

    pub fn selected_message_id(&self) -> Option<&str> {
        self.selected_message_id.as_deref()
    }

    pub fn conversation_count(&self) -> usize {
        self.convs.len()
    }

    /// Which conversation, if any, holds `message_id`. Used when an event
    /// carries only a message id (stream commits).
    pub fn conversation_id_containing(&self, message_id: &str) -> Option<&str> {
        self.convs
            .values()
            .find(|conv| conv.contains(message_id))
            .map(|conv| conv.id.as_str())
    }

    pub fn message_exists(&self, conv_id: &str, message_id: &str) -> bool {
        self.convs
            .get(conv_id)
            .is_some_and(|conv| conv.contains(message_id))
    }

    /// Drain side effects queued by mutations since the last call.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    // ---- mutations -----------------------------------------------------

    /// Create a conversation containing only `root`, make it active and
    /// select the root. On an id collision the existing conversation is
    /// reused, not overwritten.
    pub fn create_conversation(&mut self, mut root: Message, id: Option<String>) -> String {
        let conv_id = id.unwrap_or_else(generate_conversation_id);

        if let Some(existing) = self.convs.get(&conv_id) {
            warn!(conv_id = %conv_id, "create_conversation: id collision, reusing existing");
            let selection = existing.root_message().map(|m| m.id.clone());
            self.active_conv_id = Some(conv_id.clone());
            self.selected_message_id = selection;
            debug_assert!(self.selection_is_valid());
            return conv_id;
        }

        root.parent_id = None;
        info!(conv_id = %conv_id, root_id = %root.id, "creating conversation");

        self.selected_message_id = Some(root.id.clone());
        self.convs
            .insert(conv_id.clone(), Conversation::new(conv_id.clone(), root));
        self.active_conv_id = Some(conv_id.clone());

        debug_assert!(self.selection_is_valid());
        conv_id
    }

    /// Append a message; the appended message becomes the selection.
    pub fn append_message(&mut self, conv_id: &str, message: Message) {
        self.append_message_with_selection(conv_id, message, SelectionOverride::Appended);
    }

    /// Append a message, resolving a missing parent pointer with this
    /// precedence: explicit parent on the message, then the current selection
    /// (when it lives in this conversation), then for AI messages the most
    /// recent user message, then the last message in the conversation.
    ///
    /// Appending to an unknown conversation id leaves state unchanged: the
    /// event may have raced conversation creation. The selection pointer only
    /// moves when this conversation is the active one; background pushes into
    /// other conversations must not steal the tip.
    pub fn append_message_with_selection(
        &mut self,
        conv_id: &str,
        mut message: Message,
        selection: SelectionOverride,
    ) {
        let selected = self.selected_message_id.clone();
        let Some(conv) = self.convs.get_mut(conv_id) else {
            debug!(conv_id = %conv_id, message_id = %message.id, "append: unknown conversation, no-op");
            return;
        };

        if conv.contains(&message.id) {
            debug!(conv_id = %conv_id, message_id = %message.id, "append: duplicate message id, no-op");
            return;
        }

        if message.parent_id.is_none() {
            message.parent_id = resolve_parent(conv, selected.as_deref(), &message);
            if message.parent_id.is_none() && !conv.is_empty() {
                warn!(
                    conv_id = %conv_id,
                    message_id = %message.id,
                    "append: could not resolve a parent, message becomes an extra root"
                );
            }
        }

        info!(
            conv_id = %conv_id,
            message_id = %message.id,
            parent_id = ?message.parent_id,
            source = ?message.source,
            "appending message"
        );

        let appended_id = message.id.clone();
        conv.messages.push(message);

        if self.active_conv_id.as_deref() != Some(conv_id) {
            debug!(conv_id = %conv_id, message_id = %appended_id, "append to non-active conversation, selection unchanged");
            debug_assert!(self.selection_is_valid());
            return;
        }

        match selection {
            SelectionOverride::Appended => self.selected_message_id = Some(appended_id),
            SelectionOverride::Keep => {}
            SelectionOverride::Select(id) => {
                if self.convs.get(conv_id).is_some_and(|c| c.contains(&id)) {
                    self.selected_message_id = Some(id);
                } else {
                    warn!(conv_id = %conv_id, target = %id, "selection override targets unknown message, keeping tip on appended");
                    self.selected_message_id = Some(appended_id);
                }
            }
        }

        debug_assert!(self.selection_is_valid());
    }

    /// In-place content replacement. Parent, timestamp and source are
    /// untouched. Queues a fire-and-forget persistence effect; a failure of
    /// that call surfaces on `last_error` only.
    pub fn update_message_content(&mut self, conv_id: &str, message_id: &str, new_content: &str) {
        let Some(conv) = self.convs.get_mut(conv_id) else {
            debug!(conv_id = %conv_id, "update content: unknown conversation, no-op");
            return;
        };
        let Some(message) = conv.get_message_mut(message_id) else {
            debug!(conv_id = %conv_id, message_id = %message_id, "update content: unknown message, no-op");
            return;
        };

        info!(conv_id = %conv_id, message_id = %message_id, len = new_content.len(), "updating message content");
        message.content = new_content.to_string();

        self.effects.push(Effect::PersistContent {
            conv_id: conv_id.to_string(),
            message_id: message_id.to_string(),
            content: new_content.to_string(),
        });

        debug_assert!(self.selection_is_valid());
    }

    /// Merge completion metadata into an existing message. Used when the
    /// finalized form of a streamed message arrives (full content, timing,
    /// cost). Does not queue persistence: finalized data came from upstream.
    pub fn finalize_message(
        &mut self,
        conv_id: &str,
        message_id: &str,
        content: Option<&str>,
        duration_ms: Option<u64>,
        cost_info: Option<CostInfo>,
    ) {
        let Some(message) = self
            .convs
            .get_mut(conv_id)
            .and_then(|conv| conv.get_message_mut(message_id))
        else {
            debug!(conv_id = %conv_id, message_id = %message_id, "finalize: unknown target, no-op");
            return;
        };

        if let Some(content) = content {
            message.content = content.to_string();
        }
        if duration_ms.is_some() {
            message.duration_ms = duration_ms;
        }
        if cost_info.is_some() {
            message.cost_info = cost_info;
        }

        debug!(conv_id = %conv_id, message_id = %message_id, "finalized message");
        debug_assert!(self.selection_is_valid());
    }

    /// Remove `message_id` and every transitive descendant atomically.
    /// The selection pointer never dangles: if it fell inside the deleted
    /// closure it moves to the last remaining message, or clears.
    pub fn delete_message_with_descendants(&mut self, conv_id: &str, message_id: &str) {
        let Some(conv) = self.convs.get_mut(conv_id) else {
            debug!(conv_id = %conv_id, "delete message: unknown conversation, no-op");
            return;
        };

        let closure = conv.descendant_closure(message_id);
        if closure.is_empty() {
            debug!(conv_id = %conv_id, message_id = %message_id, "delete message: unknown message, no-op");
            return;
        }

        let mut released = Vec::new();
        for message in conv.messages.iter().filter(|m| closure.contains(&m.id)) {
            released.extend(message.attachments.iter().map(|a| a.id.clone()));
        }

        info!(
            conv_id = %conv_id,
            message_id = %message_id,
            removed = closure.len(),
            "deleting message subtree"
        );
        conv.messages.retain(|m| !closure.contains(&m.id));

        // Re-point the tip only inside the active conversation; a deletion
        // elsewhere cannot have held the selection.
        if self.active_conv_id.as_deref() == Some(conv_id)
            && self
                .selected_message_id
                .as_ref()
                .is_some_and(|id| closure.contains(id))
        {
            self.selected_message_id = conv.last_message().map(|m| m.id.clone());
        }

        if !released.is_empty() {
            self.effects.push(Effect::ReleaseAttachments {
                attachment_ids: released,
            });
        }

        debug_assert!(self.selection_is_valid());
    }

    /// Collapse a conversation back to its root; when it is the active
    /// conversation the selection moves to the root.
    pub fn clear_conversation(&mut self, conv_id: &str) {
        let Some(conv) = self.convs.get_mut(conv_id) else {
            debug!(conv_id = %conv_id, "clear: unknown conversation, no-op");
            return;
        };
        let Some(root_id) = conv.root_message().map(|m| m.id.clone()) else {
            debug!(conv_id = %conv_id, "clear: empty conversation, no-op");
            return;
        };

        let mut released = Vec::new();
        for message in conv.messages.iter().filter(|m| m.id != root_id) {
            released.extend(message.attachments.iter().map(|a| a.id.clone()));
        }

        info!(conv_id = %conv_id, root_id = %root_id, "clearing conversation to root");
        conv.messages.retain(|m| m.id == root_id);
        if self.active_conv_id.as_deref() == Some(conv_id) {
            self.selected_message_id = Some(root_id);
        }

        if !released.is_empty() {
            self.effects.push(Effect::ReleaseAttachments {
                attachment_ids: released,
            });
        }

        debug_assert!(self.selection_is_valid());
    }

    /// Remove a conversation and release its attachment resources. If it was
    /// active, an arbitrary remaining conversation becomes active with its
    /// first message selected.
    pub fn delete_conversation(&mut self, conv_id: &str) {
        let Some(conv) = self.convs.remove(conv_id) else {
            debug!(conv_id = %conv_id, "delete conversation: unknown id, no-op");
            return;
        };

        info!(conv_id = %conv_id, messages = conv.messages.len(), "deleting conversation");

        let released: Vec<String> = conv
            .messages
            .iter()
            .flat_map(|m| m.attachments.iter().map(|a| a.id.clone()))
            .collect();
        if !released.is_empty() {
            self.effects.push(Effect::ReleaseAttachments {
                attachment_ids: released,
            });
        }

        if self.active_conv_id.as_deref() == Some(conv_id) {
            let next = self.convs.keys().next().cloned();
            self.selected_message_id = next
                .as_ref()
                .and_then(|id| self.convs[id].messages.first())
                .map(|m| m.id.clone());
            self.active_conv_id = next;
        }

        debug_assert!(self.selection_is_valid());
    }

    /// Switch the active conversation. A stale or racing id is a no-op.
    /// Selection moves to the supplied hint when it resolves, otherwise to
    /// the newest message by timestamp.
    pub fn set_active_conversation(&mut self, conv_id: &str, selection: Option<&str>) {
        let Some(conv) = self.convs.get(conv_id) else {
            debug!(conv_id = %conv_id, "set active: unknown conversation, no-op");
            return;
        };

        let selected = selection
            .filter(|id| conv.contains(id))
            .map(String::from)
            .or_else(|| conv.latest_message().map(|m| m.id.clone()));

        info!(conv_id = %conv_id, selected = ?selected, "switching active conversation");
        self.active_conv_id = Some(conv_id.to_string());
        self.selected_message_id = selected;

        debug_assert!(self.selection_is_valid());
    }

    /// Branch navigation: point the tip at any message of `conv_id`, which
    /// also becomes the active conversation. No-op when either id is stale.
    pub fn select_message(&mut self, conv_id: &str, message_id: &str) {
        if !self.message_exists(conv_id, message_id) {
            debug!(conv_id = %conv_id, message_id = %message_id, "select: unknown target, no-op");
            return;
        }

        debug!(conv_id = %conv_id, message_id = %message_id, "selecting message");
        self.active_conv_id = Some(conv_id.to_string());
        self.selected_message_id = Some(message_id.to_string());

        debug_assert!(self.selection_is_valid());
    }

    /// Selection invariant: the tip references a message in the active
    /// conversation, or is unset only when there is nothing to point at.
    pub fn selection_is_valid(&self) -> bool {
        match (&self.active_conv_id, &self.selected_message_id) {
            (Some(conv_id), Some(message_id)) => self
                .convs
                .get(conv_id)
                .is_some_and(|conv| conv.contains(message_id)),
            (Some(conv_id), None) => self
                .convs
                .get(conv_id)
                .map_or(true, |conv| conv.is_empty()),
            (None, Some(_)) => false,
            (None, None) => true,
        }
    }
}

/// Parent inference for messages arriving without an explicit parent.
fn resolve_parent(
    conv: &Conversation,
    selected: Option<&str>,
    message: &Message,
) -> Option<String> {
    if let Some(selected) = selected {
        if conv.contains(selected) {
            return Some(selected.to_string());
        }
    }

    if message.is_ai() {
        if let Some(user_msg) = conv.most_recent_user_message() {
            return Some(user_msg.id.clone());
        }
    }

    conv.last_message().map(|m| m.id.clone())
}
