//! Per-client session: one store, one streaming coordinator, one lifecycle.
//!
//! Explicitly owned and explicitly initialized: create it at session start,
//! call [`ChatSession::shutdown`] at session end. All inbound events funnel
//! through one exhaustive dispatch; no component reaches into another's
//! internal storage.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use conv_core::{Message, MessageGraph};
use conv_store::{AttachmentStore, ConvStorage, ConvStore, Effect, SelectionOverride};

use crate::events::{ClientEvent, MessagePayload, TransportCommand};
use crate::lifecycle::RequestLifecycleManager;
use crate::streaming::StreamingCoordinator;

pub struct ChatSession {
    store: ConvStore,
    streaming: StreamingCoordinator,
    lifecycle: RequestLifecycleManager,
    commands: Vec<TransportCommand>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            store: ConvStore::new(),
            streaming: StreamingCoordinator::new(),
            lifecycle: RequestLifecycleManager::new(),
            commands: Vec::new(),
        }
    }

    pub fn store(&self) -> &ConvStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConvStore {
        &mut self.store
    }

    pub fn streaming(&self) -> &StreamingCoordinator {
        &self.streaming
    }

    pub fn lifecycle(&self) -> &RequestLifecycleManager {
        &self.lifecycle
    }

    /// Whether the send UI should be disabled.
    pub fn is_busy(&self) -> bool {
        self.lifecycle.is_busy()
    }

    /// Drain outbound transport commands queued since the last call.
    pub fn take_commands(&mut self) -> Vec<TransportCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Acquire the request lease for a new turn. A still-pending prior
    /// request is superseded and its streams are discarded.
    pub fn start_request(&mut self, conv_id: &str, message_id: &str) -> CancellationToken {
        if self.lifecycle.is_busy() {
            self.streaming.clear_all();
        }
        self.lifecycle.start_request(conv_id, message_id)
    }

    /// User-initiated cancel: notify the transport, clear the lease and all
    /// transient stream state. Safe to call with nothing in flight.
    pub fn cancel_request(&mut self) {
        if let Some(lease) = self.lifecycle.cancel() {
            self.commands.push(TransportCommand::SendCancelRequest {
                conv_id: lease.conv_id.clone(),
                message_id: lease.message_id.clone(),
            });
        }
        self.streaming.clear_all();
    }

    /// Normal completion: release the lease only. Stream-end events commit
    /// their own state and may arrive before or after this.
    pub fn complete_request(&mut self) {
        self.lifecycle.complete();
    }

    /// Session teardown.
    pub fn shutdown(&mut self) {
        info!("shutting down chat session");
        self.lifecycle.cancel();
        self.streaming.clear_all();
        self.commands.clear();
    }

    /// Route one inbound push event. Exhaustive by construction.
    pub fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::ConversationUpdated { conv_id, message } => {
                self.on_conversation_updated(conv_id, message);
            }
            ClientEvent::ConversationLoaded {
                conv_id,
                messages,
                selection_hint,
            } => {
                self.on_conversation_loaded(conv_id, messages, selection_hint);
            }
            ClientEvent::StreamFragment {
                message_id,
                content,
            } => {
                // Late fragments after cancellation must not resurrect a
                // dead stream: accumulate only under an active lease.
                if !self.lifecycle.is_busy() {
                    debug!(message_id = %message_id, "fragment with no active lease, dropped");
                    return;
                }
                self.streaming.begin_or_continue(&message_id, &content);
            }
            ClientEvent::StreamEnded { message_id } => {
                self.on_stream_ended(&message_id);
            }
            ClientEvent::RequestCancelled => {
                self.lifecycle.cancel();
                self.streaming.clear_all();
            }
        }
    }

    fn on_conversation_updated(&mut self, conv_id: Option<String>, payload: MessagePayload) {
        let target = conv_id.or_else(|| {
            self.store
                .active_conversation_id()
                .map(String::from)
        });

        let Some(target) = target else {
            // First message of a brand-new exchange: start a conversation
            // with it as the root.
            let is_streaming_placeholder = payload.source == conv_core::MessageSource::Ai
                && payload.content.trim().is_empty();
            let message = payload.into_message();
            let message_id = message.id.clone();
            let conv_id = self.store.create_conversation(message, None);
            info!(conv_id = %conv_id, root_id = %message_id, "created conversation from push");
            if is_streaming_placeholder {
                self.streaming.mark_streaming(&message_id);
            }
            return;
        };

        if self.store.message_exists(&target, &payload.id) {
            // Finalized form of a message we already hold (typically the
            // completion of a streamed placeholder).
            self.store.finalize_message(
                &target,
                &payload.id,
                Some(&payload.content),
                payload.duration_ms,
                payload.cost_info,
            );
            return;
        }

        let pre_mark = payload.source == conv_core::MessageSource::Ai
            && payload.content.trim().is_empty();
        let message_id = payload.id.clone();
        self.store.append_message(&target, payload.into_message());

        // Placeholder AI messages stream their content in afterwards; mark
        // them so consumers can subscribe before the first fragment.
        if pre_mark && self.store.message_exists(&target, &message_id) {
            self.streaming.mark_streaming(&message_id);
        }
    }

    fn on_conversation_loaded(
        &mut self,
        conv_id: String,
        payloads: Vec<MessagePayload>,
        selection_hint: Option<String>,
    ) {
        if payloads.is_empty() {
            debug!(conv_id = %conv_id, "loaded empty conversation, no-op");
            return;
        }

        let messages: Vec<Message> = payloads.into_iter().map(MessagePayload::into_message).collect();
        let graph = MessageGraph::from_slice(&messages);

        for orphan in graph.orphans() {
            warn!(
                conv_id = %conv_id,
                message_id = %orphan.id,
                parent_id = ?orphan.parent_id,
                "loaded message with unresolvable parent, keeping it"
            );
        }

        let Some(root) = graph.effective_root() else {
            return;
        };
        let root_id = root.id.clone();
        let root = root.clone();

        info!(
            conv_id = %conv_id,
            messages = messages.len(),
            root_id = %root_id,
            "replaying loaded conversation"
        );
        self.store.create_conversation(root, Some(conv_id.clone()));

        let mut rest: Vec<Message> = messages
            .into_iter()
            .filter(|m| m.id != root_id)
            .collect();
        rest.sort_by_key(|m| m.timestamp);

        for message in rest {
            self.store
                .append_message_with_selection(&conv_id, message, SelectionOverride::Keep);
        }

        // Selection from the caller's hint, falling back to the newest
        // message inside set_active_conversation.
        self.store
            .set_active_conversation(&conv_id, selection_hint.as_deref());
    }

    fn on_stream_ended(&mut self, message_id: &str) {
        let Some(state) = self.streaming.end(message_id) else {
            return;
        };

        if state.content.is_empty() {
            return;
        }

        // Commit the accumulated content if the message made it into a tree;
        // otherwise the transient state is simply discarded.
        if let Some(conv_id) = self
            .store
            .conversation_id_containing(message_id)
            .map(String::from)
        {
            debug!(
                conv_id = %conv_id,
                message_id = %message_id,
                len = state.content.len(),
                "committing streamed content"
            );
            self.store
                .finalize_message(&conv_id, message_id, Some(&state.content), None, None);
        } else {
            debug!(message_id = %message_id, "stream ended for uncommitted message, state discarded");
        }
    }

    /// Execute queued side effects against the external collaborators,
    /// fire-and-forget relative to the mutations that queued them. Failures
    /// are logged and surfaced on the store's error field; the in-memory
    /// state is never rolled back.
    pub async fn run_effects(
        &mut self,
        storage: &dyn ConvStorage,
        attachments: &dyn AttachmentStore,
    ) {
        for effect in self.store.take_effects() {
            match effect {
                Effect::PersistContent {
                    conv_id,
                    message_id,
                    content,
                } => {
                    if let Err(err) = storage
                        .save_edited_content(&conv_id, &message_id, &content)
                        .await
                    {
                        error!(conv_id = %conv_id, message_id = %message_id, %err, "failed to persist edit");
                        self.store.set_error(format!("failed to persist edit: {err}"));
                    }
                }
                Effect::ReleaseAttachments { attachment_ids } => {
                    if let Err(err) = attachments.release_resources(&attachment_ids).await {
                        error!(count = attachment_ids.len(), %err, "failed to release attachments");
                        self.store
                            .set_error(format!("failed to release attachments: {err}"));
                    }
                }
            }
        }
    }
}
