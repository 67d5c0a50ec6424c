//! Fragment accumulation keyed by message id.
//!
//! "A token just arrived for message X" is decoupled from "message X is
//! committed to the conversation": fragments for a message legitimately
//! arrive before the message exists in any tree, and fragments for distinct
//! message ids interleave with no cross-id ordering guarantee.

use std::collections::HashMap;
use tracing::debug;

/// Transient accumulation state for one in-flight message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamingState {
    /// Append-only accumulated content.
    pub content: String,
    /// Content length before the most recent fragment; consumers derive the
    /// newly-arrived delta from it for animation.
    pub previous_length: usize,
    /// Monotonically incremented on every accepted fragment.
    pub revision: u64,
}

impl StreamingState {
    /// The slice appended by the most recent fragment.
    pub fn latest_delta(&self) -> &str {
        &self.content[self.previous_length..]
    }
}

/// Single writer of transient stream state. Not part of any persisted
/// conversation until a stream finalizes.
#[derive(Debug, Default)]
pub struct StreamingCoordinator {
    streams: HashMap<String, StreamingState>,
}

impl StreamingCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate a fragment for `message_id`, creating state on the first
    /// fragment. An empty fragment still registers the stream so consumers
    /// can observe it, but contributes no content and no revision.
    pub fn begin_or_continue(&mut self, message_id: &str, fragment: &str) -> Option<&StreamingState> {
        let state = self.streams.entry(message_id.to_string()).or_default();
        if fragment.is_empty() {
            debug!(message_id = %message_id, "empty fragment, stream registered without content");
            return Some(state);
        }

        state.previous_length = state.content.len();
        state.content.push_str(fragment);
        state.revision += 1;

        debug!(
            message_id = %message_id,
            revision = state.revision,
            total_len = state.content.len(),
            "accumulated fragment"
        );
        Some(state)
    }

    /// Mark a message as streaming before its first fragment arrives, so
    /// consumers can subscribe ahead of time. No-op if state already exists.
    pub fn mark_streaming(&mut self, message_id: &str) {
        self.streams.entry(message_id.to_string()).or_default();
    }

    /// Remove and return the state for `message_id`. Duplicate or late end
    /// events are expected under at-least-once delivery and are safe.
    pub fn end(&mut self, message_id: &str) -> Option<StreamingState> {
        let state = self.streams.remove(message_id);
        if state.is_none() {
            debug!(message_id = %message_id, "end for unknown stream, no-op");
        }
        state
    }

    pub fn is_streaming(&self, message_id: &str) -> bool {
        self.streams.contains_key(message_id)
    }

    pub fn has_active_streams(&self) -> bool {
        !self.streams.is_empty()
    }

    pub fn state(&self, message_id: &str) -> Option<&StreamingState> {
        self.streams.get(message_id)
    }

    pub fn active_message_ids(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }

    /// Cancellation-wide reset: a cancellation is conversation-wide, not
    /// per-message, because one user turn may fan out into several
    /// concurrent streams.
    pub fn clear_all(&mut self) {
        if !self.streams.is_empty() {
            debug!(streams = self.streams.len(), "clearing all streaming state");
        }
        self.streams.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_fragments_in_order() {
        let mut coordinator = StreamingCoordinator::new();

        coordinator.begin_or_continue("m1", "Hel");
        let state = coordinator.begin_or_continue("m1", "lo").unwrap();

        assert_eq!(state.content, "Hello");
        assert_eq!(state.previous_length, 3);
        assert_eq!(state.latest_delta(), "lo");
        assert_eq!(state.revision, 2);
    }

    #[test]
    fn empty_fragment_registers_stream_without_content() {
        let mut coordinator = StreamingCoordinator::new();

        let state = coordinator.begin_or_continue("m1", "").unwrap();
        assert_eq!(state.content, "");
        assert_eq!(state.revision, 0);
        assert!(coordinator.is_streaming("m1"));

        // Content and revision start with the first non-empty fragment.
        let state = coordinator.begin_or_continue("m1", "Hi").unwrap();
        assert_eq!(state.content, "Hi");
        assert_eq!(state.revision, 1);
    }

    #[test]
    fn end_is_idempotent() {
        let mut coordinator = StreamingCoordinator::new();
        coordinator.begin_or_continue("m1", "text");

        let first = coordinator.end("m1");
        assert_eq!(first.unwrap().content, "text");

        assert!(coordinator.end("m1").is_none());
        assert!(!coordinator.has_active_streams());
    }

    #[test]
    fn mark_streaming_does_not_disturb_existing_content() {
        let mut coordinator = StreamingCoordinator::new();
        coordinator.mark_streaming("m1");
        assert!(coordinator.is_streaming("m1"));

        coordinator.begin_or_continue("m1", "abc");
        coordinator.mark_streaming("m1");
        assert_eq!(coordinator.state("m1").unwrap().content, "abc");
    }

    #[test]
    fn interleaved_ids_accumulate_independently() {
        let mut coordinator = StreamingCoordinator::new();

        coordinator.begin_or_continue("a", "F1 ");
        coordinator.begin_or_continue("b", "G1 ");
        coordinator.begin_or_continue("b", "G2");
        coordinator.begin_or_continue("a", "F2 ");
        coordinator.begin_or_continue("a", "F3");

        assert_eq!(coordinator.state("a").unwrap().content, "F1 F2 F3");
        assert_eq!(coordinator.state("b").unwrap().content, "G1 G2");
    }

    #[test]
    fn clear_all_resets_everything() {
        let mut coordinator = StreamingCoordinator::new();
        coordinator.begin_or_continue("a", "x");
        coordinator.begin_or_continue("b", "y");

        coordinator.clear_all();

        assert!(!coordinator.has_active_streams());
        assert!(coordinator.state("a").is_none());
        // Safe when already empty.
        coordinator.clear_all();
    }
}
