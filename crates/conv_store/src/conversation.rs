use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use conv_core::{Message, MessageGraph, MessageSource};

/// One conversation: an unordered collection of messages whose tree shape is
/// carried entirely by parent pointers. Insertion order is kept only as a
/// tie-breaker and for "last message" fallbacks.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, root: Message) -> Self {
        Self {
            id: id.into(),
            messages: vec![root],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get_message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    pub fn get_message_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.get_message(message_id).is_some()
    }

    /// The root: first unparented message, falling back to the first message
    /// for imperfectly linked history.
    pub fn root_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .find(|m| m.is_root())
            .or_else(|| self.messages.first())
    }

    /// Last message by array position.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Newest message by timestamp; later insertion wins ties.
    pub fn latest_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .enumerate()
            .max_by_key(|(idx, m)| (m.timestamp, *idx))
            .map(|(_, m)| m)
    }

    /// Most recent user message by timestamp; later insertion wins ties.
    pub fn most_recent_user_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.source == MessageSource::User)
            .max_by_key(|(idx, m)| (m.timestamp, *idx))
            .map(|(_, m)| m)
    }

    /// Ids of `message_id` and all its transitive children, computed by
    /// repeated downward child lookup over parent pointers.
    pub fn descendant_closure(&self, message_id: &str) -> HashSet<String> {
        let mut closure = HashSet::new();
        if !self.contains(message_id) {
            return closure;
        }

        let mut frontier = vec![message_id.to_string()];
        while let Some(id) = frontier.pop() {
            if !closure.insert(id.clone()) {
                continue;
            }
            for child in self.messages.iter().filter(|m| m.parent_id.as_deref() == Some(id.as_str())) {
                frontier.push(child.id.clone());
            }
        }
        closure
    }

    /// Snapshot graph view of this conversation.
    pub fn graph(&self) -> MessageGraph {
        MessageGraph::from_slice(&self.messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn conv() -> Conversation {
        let base = Utc::now();
        let root = Message::system("root").with_id("r").with_timestamp(base);
        let mut conv = Conversation::new("c1", root);
        conv.messages.push(
            Message::user("one")
                .with_id("u1")
                .with_parent("r")
                .with_timestamp(base + Duration::seconds(1)),
        );
        conv.messages.push(
            Message::ai("reply")
                .with_id("a1")
                .with_parent("u1")
                .with_timestamp(base + Duration::seconds(2)),
        );
        conv.messages.push(
            Message::user("two")
                .with_id("u2")
                .with_parent("a1")
                .with_timestamp(base + Duration::seconds(3)),
        );
        conv
    }

    #[test]
    fn root_and_latest() {
        let conv = conv();
        assert_eq!(conv.root_message().unwrap().id, "r");
        assert_eq!(conv.latest_message().unwrap().id, "u2");
        assert_eq!(conv.last_message().unwrap().id, "u2");
    }

    #[test]
    fn most_recent_user_ties_break_by_insertion_order() {
        let mut conv = conv();
        let ts = conv.get_message("u2").unwrap().timestamp;
        conv.messages.push(
            Message::user("tied")
                .with_id("u3")
                .with_parent("a1")
                .with_timestamp(ts),
        );

        // u2 and u3 share a timestamp; the later array position wins.
        assert_eq!(conv.most_recent_user_message().unwrap().id, "u3");
    }

    #[test]
    fn descendant_closure_is_transitive() {
        let conv = conv();
        let closure = conv.descendant_closure("u1");
        assert_eq!(closure.len(), 3);
        assert!(closure.contains("u1"));
        assert!(closure.contains("a1"));
        assert!(closure.contains("u2"));

        assert!(conv.descendant_closure("missing").is_empty());
    }
}
