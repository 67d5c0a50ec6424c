//! Pure algorithms over a flat collection of messages with parent pointers.
//!
//! Historical data may be imperfectly linked, so every operation tolerates
//! missing parents, multiple roots, and cycles without panicking.

use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::warn;

use crate::message::Message;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GraphError {
    #[error("message not found: {0}")]
    NotFound(String),

    #[error("cycle detected while resolving path for message {0}")]
    Cyclic(String),
}

/// An index over one conversation's messages, keyed by id.
///
/// Holds no state beyond its input; rebuild it after the underlying
/// collection changes.
#[derive(Debug, Clone)]
pub struct MessageGraph {
    messages: Vec<Message>,
    by_id: HashMap<String, usize>,
}

impl MessageGraph {
    pub fn new(messages: impl IntoIterator<Item = Message>) -> Self {
        let messages: Vec<Message> = messages.into_iter().collect();
        let mut by_id = HashMap::with_capacity(messages.len());
        for (idx, message) in messages.iter().enumerate() {
            // First occurrence wins on duplicate ids.
            by_id.entry(message.id.clone()).or_insert(idx);
        }
        Self { messages, by_id }
    }

    pub fn from_slice(messages: &[Message]) -> Self {
        Self::new(messages.iter().cloned())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.by_id.get(id).map(|&idx| &self.messages[idx])
    }

    /// All messages with no parent pointer. A well-formed conversation has
    /// exactly one.
    pub fn root_messages(&self) -> Vec<&Message> {
        self.messages.iter().filter(|m| m.parent_id.is_none()).collect()
    }

    /// The message to treat as the conversation root.
    ///
    /// Falls back to the chronologically earliest message when no message is
    /// unparented, and takes the first root when several exist.
    pub fn effective_root(&self) -> Option<&Message> {
        let roots = self.root_messages();
        match roots.len() {
            0 => {
                let earliest = self.messages.iter().min_by_key(|m| m.timestamp);
                if earliest.is_some() {
                    warn!("no unparented message; using chronologically earliest as root");
                }
                earliest
            }
            1 => Some(roots[0]),
            n => {
                warn!(root_count = n, "multiple root messages; using the first");
                Some(roots[0])
            }
        }
    }

    /// Ordered sequence from the root to `id`, inclusive, by walking parent
    /// pointers upward. Terminates on cyclic input instead of looping.
    pub fn message_path(&self, id: &str) -> Result<Vec<&Message>, GraphError> {
        let mut current = self
            .get(id)
            .ok_or_else(|| GraphError::NotFound(id.to_string()))?;

        let mut path = vec![current];
        let mut visited: HashSet<&str> = HashSet::from([current.id.as_str()]);

        while let Some(parent_id) = current.parent_id.as_deref() {
            let Some(parent) = self.get(parent_id) else {
                // Orphaned: declared parent is not in this set. The partial
                // path is still meaningful to callers.
                break;
            };
            if !visited.insert(parent.id.as_str()) {
                return Err(GraphError::Cyclic(id.to_string()));
            }
            path.push(parent);
            current = parent;
        }

        path.reverse();
        Ok(path)
    }

    /// Derived child view, recomputed from parent pointers.
    pub fn children_of(&self, id: &str) -> Vec<&Message> {
        self.messages
            .iter()
            .filter(|m| m.parent_id.as_deref() == Some(id))
            .collect()
    }

    /// Messages whose declared parent cannot be resolved in this set.
    /// They are flagged for callers, never silently dropped.
    pub fn orphans(&self) -> Vec<&Message> {
        self.messages
            .iter()
            .filter(|m| {
                m.parent_id
                    .as_deref()
                    .is_some_and(|parent_id| !self.by_id.contains_key(parent_id))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn msg(id: &str, parent: Option<&str>, offset_secs: i64) -> Message {
        let mut message = Message::user(format!("content of {id}"))
            .with_id(id)
            .with_timestamp(Utc::now() + Duration::seconds(offset_secs));
        message.parent_id = parent.map(String::from);
        message
    }

    #[test]
    fn single_root_is_found() {
        let graph = MessageGraph::new(vec![
            msg("r", None, 0),
            msg("a", Some("r"), 1),
            msg("b", Some("a"), 2),
        ]);

        let roots = graph.root_messages();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, "r");
        assert_eq!(graph.effective_root().unwrap().id, "r");
    }

    #[test]
    fn zero_roots_falls_back_to_earliest() {
        // Both messages claim a parent outside the set.
        let graph = MessageGraph::new(vec![msg("b", Some("ghost"), 5), msg("a", Some("ghost"), 1)]);

        assert!(graph.root_messages().is_empty());
        assert_eq!(graph.effective_root().unwrap().id, "a");
    }

    #[test]
    fn multiple_roots_takes_first() {
        let graph = MessageGraph::new(vec![msg("r1", None, 0), msg("r2", None, 1)]);
        assert_eq!(graph.effective_root().unwrap().id, "r1");
    }

    #[test]
    fn empty_graph_has_no_root() {
        let graph = MessageGraph::new(vec![]);
        assert!(graph.effective_root().is_none());
        assert!(graph.is_empty());
    }

    #[test]
    fn path_runs_root_to_node_inclusive() {
        let graph = MessageGraph::new(vec![
            msg("r", None, 0),
            msg("a", Some("r"), 1),
            msg("b", Some("a"), 2),
            msg("side", Some("r"), 3),
        ]);

        let path = graph.message_path("b").unwrap();
        let ids: Vec<&str> = path.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["r", "a", "b"]);

        let path = graph.message_path("r").unwrap();
        assert_eq!(path.len(), 1);
    }

    #[test]
    fn path_on_unknown_id_is_not_found() {
        let graph = MessageGraph::new(vec![msg("r", None, 0)]);
        assert_eq!(
            graph.message_path("nope"),
            Err(GraphError::NotFound("nope".to_string()))
        );
    }

    #[test]
    fn cycle_is_detected_not_looped() {
        let graph = MessageGraph::new(vec![
            msg("a", Some("b"), 0),
            msg("b", Some("c"), 1),
            msg("c", Some("a"), 2),
        ]);

        assert_eq!(
            graph.message_path("a"),
            Err(GraphError::Cyclic("a".to_string()))
        );
    }

    #[test]
    fn orphan_path_stops_at_unresolvable_parent() {
        let graph = MessageGraph::new(vec![msg("x", Some("missing"), 0)]);

        let path = graph.message_path("x").unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].id, "x");
    }

    #[test]
    fn orphans_are_flagged() {
        let graph = MessageGraph::new(vec![
            msg("r", None, 0),
            msg("a", Some("r"), 1),
            msg("lost", Some("gone"), 2),
        ]);

        let orphans = graph.orphans();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].id, "lost");
    }

    #[test]
    fn children_are_recomputed_from_parent_pointers() {
        let graph = MessageGraph::new(vec![
            msg("r", None, 0),
            msg("a", Some("r"), 1),
            msg("b", Some("r"), 2),
            msg("c", Some("a"), 3),
        ]);

        let ids: Vec<&str> = graph.children_of("r").iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(graph.children_of("c").is_empty());
    }

    #[test]
    fn duplicate_ids_first_occurrence_wins() {
        let first = msg("dup", None, 0);
        let mut second = msg("dup", None, 1);
        second.content = "shadowed".to_string();

        let graph = MessageGraph::new(vec![first.clone(), second]);
        assert_eq!(graph.get("dup").unwrap().content, first.content);
    }
}
