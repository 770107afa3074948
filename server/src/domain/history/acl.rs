//! Caller visibility rules
//!
//! Storage of ACLs lives outside this crate; callers arrive with an
//! [`AccessControl`] already resolved. `None` at either level means no
//! restriction at that level.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AccessControl {
    /// Topics the caller may see
    pub allowed_topics: Option<HashSet<String>>,
    /// Per-topic visible fields; topics without an entry show every field
    pub allowed_fields: Option<HashMap<String, HashSet<String>>>,
}

impl AccessControl {
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Restrict visibility to the given topics
    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_topics = Some(topics.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict the visible fields of one topic
    pub fn with_fields<I, S>(mut self, topic: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_fields
            .get_or_insert_with(HashMap::new)
            .insert(topic.to_string(), fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn topic_allowed(&self, topic: &str) -> bool {
        self.allowed_topics
            .as_ref()
            .is_none_or(|allowed| allowed.contains(topic))
    }

    /// Subset of `fields` the caller may see, in the given order
    pub fn visible_fields(&self, topic: &str, fields: &[String]) -> Vec<String> {
        match self.allowed_fields.as_ref().and_then(|m| m.get(topic)) {
            None => fields.to_vec(),
            Some(allowed) => fields
                .iter()
                .filter(|f| allowed.contains(f.as_str()))
                .cloned()
                .collect(),
        }
    }
}
