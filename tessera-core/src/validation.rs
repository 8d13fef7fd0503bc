use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Field errors reported by the remote source when it rejects a save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors {
    messages: IndexMap<String, Vec<String>>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends messages for `key`.
    pub fn add<I, S>(&mut self, key: impl Into<String>, messages: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.messages
            .entry(key.into())
            .or_default()
            .extend(messages.into_iter().map(Into::into));
    }

    /// Builder form of [`FieldErrors::add`].
    pub fn with<I, S>(mut self, key: impl Into<String>, messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add(key, messages);
        self
    }

    /// Folds every message of `other` into `self`.
    pub fn merge(&mut self, other: FieldErrors) {
        for (key, messages) in other.messages {
            self.add(key, messages);
        }
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.messages.get(key).map(Vec::as_slice)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.messages.contains_key(key)
    }

    /// Drops all messages for `key`, returning whether any existed.
    pub fn remove(&mut self, key: &str) -> bool {
        self.messages.shift_remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.messages.keys().map(String::as_str)
    }
}
