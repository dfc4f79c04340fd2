//! Reference-shared key-value bags attached to media-graph objects and events.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Error;

/// A mapping from string keys to string values with copy-on-write sharing.
///
/// Cloning is cheap: clones share the underlying map until one of them is
/// mutated. Consumers holding a clone therefore observe a stable snapshot
/// for the duration of a match, no matter what the producer does afterwards.
/// Keys are unique and case-sensitive; empty values are permitted, empty
/// keys are not.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: Arc<BTreeMap<String, String>>,
}

impl Properties {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bag from `(key, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut props = Self::new();
        for (key, value) in pairs {
            props.set(key, value)?;
        }
        Ok(props)
    }

    /// Inserts or replaces an entry.
    ///
    /// Fails with [`Error::InvalidArgument`] on an empty key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), Error> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::InvalidArgument("property key must not be empty".into()));
        }
        Arc::make_mut(&mut self.entries).insert(key, value.into());
        Ok(())
    }

    /// Removes an entry, returning whether it was present.
    pub fn unset(&mut self, key: &str) -> bool {
        if !self.entries.contains_key(key) {
            return false;
        }
        Arc::make_mut(&mut self.entries).remove(key).is_some()
    }

    /// Looks up the value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Whether `key` has an entry.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterates over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bag has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Makes an independent copy that shares nothing with `self`.
    pub fn deep_copy(&self) -> Self {
        Self {
            entries: Arc::new((*self.entries).clone()),
        }
    }
}

impl fmt::Debug for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}
