#![forbid(unsafe_code)]

//! Ordered key/value maps and the dependency-recording view handed to
//! compute functions.

use std::cell::RefCell;
use std::fmt;

use ahash::AHashMap;

/// Insertion-ordered `String -> V` map.
///
/// Keys keep the position of their first insertion; overwriting a key keeps
/// its position. Equality ignores order.
#[derive(Clone)]
pub struct Snapshot<V> {
    entries: Vec<(String, V)>,
    index: AHashMap<String, usize>,
}

impl<V> Default for Snapshot<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: AHashMap::new(),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Snapshot<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl<V: PartialEq> PartialEq for Snapshot<V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(key, value)| other.get(key) == Some(value))
    }
}

impl<V: Eq> Eq for Snapshot<V> {}

impl<V> Snapshot<V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&V> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Insert or overwrite `key`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        if let Some(&i) = self.index.get(&key) {
            return Some(std::mem::replace(&mut self.entries[i].1, value));
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        None
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Overlay every entry of `other` onto `self`.
    pub fn merge(&mut self, other: Snapshot<V>) {
        for (key, value) in other {
            self.insert(key, value);
        }
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for Snapshot<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        snapshot.extend(iter);
        snapshot
    }
}

impl<K: Into<String>, V> Extend<(K, V)> for Snapshot<V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<V> IntoIterator for Snapshot<V> {
    type Item = (String, V);
    type IntoIter = std::vec::IntoIter<(String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Read-only view of the store handed to compute functions.
///
/// Every key looked up through this view, present or not, is recorded as a
/// dependency of the key being computed.
pub struct Tracked<'a, V> {
    data: &'a Snapshot<V>,
    observed: RefCell<Vec<String>>,
}

impl<'a, V> Tracked<'a, V> {
    pub(crate) fn new(data: &'a Snapshot<V>) -> Self {
        Self {
            data,
            observed: RefCell::new(Vec::new()),
        }
    }

    fn observe(&self, key: &str) {
        let mut observed = self.observed.borrow_mut();
        if !observed.iter().any(|k| k == key) {
            observed.push(key.to_owned());
        }
    }

    /// Current value of `key`, recording the read.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&'a V> {
        self.observe(key);
        self.data.get(key)
    }

    /// Whether `key` is populated, recording the read.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.observe(key);
        self.data.contains_key(key)
    }

    /// Keys read so far, in first-read order.
    #[must_use]
    pub fn observed(&self) -> Vec<String> {
        self.observed.borrow().clone()
    }

    pub(crate) fn into_observed(self) -> Vec<String> {
        self.observed.into_inner()
    }
}

impl<V: Clone> Tracked<'_, V> {
    /// Clone of the value at `key`, or `default` when absent.
    #[must_use]
    pub fn get_or(&self, key: &str, default: V) -> V {
        self.get(key).cloned().unwrap_or(default)
    }

    /// Clone of the value at `key`.
    #[must_use]
    pub fn get_cloned(&self, key: &str) -> Option<V> {
        self.get(key).cloned()
    }
}
