use std::collections::HashMap;

use crate::model::{fold, DriverRecord};

/// Candidates that can each be claimed once. Claimed items leave the pool,
/// so later passes only ever see genuine leftovers.
#[derive(Debug)]
pub struct ConsumablePool<T> {
    items: Vec<Option<T>>,
    by_key: HashMap<String, Vec<usize>>,
}

impl<T> ConsumablePool<T> {
    /// Build a pool keyed case-insensitively by `key`. Items sharing a key are
    /// claimed in input order.
    pub fn new(items: Vec<T>, key: impl Fn(&T) -> &str) -> Self {
        let mut by_key: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, item) in items.iter().enumerate() {
            by_key.entry(fold(key(item))).or_default().push(i);
        }
        Self {
            items: items.into_iter().map(Some).collect(),
            by_key,
        }
    }

    /// Keys that occur more than once, in folded form.
    pub fn duplicate_keys(&self) -> Vec<&str> {
        let mut dups: Vec<&str> = self
            .by_key
            .iter()
            .filter(|(_, idx)| idx.len() > 1)
            .map(|(k, _)| k.as_str())
            .collect();
        dups.sort_unstable();
        dups
    }

    /// Claim the first unclaimed item under `key`.
    pub fn take(&mut self, key: &str) -> Option<T> {
        let indexes = self.by_key.get(&fold(key))?;
        indexes.iter().find_map(|&i| self.items[i].take())
    }

    /// Unclaimed items in input order.
    pub fn into_remaining(self) -> Vec<T> {
        self.items.into_iter().flatten().collect()
    }
}

/// Secondary lookups over records produced so far: by expected object name
/// and by identifier. The first record registered under a key wins.
#[derive(Debug, Default)]
pub struct RecordIndex {
    by_object: HashMap<String, usize>,
    by_identifier: HashMap<String, usize>,
}

impl RecordIndex {
    pub fn build(records: &[DriverRecord]) -> Self {
        let mut index = Self::default();
        for (i, record) in records.iter().enumerate() {
            index.insert(i, record);
        }
        index
    }

    pub fn insert(&mut self, position: usize, record: &DriverRecord) {
        if let Some(ref object) = record.expected_object_name {
            self.by_object.entry(fold(object)).or_insert(position);
        }
        self.by_identifier
            .entry(fold(&record.identifier))
            .or_insert(position);
    }

    /// Exact object-path match first, then the path's last component against
    /// identifiers. The second lookup is a best-effort heuristic.
    pub fn find_object(&self, object_path: &str, leaf_name: &str) -> Option<usize> {
        self.by_object
            .get(&fold(object_path))
            .or_else(|| self.by_identifier.get(&fold(leaf_name)))
            .copied()
    }
}
