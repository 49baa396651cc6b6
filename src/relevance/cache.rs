//! Memoized classifier confidences.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Process-lifetime cache of classifier confidences keyed by (query, table).
///
/// Entries are insert-if-absent and never evicted. Only completed
/// classifier calls are stored.
#[derive(Debug, Default)]
pub struct OracleCache {
    entries: RwLock<HashMap<(String, String), f64>>,
}

impl OracleCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached confidence for the pair, if any.
    pub fn get(&self, query: &str, table: &str) -> Option<f64> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(query.to_string(), table.to_string()))
            .copied()
    }

    /// Stores a confidence unless one is already present, returning the stored value.
    pub fn insert(&self, query: &str, table: &str, confidence: f64) -> f64 {
        *self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((query.to_string(), table.to_string()))
            .or_insert(confidence)
    }

    /// Returns the number of cached pairs.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
