//! Keyword extraction from table and column identifiers.
//!
//! Identifiers are split on underscores and camelCase boundaries so that a
//! question mentioning "balancer" can match a table named `load_balancer`
//! or `LoadBalancer`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use super::TableSchemaRecord;

/// Extracts the normalized keyword set from an identifier.
///
/// The set contains the whole identifier lower-cased plus every
/// underscore-separated and camelCase-separated token, lower-cased.
/// Runs of capitals are kept together (`HTTPServer` yields `http` and `server`).
/// An empty identifier yields an empty set.
pub fn extract(identifier: &str) -> HashSet<String> {
    let mut keywords = HashSet::new();
    if identifier.is_empty() {
        return keywords;
    }

    keywords.insert(identifier.to_lowercase());

    for part in identifier.split('_').filter(|p| !p.is_empty()) {
        keywords.extend(split_camel_case(part).into_iter().map(str::to_lowercase));
    }

    keywords
}

/// Splits a single word at camelCase and letter/digit boundaries.
fn split_camel_case(word: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = word.char_indices().collect();
    let mut tokens = Vec::new();
    let mut start = 0;

    for i in 1..chars.len() {
        let (idx, c) = chars[i];
        let prev = chars[i - 1].1;
        let next_is_lower = chars.get(i + 1).is_some_and(|(_, n)| n.is_lowercase());

        let boundary = (c.is_uppercase() && prev.is_lowercase())
            || (c.is_uppercase() && prev.is_uppercase() && next_is_lower)
            || (c.is_ascii_digit() != prev.is_ascii_digit());

        if boundary {
            tokens.push(&word[start..idx]);
            start = idx;
        }
    }

    tokens.push(&word[start..]);
    tokens
}

/// Builds the keyword set for a table: its name plus all of its column names.
pub fn table_keywords(record: &TableSchemaRecord) -> HashSet<String> {
    let mut keywords = extract(&record.table_name);
    for column in &record.columns {
        keywords.extend(extract(&column.name));
    }
    keywords
}

/// Memoized keyword sets per table.
///
/// Entries are inserted once and only dropped by [`KeywordIndex::invalidate`],
/// which the schema refresh calls after rewriting a table.
#[derive(Debug, Default)]
pub struct KeywordIndex {
    entries: RwLock<HashMap<String, Arc<HashSet<String>>>>,
}

impl KeywordIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached keyword set for the table, building it on first use.
    pub fn get_or_build(&self, record: &TableSchemaRecord) -> Arc<HashSet<String>> {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(keywords) = entries.get(&record.table_name) {
                return Arc::clone(keywords);
            }
        }

        let built = Arc::new(table_keywords(record));
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            entries
                .entry(record.table_name.clone())
                .or_insert(built),
        )
    }

    /// Drops the cached entry for a table.
    pub fn invalidate(&self, table_name: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(table_name);
    }

    /// Returns the number of cached tables.
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
