//! Mock semantic classifier for testing.
//!
//! Returns fixed confidences per table so ranking can be tested without
//! a model.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::classifier::{SemanticClassifier, LABEL_PREFIX};
use crate::error::{Result, SageError};

/// A classifier that returns configured confidences keyed by table name.
#[derive(Debug, Default)]
pub struct MockClassifier {
    scores: HashMap<String, f64>,
    default_score: f64,
    failing: HashSet<String>,
    calls: AtomicUsize,
}

impl MockClassifier {
    /// Creates a classifier that scores every table 0.0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the confidence returned for a table.
    pub fn with_score(mut self, table: impl Into<String>, score: f64) -> Self {
        self.scores.insert(table.into(), score);
        self
    }

    /// Sets the confidence for tables without an explicit score.
    pub fn with_default_score(mut self, score: f64) -> Self {
        self.default_score = score;
        self
    }

    /// Makes classification fail whenever this table is among the labels.
    pub fn failing_for(mut self, table: impl Into<String>) -> Self {
        self.failing.insert(table.into());
        self
    }

    /// Returns how many times `classify` has been called.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SemanticClassifier for MockClassifier {
    async fn classify(&self, _premise: &str, labels: &[String]) -> Result<Vec<(String, f64)>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut scored = Vec::with_capacity(labels.len());
        for label in labels {
            let table = label.strip_prefix(LABEL_PREFIX).unwrap_or(label);
            if self.failing.contains(table) {
                return Err(SageError::classifier(format!(
                    "Mock failure for table {table}"
                )));
            }
            let score = self.scores.get(table).copied().unwrap_or(self.default_score);
            scored.push((label.clone(), score));
        }

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relevance::classifier::label_for;

    #[tokio::test]
    async fn test_mock_scores_by_table() {
        let mock = MockClassifier::new()
            .with_score("orders", 0.9)
            .with_default_score(0.1);
        let labels = vec![label_for("customers"), label_for("orders")];

        let scored = mock.classify("q", &labels).await.unwrap();
        assert_eq!(scored[0], (label_for("orders"), 0.9));
        assert_eq!(scored[1], (label_for("customers"), 0.1));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let mock = MockClassifier::new().failing_for("orders");
        assert!(mock.classify("q", &[label_for("orders")]).await.is_err());
        assert_eq!(mock.call_count(), 1);
    }
}
