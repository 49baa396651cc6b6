//! Table relevance ranking for Sage.
//!
//! Ranks the tables in a schema snapshot against a natural-language
//! question in two stages: a cheap lexical pass over the keyword index,
//! then a semantic pass through a zero-shot classifier for the tables the
//! lexical pass could not place.

pub mod cache;
pub mod classifier;
pub mod huggingface;
pub mod mock;

pub use cache::OracleCache;
pub use classifier::{label_for, ClassifierProvider, SemanticClassifier};
pub use huggingface::{HuggingFaceClassifier, HuggingFaceConfig};
pub use mock::MockClassifier;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ClassifierConfig;
use crate::error::{Result, SageError};
use crate::schema::{KeywordIndex, SchemaSnapshot, TableSchemaRecord};

/// Score given to a table whose name appears verbatim in the question.
pub const DIRECT_MENTION_SCORE: f64 = 1.0;

/// Tunable ranking parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevanceConfig {
    /// Maximum number of tables returned by `rank`.
    pub max_tables: usize,

    /// Upper bound on a keyword-overlap score.
    pub lexical_score_cap: f64,

    /// Scores must exceed this to be accepted by either stage.
    pub acceptance_threshold: f64,

    /// Upper bound on classifier calls per question.
    pub semantic_candidate_limit: usize,

    /// Number of tables returned when nothing scores.
    pub fallback_tables: usize,

    /// Classifier calls in flight at once.
    pub semantic_concurrency: usize,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            max_tables: 5,
            lexical_score_cap: 0.9,
            acceptance_threshold: 0.3,
            semantic_candidate_limit: 20,
            fallback_tables: 5,
            semantic_concurrency: 4,
        }
    }
}

impl RelevanceConfig {
    /// Checks that the parameters are usable.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.lexical_score_cap) {
            return Err(SageError::config(format!(
                "relevance.lexical_score_cap must be within [0, 1], got {}",
                self.lexical_score_cap
            )));
        }
        if !(0.0..=1.0).contains(&self.acceptance_threshold) {
            return Err(SageError::config(format!(
                "relevance.acceptance_threshold must be within [0, 1], got {}",
                self.acceptance_threshold
            )));
        }
        if self.acceptance_threshold >= self.lexical_score_cap {
            return Err(SageError::config(
                "relevance.acceptance_threshold must be below relevance.lexical_score_cap",
            ));
        }
        for (name, value) in [
            ("max_tables", self.max_tables),
            ("semantic_candidate_limit", self.semantic_candidate_limit),
            ("fallback_tables", self.fallback_tables),
            ("semantic_concurrency", self.semantic_concurrency),
        ] {
            if value == 0 {
                return Err(SageError::config(format!(
                    "relevance.{name} must be at least 1"
                )));
            }
        }
        Ok(())
    }
}

/// Which stage produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreSource {
    Lexical,
    Semantic,
}

/// A table's relevance to one question.
#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceScore {
    pub table_name: String,
    pub score: f64,
    pub source: ScoreSource,
}

impl RelevanceScore {
    fn lexical(table_name: &str, score: f64) -> Self {
        Self {
            table_name: table_name.to_string(),
            score,
            source: ScoreSource::Lexical,
        }
    }

    fn semantic(table_name: &str, score: f64) -> Self {
        Self {
            table_name: table_name.to_string(),
            score,
            source: ScoreSource::Semantic,
        }
    }
}

/// Lower-cases the question and splits it into word tokens.
pub fn query_tokens(query: &str) -> HashSet<String> {
    query
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty())
        .map(String::from)
        .collect()
}

/// Two-stage table relevance scorer.
///
/// Holds the keyword index and the classifier cache, both shared by every
/// question the scorer ranks.
pub struct RelevanceScorer {
    config: RelevanceConfig,
    keywords: KeywordIndex,
    classifier: Option<Arc<dyn SemanticClassifier>>,
    cache: OracleCache,
}

impl RelevanceScorer {
    /// Creates a scorer. Without a classifier the semantic stage is skipped.
    pub fn new(config: RelevanceConfig, classifier: Option<Arc<dyn SemanticClassifier>>) -> Self {
        Self {
            config,
            keywords: KeywordIndex::new(),
            classifier,
            cache: OracleCache::new(),
        }
    }

    /// Returns the scorer's parameters.
    pub fn config(&self) -> &RelevanceConfig {
        &self.config
    }

    /// Returns the keyword index, for invalidation after a schema refresh.
    pub fn keyword_index(&self) -> &KeywordIndex {
        &self.keywords
    }

    /// Returns the classifier result cache.
    pub fn oracle_cache(&self) -> &OracleCache {
        &self.cache
    }

    /// Ranks tables for the question, best first, never more than `max_tables`.
    ///
    /// A non-empty snapshot always yields a non-empty ranking: when no table
    /// scores, the first tables in store order are returned.
    pub async fn rank(
        &self,
        query: &str,
        snapshot: &SchemaSnapshot,
        max_tables: usize,
    ) -> Vec<String> {
        let max_tables = max_tables.max(1);
        let scores = self.score(query, snapshot, max_tables).await;

        if scores.is_empty() {
            let count = self.config.fallback_tables.min(max_tables);
            let fallback: Vec<String> = snapshot.keys().take(count).cloned().collect();
            debug!(tables = ?fallback, "No table scored, using fallback");
            return fallback;
        }

        scores.into_iter().map(|s| s.table_name).collect()
    }

    /// Scores the snapshot and returns the accepted tables, best first.
    ///
    /// The result may be empty; this method applies no fallback.
    pub async fn score(
        &self,
        query: &str,
        snapshot: &SchemaSnapshot,
        max_tables: usize,
    ) -> Vec<RelevanceScore> {
        let start = Instant::now();
        let (mut accepted, candidates) = self.lexical_stage(query, snapshot);
        let lexical_count = accepted.len();

        if accepted.len() < max_tables && !candidates.is_empty() {
            let limit = self.config.semantic_candidate_limit.min(max_tables * 2);
            let candidates: Vec<&str> = candidates.into_iter().take(limit).collect();
            accepted.extend(self.semantic_stage(query, &candidates).await);
        }
        let semantic_count = accepted.len() - lexical_count;

        // Stable; equal scores keep store order.
        accepted.sort_by(|a, b| b.score.total_cmp(&a.score));
        accepted.truncate(max_tables);

        debug!(
            lexical = lexical_count,
            semantic = semantic_count,
            elapsed_ms = start.elapsed().as_millis() as u64,
            ranked = ?accepted.iter().map(|s| s.table_name.as_str()).collect::<Vec<_>>(),
            "Scored tables"
        );
        accepted
    }

    /// Returns the lexically accepted tables and the remaining candidates,
    /// both in store order.
    pub fn lexical_stage<'a>(
        &self,
        query: &str,
        snapshot: &'a SchemaSnapshot,
    ) -> (Vec<RelevanceScore>, Vec<&'a str>) {
        let lowered = query.to_lowercase();
        let tokens = query_tokens(query);
        let mut accepted = Vec::new();
        let mut candidates = Vec::new();

        for (name, record) in snapshot {
            match self.lexical_score(&lowered, &tokens, record) {
                Some(score) if score > self.config.acceptance_threshold => {
                    accepted.push(RelevanceScore::lexical(name, score));
                }
                _ => candidates.push(name.as_str()),
            }
        }

        (accepted, candidates)
    }

    fn lexical_score(
        &self,
        lowered_query: &str,
        tokens: &HashSet<String>,
        record: &TableSchemaRecord,
    ) -> Option<f64> {
        if lowered_query.contains(&record.table_name.to_lowercase()) {
            return Some(DIRECT_MENTION_SCORE);
        }

        let keywords = self.keywords.get_or_build(record);
        if keywords.is_empty() {
            return None;
        }
        let matches = keywords.iter().filter(|k| tokens.contains(*k)).count();
        if matches == 0 {
            return None;
        }

        let ratio = matches as f64 / keywords.len() as f64;
        Some(ratio.min(self.config.lexical_score_cap))
    }

    async fn semantic_stage(&self, query: &str, candidates: &[&str]) -> Vec<RelevanceScore> {
        let Some(classifier) = &self.classifier else {
            return Vec::new();
        };

        let pending: Vec<_> = candidates
            .iter()
            .map(|&table| self.semantic_confidence(classifier.as_ref(), query, table))
            .collect();
        let confidences: Vec<Option<f64>> = stream::iter(pending)
            .buffered(self.config.semantic_concurrency.max(1))
            .collect()
            .await;

        candidates
            .iter()
            .zip(confidences)
            .filter_map(|(table, confidence)| {
                confidence
                    .filter(|c| *c > self.config.acceptance_threshold)
                    .map(|c| RelevanceScore::semantic(table, c))
            })
            .collect()
    }

    async fn semantic_confidence(
        &self,
        classifier: &dyn SemanticClassifier,
        query: &str,
        table: &str,
    ) -> Option<f64> {
        if let Some(cached) = self.cache.get(query, table) {
            return Some(cached);
        }

        let label = label_for(table);
        match classifier.classify(query, std::slice::from_ref(&label)).await {
            Ok(scored) => {
                let confidence = scored
                    .iter()
                    .find(|(l, _)| *l == label)
                    .or_else(|| scored.first())
                    .map(|(_, c)| *c)
                    .unwrap_or(0.0);
                Some(self.cache.insert(query, table, confidence))
            }
            Err(e) => {
                warn!(table, "Semantic scoring failed, skipping table: {e}");
                None
            }
        }
    }
}

/// Builds the classifier selected by configuration, or `None` when disabled.
pub fn create_classifier(config: &ClassifierConfig) -> Result<Option<Arc<dyn SemanticClassifier>>> {
    let provider: ClassifierProvider = config.provider.parse().map_err(SageError::config)?;

    match provider {
        ClassifierProvider::Disabled => Ok(None),
        ClassifierProvider::Mock => Ok(Some(Arc::new(MockClassifier::new()))),
        ClassifierProvider::HuggingFace => {
            let mut hf = HuggingFaceConfig::new(config.model.clone());
            if let Some(url) = &config.api_url {
                hf = hf.with_url(url.clone());
            }
            if let Ok(token) = std::env::var("HF_API_TOKEN") {
                hf = hf.with_token(token);
            }
            Ok(Some(Arc::new(HuggingFaceClassifier::new(hf)?)))
        }
    }
}
