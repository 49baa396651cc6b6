//! Semantic-classification oracle interface.

use async_trait::async_trait;
use std::str::FromStr;

use crate::error::Result;

/// Template the zero-shot model fills with each candidate label.
pub const HYPOTHESIS_TEMPLATE: &str = "This query is asking for {}";

/// Prefix of every candidate label sent to the classifier.
pub const LABEL_PREFIX: &str = "Information about ";

/// Returns the candidate label used for a table.
pub fn label_for(table: &str) -> String {
    format!("{LABEL_PREFIX}{table}")
}

/// A zero-shot classifier scoring how well each label describes a premise.
///
/// Implementations must be thread-safe; the scorer calls them concurrently.
#[async_trait]
pub trait SemanticClassifier: Send + Sync {
    /// Scores every label against the premise.
    ///
    /// Returns `(label, confidence)` pairs sorted by confidence descending,
    /// with confidences in `[0, 1]`.
    async fn classify(&self, premise: &str, labels: &[String]) -> Result<Vec<(String, f64)>>;
}

/// Semantic classifier provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassifierProvider {
    /// Hugging Face hosted inference API.
    #[default]
    HuggingFace,
    /// Deterministic in-process classifier for testing.
    Mock,
    /// No semantic stage; ranking is lexical only.
    Disabled,
}

impl ClassifierProvider {
    /// Returns the provider as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HuggingFace => "huggingface",
            Self::Mock => "mock",
            Self::Disabled => "disabled",
        }
    }
}

impl FromStr for ClassifierProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "huggingface" | "hf" => Ok(Self::HuggingFace),
            "mock" => Ok(Self::Mock),
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            _ => Err(format!("Unknown classifier provider: {}", s)),
        }
    }
}

impl std::fmt::Display for ClassifierProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hypothesis_wording() {
        assert_eq!(label_for("orders"), "Information about orders");
        assert_eq!(
            HYPOTHESIS_TEMPLATE.replace("{}", &label_for("orders")),
            "This query is asking for Information about orders"
        );
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!(
            "HuggingFace".parse::<ClassifierProvider>().unwrap(),
            ClassifierProvider::HuggingFace
        );
        assert_eq!(
            "off".parse::<ClassifierProvider>().unwrap(),
            ClassifierProvider::Disabled
        );
        assert!("bert".parse::<ClassifierProvider>().is_err());
    }
}
