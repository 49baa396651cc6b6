//! Hugging Face zero-shot classification client.
//!
//! Calls the hosted inference API for an NLI model such as
//! `facebook/bart-large-mnli`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::classifier::{SemanticClassifier, HYPOTHESIS_TEMPLATE};
use crate::error::{Result, SageError};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default inference API base URL.
pub const DEFAULT_HF_API_URL: &str = "https://api-inference.huggingface.co/models";

/// Default zero-shot model.
pub const DEFAULT_HF_MODEL: &str = "facebook/bart-large-mnli";

/// Hugging Face client configuration.
#[derive(Debug, Clone)]
pub struct HuggingFaceConfig {
    /// Base URL; the model name is appended as a path segment.
    pub api_url: String,
    /// Model to use.
    pub model: String,
    /// Bearer token, if the endpoint requires one.
    pub api_token: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl HuggingFaceConfig {
    /// Creates a new config with the given model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_HF_API_URL.to_string(),
            model: model.into(),
            api_token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Sets the base URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Sets the API token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }
}

impl Default for HuggingFaceConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HF_MODEL)
    }
}

/// Zero-shot classifier backed by the Hugging Face inference API.
#[derive(Debug, Clone)]
pub struct HuggingFaceClassifier {
    config: HuggingFaceConfig,
    client: Client,
}

impl HuggingFaceClassifier {
    /// Creates a new client with the given configuration.
    pub fn new(config: HuggingFaceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SageError::classifier(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl SemanticClassifier for HuggingFaceClassifier {
    async fn classify(&self, premise: &str, labels: &[String]) -> Result<Vec<(String, f64)>> {
        let request = ZeroShotRequest {
            inputs: premise,
            parameters: ZeroShotParameters {
                candidate_labels: labels,
                hypothesis_template: HYPOTHESIS_TEMPLATE,
            },
        };

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if let Some(token) = &self.config.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                SageError::classifier("Request timed out")
            } else {
                SageError::classifier(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SageError::classifier(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(SageError::classifier(format!(
                "Inference API error ({}): {}",
                status, body
            )));
        }

        parse_response(&body)
    }
}

fn parse_response(body: &str) -> Result<Vec<(String, f64)>> {
    let response: ZeroShotResponse = serde_json::from_str(body)
        .map_err(|e| SageError::classifier(format!("Failed to parse response: {}", e)))?;

    if response.labels.len() != response.scores.len() {
        return Err(SageError::classifier(format!(
            "Response has {} labels but {} scores",
            response.labels.len(),
            response.scores.len()
        )));
    }

    let mut scored: Vec<(String, f64)> = response
        .labels
        .into_iter()
        .zip(response.scores)
        .map(|(label, score)| (label, score.clamp(0.0, 1.0)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    Ok(scored)
}

#[derive(Debug, Serialize)]
struct ZeroShotRequest<'a> {
    inputs: &'a str,
    parameters: ZeroShotParameters<'a>,
}

#[derive(Debug, Serialize)]
struct ZeroShotParameters<'a> {
    candidate_labels: &'a [String],
    hypothesis_template: &'a str,
}

#[derive(Debug, Deserialize)]
struct ZeroShotResponse {
    labels: Vec<String>,
    scores: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_model() {
        let client = HuggingFaceClassifier::new(
            HuggingFaceConfig::new("facebook/bart-large-mnli").with_url("http://localhost:8080/"),
        )
        .unwrap();
        assert_eq!(
            client.endpoint(),
            "http://localhost:8080/facebook/bart-large-mnli"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let labels = vec!["Information about orders".to_string()];
        let request = ZeroShotRequest {
            inputs: "how many orders",
            parameters: ZeroShotParameters {
                candidate_labels: &labels,
                hypothesis_template: HYPOTHESIS_TEMPLATE,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["inputs"], "how many orders");
        assert_eq!(
            json["parameters"]["hypothesis_template"],
            "This query is asking for {}"
        );
        assert_eq!(
            json["parameters"]["candidate_labels"][0],
            "Information about orders"
        );
    }

    #[test]
    fn test_parse_response_sorts_descending() {
        let body = r#"{"sequence":"q","labels":["a","b"],"scores":[0.2,0.8]}"#;
        let scored = parse_response(body).unwrap();
        assert_eq!(scored[0], ("b".to_string(), 0.8));
        assert_eq!(scored[1], ("a".to_string(), 0.2));
    }

    #[test]
    fn test_parse_response_rejects_mismatch() {
        let body = r#"{"labels":["a","b"],"scores":[0.2]}"#;
        assert!(matches!(
            parse_response(body),
            Err(SageError::Classifier(_))
        ));
        assert!(parse_response(r#"{"error":"loading"}"#).is_err());
    }
}
