//! LLM client factory.
//!
//! Centralizes provider-specific logic for creating LLM clients.

use std::sync::Arc;

use crate::error::{Result, SageError};
use crate::llm::ollama::{DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL};
use crate::llm::openai::DEFAULT_OPENAI_MODEL;
use crate::llm::{
    LlmClient, LlmProvider, MockLlmClient, OllamaClient, OllamaConfig, OpenAiClient, OpenAiConfig,
};

/// Creates an LLM client for the given provider.
///
/// An explicit `model` takes precedence over the environment:
/// - `OPENAI_MODEL` (defaults to "gpt-4o"), key from `OPENAI_API_KEY`
/// - `OLLAMA_MODEL` (defaults to "llama3.2:3b"), host from `OLLAMA_HOST`
pub fn create_client(provider: LlmProvider, model: Option<&str>) -> Result<Arc<dyn LlmClient>> {
    match provider {
        LlmProvider::OpenAi => {
            let key = std::env::var("OPENAI_API_KEY").map_err(|_| {
                SageError::config("No API key configured. Set OPENAI_API_KEY.")
            })?;
            let model = resolve_model(model, "OPENAI_MODEL", DEFAULT_OPENAI_MODEL);
            Ok(Arc::new(OpenAiClient::new(OpenAiConfig::new(key, model))?))
        }
        LlmProvider::Ollama => {
            let host =
                std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
            let model = resolve_model(model, "OLLAMA_MODEL", DEFAULT_OLLAMA_MODEL);
            Ok(Arc::new(OllamaClient::new(
                OllamaConfig::new(model).with_url(host),
            )?))
        }
        LlmProvider::Mock => Ok(Arc::new(MockLlmClient::new())),
    }
}

fn resolve_model(explicit: Option<&str>, env_var: &str, default: &str) -> String {
    explicit
        .map(String::from)
        .or_else(|| std::env::var(env_var).ok())
        .unwrap_or_else(|| default.to_string())
}
