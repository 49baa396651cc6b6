//! Configuration management for Sage.
//!
//! Handles loading configuration from TOML files and environment variables.
//! Command-line flags are applied on top by the binary, so the effective
//! precedence is CLI, then file, then environment.

use crate::db::DatabaseBackend;
use crate::error::{Result, SageError};
use crate::llm::LlmProvider;
use crate::relevance::huggingface::DEFAULT_HF_MODEL;
use crate::relevance::{ClassifierProvider, RelevanceConfig};
use crate::schema::SchemaStore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Main configuration structure for Sage.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Source database connection.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Location of the schema metadata store.
    #[serde(default)]
    pub schema_store: SchemaStoreConfig,

    /// LLM provider configuration.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Semantic classifier configuration.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Table ranking parameters.
    #[serde(default)]
    pub relevance: RelevanceConfig,
}

/// Source database connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Connection URL (`sqlite:` or `postgres://`).
    pub url: Option<String>,
}

/// Schema store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchemaStoreConfig {
    /// Path to the SQLite file holding schema records.
    pub path: Option<PathBuf>,
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// LLM provider: "openai", "ollama" or "mock".
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Model name. When unset the provider's environment variable or
    /// built-in default applies.
    #[serde(default)]
    pub model: Option<String>,
}

fn default_llm_provider() -> String {
    "openai".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
        }
    }
}

/// Semantic classifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Classifier provider: "huggingface", "mock" or "disabled".
    #[serde(default = "default_classifier_provider")]
    pub provider: String,

    /// Zero-shot model name.
    #[serde(default = "default_classifier_model")]
    pub model: String,

    /// Inference API base URL override.
    #[serde(default)]
    pub api_url: Option<String>,
}

fn default_classifier_provider() -> String {
    "huggingface".to_string()
}

fn default_classifier_model() -> String {
    DEFAULT_HF_MODEL.to_string()
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: default_classifier_provider(),
            model: default_classifier_model(),
            api_url: None,
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("db-sage")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| SageError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            SageError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Fills unset values from `DATABASE_URL` and `SCHEMA_DB_PATH`.
    pub fn apply_env_defaults(&mut self) {
        if self.database.url.is_none() {
            self.database.url = std::env::var("DATABASE_URL").ok();
        }
        if self.schema_store.path.is_none() {
            self.schema_store.path = std::env::var("SCHEMA_DB_PATH").ok().map(PathBuf::from);
        }
    }

    /// Checks that every section is usable.
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.database.url {
            validate_database_url(url)?;
        }
        self.llm_provider()?;
        self.classifier
            .provider
            .parse::<ClassifierProvider>()
            .map_err(SageError::config)?;
        self.relevance.validate()
    }

    /// Returns the parsed LLM provider.
    pub fn llm_provider(&self) -> Result<LlmProvider> {
        self.llm.provider.parse().map_err(SageError::config)
    }

    /// Returns the source database URL, or an error when none is configured.
    pub fn database_url(&self) -> Result<&str> {
        self.database.url.as_deref().ok_or_else(|| {
            SageError::config("No database configured. Set DATABASE_URL or pass --database-url.")
        })
    }

    /// Returns the schema store path, falling back to the platform default.
    pub fn schema_store_path(&self) -> Result<PathBuf> {
        match &self.schema_store.path {
            Some(path) => Ok(path.clone()),
            None => SchemaStore::default_path(),
        }
    }
}

/// Validates a database URL's scheme and, for network databases, its host.
fn validate_database_url(url: &str) -> Result<()> {
    match DatabaseBackend::from_url(url)? {
        DatabaseBackend::Sqlite => Ok(()),
        DatabaseBackend::Postgres => {
            let parsed = Url::parse(url)
                .map_err(|e| SageError::config(format!("Invalid connection string: {e}")))?;
            if parsed.host_str().is_none() {
                return Err(SageError::config(format!(
                    "Connection string has no host: {}",
                    crate::db::redact_url(url)
                )));
            }
            Ok(())
        }
    }
}
