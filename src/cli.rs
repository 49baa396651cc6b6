//! Command-line argument parsing for Sage.

use crate::config::Config;
use clap::Parser;
use std::path::PathBuf;

/// Answers natural-language questions about a relational database.
#[derive(Parser, Debug)]
#[command(name = "sage")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Question to answer. When omitted, questions are read from stdin, one per line.
    #[arg(value_name = "QUESTION")]
    pub question: Option<String>,

    /// Source database URL (e.g., sqlite:data/app.db or postgres://user@host/db)
    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    /// Schema store file path
    #[arg(long, value_name = "PATH")]
    pub schema_db: Option<PathBuf>,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// LLM provider to use (openai, ollama, mock)
    #[arg(long, value_name = "PROVIDER")]
    pub llm: Option<String>,

    /// Semantic classifier provider (huggingface, mock, disabled)
    #[arg(long, value_name = "PROVIDER")]
    pub classifier: Option<String>,

    /// Maximum number of tables described in each prompt
    #[arg(long, value_name = "N")]
    pub max_tables: Option<usize>,

    /// Skip re-reading the source schema at startup
    #[arg(long)]
    pub no_refresh: bool,

    /// Write logs to a file under the platform state directory instead of stderr
    #[arg(long)]
    pub log_file: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Overrides configuration values with any flags that were given.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(url) = &self.database_url {
            config.database.url = Some(url.clone());
        }
        if let Some(path) = &self.schema_db {
            config.schema_store.path = Some(path.clone());
        }
        if let Some(provider) = &self.llm {
            config.llm.provider = provider.clone();
        }
        if let Some(provider) = &self.classifier {
            config.classifier.provider = provider.clone();
        }
        if let Some(max_tables) = self.max_tables {
            config.relevance.max_tables = max_tables;
        }
    }

    /// Returns the single question to answer, if one was given.
    pub fn question(&self) -> Option<&str> {
        self.question
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }
}
