//! Error types for Sage.
//!
//! Defines the main error enum used throughout the application.

use thiserror::Error;

/// Main error type for Sage operations.
#[derive(Error, Debug)]
pub enum SageError {
    /// The schema store's persistence layer is unreachable or failed.
    #[error("Schema store unavailable: {0}")]
    StoreUnavailable(String),

    /// A table is not known to the schema store.
    #[error("Table not found: {0}")]
    NotFound(String),

    /// The model returned an empty or whitespace-only reply.
    #[error("Empty response received from the model")]
    EmptyResponse,

    /// The model reply contains no SELECT statement.
    #[error("No valid SELECT statement found in response")]
    NoSelectFound,

    /// The extracted statement does not start with SELECT.
    #[error("Query must start with SELECT: {0}")]
    InvalidPrefix(String),

    /// The statement parses but would do something other than read.
    #[error("Query is not read-only: {0}")]
    ReadOnlyViolation(String),

    /// The execution service rejected or failed to run the query.
    #[error("Failed to execute SQL query: {0}")]
    ExecutionFailed(String),

    /// Database connection errors (host unreachable, bad URL, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// LLM API errors (rate limits, auth, timeouts, etc.)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Semantic classifier errors.
    #[error("Classifier error: {0}")]
    Classifier(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The request was abandoned by the caller.
    #[error("Request cancelled")]
    Cancelled,

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SageError {
    /// Creates a store-unavailable error with the given message.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Creates a not-found error for the given table.
    pub fn not_found(table: impl Into<String>) -> Self {
        Self::NotFound(table.into())
    }

    /// Creates an execution error with the given message.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates an LLM error with the given message.
    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    /// Creates a classifier error with the given message.
    pub fn classifier(msg: impl Into<String>) -> Self {
        Self::Classifier(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true when the error means the model produced unusable output,
    /// which the user can address by rephrasing the question.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Self::EmptyResponse
                | Self::NoSelectFound
                | Self::InvalidPrefix(_)
                | Self::ReadOnlyViolation(_)
        )
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::StoreUnavailable(_) => "Store Error",
            Self::NotFound(_) => "Not Found",
            Self::EmptyResponse | Self::NoSelectFound | Self::InvalidPrefix(_) => {
                "Invalid Model Output"
            }
            Self::ReadOnlyViolation(_) => "Safety Error",
            Self::ExecutionFailed(_) => "Query Error",
            Self::Connection(_) => "Connection Error",
            Self::Llm(_) => "LLM Error",
            Self::Classifier(_) => "Classifier Error",
            Self::Config(_) => "Configuration Error",
            Self::Cancelled => "Cancelled",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using SageError.
pub type Result<T> = std::result::Result<T, SageError>;
