//! Database abstraction layer for Sage.
//!
//! Provides a trait-based interface for the two things the pipeline needs
//! from the source database: schema introspection and read-only query
//! execution.

mod mock;
mod postgres;
mod sqlite;
mod types;

pub use mock::MockDatabaseClient;
pub use postgres::PostgresClient;
pub use sqlite::SqliteClient;
pub use types::{QueryResult, Row, Value};

use crate::error::{Result, SageError};
use crate::schema::TableDescription;
use async_trait::async_trait;
use url::Url;

/// Query timeout in seconds.
pub(crate) const QUERY_TIMEOUT_SECS: u64 = 30;

/// Maximum rows to return from a query.
pub(crate) const MAX_ROWS: usize = 1000;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

impl DatabaseBackend {
    /// Determines the backend from a connection URL's scheme.
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url
            .split_once(':')
            .map(|(scheme, _)| scheme.to_lowercase())
            .ok_or_else(|| SageError::config(format!("Invalid database URL: {url}")))?;

        match scheme.as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(SageError::config(format!(
                "Unsupported database scheme '{other}'. Expected 'sqlite' or 'postgres'"
            ))),
        }
    }

    /// Returns the backend as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }
}

/// Returns a display-safe version of a connection URL (password removed).
pub fn redact_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("****"));
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}

/// Creates a database client for the given connection URL.
pub async fn connect(url: &str) -> Result<Box<dyn DatabaseClient>> {
    match DatabaseBackend::from_url(url)? {
        DatabaseBackend::Sqlite => Ok(Box::new(SqliteClient::connect(url).await?)),
        DatabaseBackend::Postgres => Ok(Box::new(PostgresClient::connect(url).await?)),
    }
}

/// Trait defining the interface for database clients.
///
/// Implementations never modify the source database.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Lists the names of all user tables.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Returns the columns and foreign keys of one table.
    async fn describe_table(&self, table: &str) -> Result<TableDescription>;

    /// Executes a read-only SQL query and returns all rows.
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    /// Closes the database connection.
    async fn close(&self) -> Result<()>;
}
