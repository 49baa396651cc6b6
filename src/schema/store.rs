//! Persistent schema store.
//!
//! Keeps one record per table in a local SQLite database. Every write is
//! committed before the call returns, so a subsequent read from any caller
//! observes it.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::{debug, info, warn};

use super::{migrations, ColumnDescriptor, ForeignKeyDescriptor, SchemaSnapshot, TableSchemaRecord};
use crate::error::{Result, SageError};

const MAX_OPEN_ATTEMPTS: u32 = 3;
const OPEN_RETRY_DELAY_MS: u64 = 100;

/// Raw database row for a table schema record.
#[derive(Debug, FromRow)]
struct TableSchemaRow {
    table_name: String,
    columns: String,
    foreign_keys: String,
    last_updated: String,
    description: Option<String>,
}

impl TryFrom<TableSchemaRow> for TableSchemaRecord {
    type Error = SageError;

    fn try_from(row: TableSchemaRow) -> Result<Self> {
        let columns: Vec<ColumnDescriptor> = serde_json::from_str(&row.columns).map_err(|e| {
            SageError::store(format!("Corrupt columns for {}: {e}", row.table_name))
        })?;
        let foreign_keys: Vec<ForeignKeyDescriptor> = serde_json::from_str(&row.foreign_keys)
            .map_err(|e| {
                SageError::store(format!("Corrupt foreign keys for {}: {e}", row.table_name))
            })?;
        let last_updated = DateTime::parse_from_rfc3339(&row.last_updated)
            .map_err(|e| {
                SageError::store(format!("Corrupt timestamp for {}: {e}", row.table_name))
            })?
            .with_timezone(&Utc);

        Ok(Self {
            table_name: row.table_name,
            columns,
            foreign_keys,
            last_updated,
            description: row.description,
        })
    }
}

/// SQLite-backed store of table schema records.
#[derive(Debug, Clone)]
pub struct SchemaStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SchemaStore {
    /// Opens or creates the schema store at the specified path.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                SageError::store(format!(
                    "Failed to create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let mut last_error = None;
        for attempt in 0..MAX_OPEN_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(
                    OPEN_RETRY_DELAY_MS * 2u64.pow(attempt),
                ))
                .await;
            }

            match Self::connect(path).await {
                Ok(pool) => {
                    migrations::run_migrations(&pool).await?;
                    info!("Schema store opened at {}", path.display());
                    return Ok(Self {
                        pool,
                        db_path: path.to_path_buf(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open schema store (attempt {}): {e}", attempt + 1);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| SageError::store("Failed to open schema store after retries")))
    }

    /// Returns the default schema store path for the current platform.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SageError::store("Could not determine config directory"))?;
        Ok(config_dir.join("db-sage").join("schema.db"))
    }

    async fn connect(path: &Path) -> Result<SqlitePool> {
        let conn_str = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&conn_str)
            .map_err(|e| SageError::store(format!("Invalid schema store path: {e}")))?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| SageError::store(format!("Failed to connect to schema store: {e}")))
    }

    /// Returns the path to the store's database file.
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Replaces the full record for a table and stamps it with the current time.
    ///
    /// Last write wins; there is no merging with a previous record.
    pub async fn upsert(
        &self,
        table_name: &str,
        columns: Vec<ColumnDescriptor>,
        foreign_keys: Vec<ForeignKeyDescriptor>,
        description: Option<&str>,
    ) -> Result<TableSchemaRecord> {
        let columns_json = serde_json::to_string(&columns)
            .map_err(|e| SageError::internal(format!("Failed to encode columns: {e}")))?;
        let foreign_keys_json = serde_json::to_string(&foreign_keys)
            .map_err(|e| SageError::internal(format!("Failed to encode foreign keys: {e}")))?;
        let description = description.filter(|d| !d.is_empty());
        let last_updated = Utc::now().trunc_subsecs(6);

        sqlx::query(
            r#"
            INSERT INTO table_schemas (table_name, columns, foreign_keys, last_updated, description)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(table_name) DO UPDATE SET
                columns = excluded.columns,
                foreign_keys = excluded.foreign_keys,
                last_updated = excluded.last_updated,
                description = excluded.description
            "#,
        )
        .bind(table_name)
        .bind(&columns_json)
        .bind(&foreign_keys_json)
        .bind(last_updated.to_rfc3339_opts(SecondsFormat::Micros, true))
        .bind(description)
        .execute(&self.pool)
        .await
        .map_err(|e| SageError::store(format!("Failed to upsert schema for {table_name}: {e}")))?;

        debug!(
            table = table_name,
            columns = columns.len(),
            foreign_keys = foreign_keys.len(),
            "Stored table schema"
        );

        Ok(TableSchemaRecord {
            table_name: table_name.to_string(),
            columns,
            foreign_keys,
            last_updated,
            description: description.map(String::from),
        })
    }

    /// Retrieves the record for a table, or `NotFound`.
    pub async fn get(&self, table_name: &str) -> Result<TableSchemaRecord> {
        let row: Option<TableSchemaRow> = sqlx::query_as(
            r#"
            SELECT table_name, columns, foreign_keys, last_updated, description
            FROM table_schemas
            WHERE table_name = ?
            "#,
        )
        .bind(table_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SageError::store(format!("Failed to get schema for {table_name}: {e}")))?;

        row.ok_or_else(|| SageError::not_found(table_name))?
            .try_into()
    }

    /// Retrieves every record, keyed by table name.
    pub async fn list_all(&self) -> Result<SchemaSnapshot> {
        let rows: Vec<TableSchemaRow> = sqlx::query_as(
            r#"
            SELECT table_name, columns, foreign_keys, last_updated, description
            FROM table_schemas
            ORDER BY table_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SageError::store(format!("Failed to list schemas: {e}")))?;

        rows.into_iter()
            .map(|row| {
                let record = TableSchemaRecord::try_from(row)?;
                Ok((record.table_name.clone(), record))
            })
            .collect()
    }

    /// Removes the record for a table. Returns true if a record was deleted.
    pub async fn delete(&self, table_name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM table_schemas WHERE table_name = ?")
            .bind(table_name)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                SageError::store(format!("Failed to delete schema for {table_name}: {e}"))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
