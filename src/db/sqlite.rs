//! SQLite database client implementation.
//!
//! Opens the source database read-only and introspects it through the
//! `pragma_table_info` and `pragma_foreign_key_list` table-valued functions.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as SqlxColumn, Row as SqlxRow, ValueRef};
use tracing::{debug, warn};

use super::{DatabaseClient, QueryResult, Row, Value, MAX_ROWS, QUERY_TIMEOUT_SECS};
use crate::error::{Result, SageError};
use crate::schema::{ColumnDescriptor, ForeignKeyDescriptor, TableDescription};

/// SQLite database client.
#[derive(Debug, Clone)]
pub struct SqliteClient {
    pool: SqlitePool,
}

impl SqliteClient {
    /// Opens a read-only connection pool for the given `sqlite:` URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| SageError::connection(format!("Invalid SQLite URL '{url}': {e}")))?
            .read_only(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| SageError::connection(format!("Cannot open SQLite database: {e}")))?;

        debug!("Opened SQLite database read-only");
        Ok(Self { pool })
    }

    async fn fetch_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let rows: Vec<(String, String, i64, i64)> = sqlx::query_as(
            r#"SELECT name, type, "notnull", pk FROM pragma_table_info(?1) ORDER BY cid"#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SageError::execution(format!("Failed to fetch columns for {table}: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(name, declared_type, not_null, pk)| ColumnDescriptor {
                name,
                declared_type,
                nullable: not_null == 0 && pk == 0,
                is_primary_key: pk > 0,
            })
            .collect())
    }

    async fn fetch_foreign_keys(
        &self,
        table: &str,
    ) -> Result<Vec<ForeignKeyDescriptor>> {
        let rows: Vec<(i64, String, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT id, "table", "from", "to"
            FROM pragma_foreign_key_list(?1)
            ORDER BY id, seq
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            SageError::execution(format!("Failed to fetch foreign keys for {table}: {e}"))
        })?;

        // One constraint may span several rows; group them by constraint id.
        let mut grouped: BTreeMap<i64, ForeignKeyDescriptor> = BTreeMap::new();
        let mut implicit_targets = Vec::new();

        for (id, target_table, from, to) in rows {
            let fk = grouped.entry(id).or_insert_with(|| {
                ForeignKeyDescriptor::new(Vec::new(), target_table.clone(), Vec::new())
            });
            fk.source_columns.push(from);
            match to {
                Some(to) => fk.target_columns.push(to),
                None => implicit_targets.push(id),
            }
        }

        // `REFERENCES parent` without columns points at the parent's primary key.
        for id in implicit_targets {
            if let Some(fk) = grouped.get_mut(&id) {
                if fk.target_columns.is_empty() {
                    fk.target_columns = self
                        .fetch_columns(&fk.target_table)
                        .await?
                        .into_iter()
                        .filter(|c| c.is_primary_key)
                        .map(|c| c.name)
                        .collect();
                }
            }
        }

        Ok(grouped.into_values().collect())
    }
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    async fn list_tables(&self) -> Result<Vec<String>> {
        sqlx::query_scalar(
            r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SageError::execution(format!("Failed to list tables: {e}")))
    }

    async fn describe_table(&self, table: &str) -> Result<TableDescription> {
        let columns = self.fetch_columns(table).await?;
        if columns.is_empty() {
            return Err(SageError::not_found(table));
        }
        let foreign_keys = self.fetch_foreign_keys(table).await?;

        Ok(TableDescription {
            columns,
            foreign_keys,
        })
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();

        let rows = tokio::time::timeout(
            Duration::from_secs(QUERY_TIMEOUT_SECS),
            sqlx::query(sql).fetch_all(&self.pool),
        )
        .await
        .map_err(|_| {
            SageError::execution(format!(
                "Query timed out after {QUERY_TIMEOUT_SECS} seconds"
            ))
        })?
        .map_err(|e| SageError::execution(format_query_error(e)))?;

        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let was_truncated = rows.len() > MAX_ROWS;
        if was_truncated {
            warn!(
                "Query returned {} rows, truncating to {} rows",
                rows.len(),
                MAX_ROWS
            );
        }

        let rows: Vec<Row> = rows.iter().take(MAX_ROWS).map(convert_row).collect();

        Ok(QueryResult {
            columns,
            rows,
            execution_time: start.elapsed(),
            was_truncated,
        })
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Converts a sqlx SqliteRow to our Row type.
fn convert_row(row: &SqliteRow) -> Row {
    (0..row.columns().len())
        .map(|i| convert_value(row, i))
        .collect()
}

/// Decodes one value by trying the SQLite storage classes in turn.
fn convert_value(row: &SqliteRow, index: usize) -> Value {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(_) => {}
        Err(_) => return Value::Null,
    }

    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Value::Int(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return Value::Float(v);
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Value::String(v);
    }
    row.try_get::<Vec<u8>, _>(index)
        .map(Value::Bytes)
        .unwrap_or(Value::Null)
}

fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => format!("ERROR: {}", db_error.message()),
        None => error.to_string(),
    }
}
