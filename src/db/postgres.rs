//! PostgreSQL database client implementation.
//!
//! Introspects the `public` schema through `information_schema` and runs
//! every query inside a `READ ONLY` transaction that is rolled back.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column as SqlxColumn, Row as SqlxRow, TypeInfo};
use tracing::{debug, warn};

use super::{redact_url, DatabaseClient, QueryResult, Row, Value, MAX_ROWS, QUERY_TIMEOUT_SECS};
use crate::error::{Result, SageError};
use crate::schema::{ColumnDescriptor, ForeignKeyDescriptor, TableDescription};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// PostgreSQL database client.
#[derive(Debug, Clone)]
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Connects to the database, retrying transient failures with backoff.
    pub async fn connect(url: &str) -> Result<Self> {
        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            match PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
                .connect(url)
                .await
            {
                Ok(pool) => return Ok(Self { pool }),
                Err(e) => {
                    let transient = is_transient_error(&e);
                    last_error = Some(e);
                    if !transient || attempt == MAX_RETRY_ATTEMPTS {
                        break;
                    }
                    warn!(
                        "Connection attempt {} failed (transient error), retrying in {:?}",
                        attempt, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }

        let detail = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no connection attempt was made".to_string());
        Err(SageError::connection(format!(
            "Cannot connect to {}: {}",
            redact_url(url),
            detail
        )))
    }

    async fn fetch_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let rows: Vec<(String, String, String, bool)> = sqlx::query_as(
            r#"
            SELECT
                c.column_name::text,
                c.data_type::text,
                c.is_nullable::text,
                EXISTS (
                    SELECT 1
                    FROM information_schema.table_constraints tc
                    JOIN information_schema.key_column_usage kcu
                        ON tc.constraint_name = kcu.constraint_name
                        AND tc.table_schema = kcu.table_schema
                    WHERE tc.constraint_type = 'PRIMARY KEY'
                        AND tc.table_schema = c.table_schema
                        AND tc.table_name = c.table_name
                        AND kcu.column_name = c.column_name
                ) AS is_primary_key
            FROM information_schema.columns c
            WHERE c.table_schema = 'public' AND c.table_name = $1
            ORDER BY c.ordinal_position
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SageError::execution(format!("Failed to fetch columns for {table}: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(name, declared_type, is_nullable, is_primary_key)| ColumnDescriptor {
                name,
                declared_type,
                nullable: is_nullable == "YES",
                is_primary_key,
            })
            .collect())
    }

    async fn fetch_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyDescriptor>> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT
                tc.constraint_name::text,
                kcu.column_name::text AS source_column,
                ccu.table_name::text AS target_table,
                ccu.column_name::text AS target_column
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
                ON tc.constraint_name = ccu.constraint_name
                AND tc.table_schema = ccu.table_schema
            WHERE tc.table_schema = 'public'
                AND tc.table_name = $1
                AND tc.constraint_type = 'FOREIGN KEY'
            ORDER BY tc.constraint_name, kcu.ordinal_position
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            SageError::execution(format!("Failed to fetch foreign keys for {table}: {e}"))
        })?;

        let mut grouped: BTreeMap<String, ForeignKeyDescriptor> = BTreeMap::new();
        for (constraint, source, target_table, target) in rows {
            let fk = grouped.entry(constraint).or_insert_with(|| {
                ForeignKeyDescriptor::new(Vec::new(), target_table, Vec::new())
            });
            if !fk.source_columns.contains(&source) {
                fk.source_columns.push(source);
            }
            if !fk.target_columns.contains(&target) {
                fk.target_columns.push(target);
            }
        }

        Ok(grouped.into_values().collect())
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    async fn list_tables(&self) -> Result<Vec<String>> {
        sqlx::query_scalar(
            r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
            ORDER BY table_name
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

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SageError::execution(format!("Failed to begin transaction: {e}")))?;

        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| SageError::execution(format!("Failed to set read-only mode: {e}")))?;

        let fetched = tokio::time::timeout(
            Duration::from_secs(QUERY_TIMEOUT_SECS),
            sqlx::query(sql).fetch_all(&mut *tx),
        )
        .await;

        if let Err(e) = tx.rollback().await {
            warn!("Failed to roll back read-only transaction: {e}");
        }

        let rows = fetched
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

fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v.into()))
            .unwrap_or(Value::Null),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v.into()))
            .unwrap_or(Value::Null),
        "INT8" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v.into()))
            .unwrap_or(Value::Null),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),
        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Determines if a connection error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();
    ["connection refused", "timed out", "temporarily unavailable", "connection reset"]
        .iter()
        .any(|needle| error_str.contains(needle))
}

fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = format!("ERROR: {}", db_error.message());
    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }
    result
}
