//! Mock database client for testing.
//!
//! Provides an in-memory database implementation for headless testing.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{DatabaseClient, QueryResult};
use crate::error::{Result, SageError};
use crate::schema::TableDescription;

/// A mock database client that returns predefined tables and results.
#[derive(Debug, Default)]
pub struct MockDatabaseClient {
    tables: Vec<(String, TableDescription)>,
    results: Vec<(String, QueryResult)>,
    fail_with: Option<String>,
    executed: Mutex<Vec<String>>,
}

impl MockDatabaseClient {
    /// Creates a new mock database client with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table to the mock catalog.
    pub fn with_table(mut self, name: impl Into<String>, description: TableDescription) -> Self {
        let name = name.into();
        self.tables.retain(|(existing, _)| existing != &name);
        self.tables.push((name, description));
        self
    }

    /// Returns `result` for any query containing `sql_fragment` (case-insensitive).
    pub fn with_result(mut self, sql_fragment: impl Into<String>, result: QueryResult) -> Self {
        self.results.push((sql_fragment.into().to_lowercase(), result));
        self
    }

    /// Makes every query execution fail with the given message.
    pub fn failing_queries(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    /// Removes a table, simulating a drop in the source database.
    pub fn drop_table(&mut self, name: &str) {
        self.tables.retain(|(existing, _)| existing != name);
    }

    /// Returns every SQL string passed to `execute_query`, in order.
    pub fn executed_queries(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn describe_table(&self, table: &str) -> Result<TableDescription> {
        self.tables
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, description)| description.clone())
            .ok_or_else(|| SageError::not_found(table))
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sql.to_string());

        if let Some(message) = &self.fail_with {
            return Err(SageError::execution(message.clone()));
        }

        let lowered = sql.to_lowercase();
        let result = self
            .results
            .iter()
            .find(|(fragment, _)| lowered.contains(fragment.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_default();

        Ok(result.with_execution_time(Duration::from_millis(1)))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
