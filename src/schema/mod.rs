//! Schema metadata for Sage.
//!
//! Holds the per-table column and foreign-key descriptors, the keyword
//! extractor used for lexical relevance matching, and the persistent
//! schema store that serves them.

pub mod keywords;
mod migrations;
pub mod refresh;
pub mod store;

pub use keywords::{extract, table_keywords, KeywordIndex};
pub use refresh::{refresh_all, refresh_table, RefreshSummary};
pub use store::SchemaStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot of every table record, keyed by table name.
///
/// Iteration order is the store's enumeration order and is used for
/// tie-breaking during relevance ranking.
pub type SchemaSnapshot = BTreeMap<String, TableSchemaRecord>;

/// A column as read from the source database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,

    /// Declared type as reported by the source (e.g. "INTEGER", "VARCHAR(100)").
    pub declared_type: String,

    /// Whether the column allows NULL values.
    pub nullable: bool,

    /// Whether the column is part of the primary key.
    pub is_primary_key: bool,
}

impl ColumnDescriptor {
    /// Creates a nullable, non-key column.
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            nullable: true,
            is_primary_key: false,
        }
    }

    /// Sets whether the column is nullable.
    pub fn nullable(self, nullable: bool) -> Self {
        Self { nullable, ..self }
    }

    /// Marks the column as (part of) the primary key.
    pub fn primary_key(self) -> Self {
        Self {
            is_primary_key: true,
            ..self
        }
    }

    /// Renders the column as `name: type [PRIMARY KEY] NULL|NOT NULL`.
    pub fn describe(&self) -> String {
        let mut parts = vec![format!("{}: {}", self.name, self.declared_type)];
        if self.is_primary_key {
            parts.push("PRIMARY KEY".to_string());
        }
        parts.push(if self.nullable { "NULL" } else { "NOT NULL" }.to_string());
        parts.join(" ")
    }
}

/// A foreign-key relationship from one table to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDescriptor {
    /// Constrained columns in the owning table, in constraint order.
    pub source_columns: Vec<String>,

    /// Referenced table.
    pub target_table: String,

    /// Referenced columns, positionally matching `source_columns`.
    pub target_columns: Vec<String>,
}

impl ForeignKeyDescriptor {
    /// Creates a new foreign key descriptor.
    pub fn new(
        source_columns: Vec<String>,
        target_table: impl Into<String>,
        target_columns: Vec<String>,
    ) -> Self {
        Self {
            source_columns,
            target_table: target_table.into(),
            target_columns,
        }
    }

    /// Renders the relationship as `source_columns -> target_table.target_columns`.
    pub fn describe(&self) -> String {
        format!(
            "{} -> {}.{}",
            self.source_columns.join(", "),
            self.target_table,
            self.target_columns.join(", ")
        )
    }
}

/// Columns and foreign keys of one table, as reported by introspection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDescription {
    pub columns: Vec<ColumnDescriptor>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
}

/// The stored schema record for a single table.
///
/// Records are snapshots: consumers read them but never mutate them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchemaRecord {
    /// Table name, case-sensitive and unique within the store.
    pub table_name: String,

    /// Columns in declaration order.
    pub columns: Vec<ColumnDescriptor>,

    /// Outgoing foreign keys.
    pub foreign_keys: Vec<ForeignKeyDescriptor>,

    /// When the record was last written to the store.
    pub last_updated: DateTime<Utc>,

    /// Optional human-written description of the table.
    pub description: Option<String>,
}

impl TableSchemaRecord {
    /// Renders the table as a `Table:` header followed by one line per column.
    pub fn format_columns(&self) -> String {
        let mut lines = Vec::with_capacity(self.columns.len() + 2);
        lines.push(format!("Table: {}", self.table_name));
        if let Some(description) = &self.description {
            lines.push(format!("Description: {}", description));
        }
        lines.push("Columns:".to_string());
        lines.extend(self.columns.iter().map(|c| format!("- {}", c.describe())));
        lines.join("\n")
    }
}

/// Renders every table in the snapshot, separated by blank lines.
///
/// Used to answer questions about the schema itself.
pub fn format_schema_listing(snapshot: &SchemaSnapshot) -> String {
    if snapshot.is_empty() {
        return "No tables found in the schema store.".to_string();
    }

    snapshot
        .values()
        .map(TableSchemaRecord::format_columns)
        .collect::<Vec<_>>()
        .join("\n\n")
}
