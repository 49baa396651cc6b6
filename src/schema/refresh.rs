//! Schema refresh from the source database.
//!
//! Copies table descriptors from a [`DatabaseClient`] into the
//! [`SchemaStore`] and keeps the keyword index consistent with what
//! was written.

use std::collections::BTreeSet;

use tracing::{debug, info};

use super::{KeywordIndex, SchemaStore, TableSchemaRecord};
use crate::db::DatabaseClient;
use crate::error::{Result, SageError};

/// Outcome of a full refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Tables written to the store, in source order.
    pub refreshed: Vec<String>,

    /// Tables removed from the store because the source no longer has them.
    pub pruned: Vec<String>,
}

/// Re-reads every table from the source and rewrites the store.
///
/// Records for tables the source no longer reports are deleted. A
/// human-written description already in the store survives the rewrite.
pub async fn refresh_all(
    source: &dyn DatabaseClient,
    store: &SchemaStore,
    index: &KeywordIndex,
) -> Result<RefreshSummary> {
    let tables = source.list_tables().await?;
    let mut summary = RefreshSummary::default();

    for table in &tables {
        refresh_table(source, store, index, table).await?;
        summary.refreshed.push(table.clone());
    }

    let live: BTreeSet<&str> = tables.iter().map(String::as_str).collect();
    for stale in store.list_all().await?.into_keys() {
        if live.contains(stale.as_str()) {
            continue;
        }
        if store.delete(&stale).await? {
            index.invalidate(&stale);
            debug!(table = %stale, "Pruned vanished table");
            summary.pruned.push(stale);
        }
    }

    info!(
        refreshed = summary.refreshed.len(),
        pruned = summary.pruned.len(),
        "Schema refresh complete"
    );
    Ok(summary)
}

/// Re-reads one table from the source and rewrites its store record.
pub async fn refresh_table(
    source: &dyn DatabaseClient,
    store: &SchemaStore,
    index: &KeywordIndex,
    table: &str,
) -> Result<TableSchemaRecord> {
    let description = source.describe_table(table).await?;

    // An unreadable record aborts the refresh so its description is not overwritten.
    let existing_description = match store.get(table).await {
        Ok(record) => record.description,
        Err(SageError::NotFound(_)) => None,
        Err(e) => return Err(e),
    };

    let record = store
        .upsert(
            table,
            description.columns,
            description.foreign_keys,
            existing_description.as_deref(),
        )
        .await?;
    index.invalidate(table);

    Ok(record)
}
