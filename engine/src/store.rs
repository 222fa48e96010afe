//! The store a snapshot is read from and written to.
//!
//! The engine never talks to a database directly. Everything goes through
//! [`SnapshotStore`], whose calls are the only suspension points of a transfer.

use crate::{error::StoreError, Record, RecordId, TableName};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Result type for store calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A table-oriented record store.
///
/// Implementations own their locking policy. Concurrent imports against the
/// same store must be serialized by the caller.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Read every row of a table, in store order.
    async fn select_all(&self, table: &str) -> StoreResult<Vec<Record>>;

    /// Append rows to a table, keeping their order.
    async fn insert_many(&self, table: &str, rows: Vec<Record>) -> StoreResult<()>;

    /// Delete every row of every transferable table.
    async fn purge_all(&self) -> StoreResult<()>;

    /// Set one column of one row.
    async fn update_field(
        &self,
        table: &str,
        id: &RecordId,
        field: &str,
        value: Value,
    ) -> StoreResult<()>;
}

/// An in-memory store holding tables as ordered row lists.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<BTreeMap<TableName, Vec<Record>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with rows.
    pub fn with_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<Record>)>,
        S: Into<TableName>,
    {
        Self {
            tables: Mutex::new(
                tables
                    .into_iter()
                    .map(|(name, rows)| (name.into(), rows))
                    .collect(),
            ),
        }
    }

    /// Copy of a table's rows, empty if the table was never written.
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.lock().get(table).cloned().unwrap_or_default()
    }

    /// Copy of the whole store.
    pub fn dump(&self) -> BTreeMap<TableName, Vec<Record>> {
        self.lock().clone()
    }

    // Every mutation completes before the guard drops, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<TableName, Vec<Record>>> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn select_all(&self, table: &str) -> StoreResult<Vec<Record>> {
        Ok(self.rows(table))
    }

    async fn insert_many(&self, table: &str, rows: Vec<Record>) -> StoreResult<()> {
        let mut tables = self.lock();
        let existing = tables.entry(table.to_string()).or_default();

        for row in &rows {
            if let Some(id) = row.id() {
                if existing.iter().any(|r| r.id().as_ref() == Some(&id)) {
                    return Err(StoreError::new(format!(
                        "duplicate key {} in table {}",
                        id, table
                    )));
                }
            }
        }

        existing.extend(rows);
        Ok(())
    }

    async fn purge_all(&self) -> StoreResult<()> {
        let mut tables = self.lock();
        for rows in tables.values_mut() {
            rows.clear();
        }
        Ok(())
    }

    async fn update_field(
        &self,
        table: &str,
        id: &RecordId,
        field: &str,
        value: Value,
    ) -> StoreResult<()> {
        let mut tables = self.lock();
        let row = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| r.id().as_ref() == Some(id)))
            .ok_or_else(|| StoreError::new(format!("row {} not found in table {}", id, table)))?;

        row.set(field, value);
        Ok(())
    }
}
