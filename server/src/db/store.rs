//! Snapshot store backed by one PostgreSQL transaction.
//!
//! Rows travel as JSONB: reads use `to_jsonb`, writes use
//! `jsonb_populate_record(set)` against the table's own row type, so the
//! store needs no per-table column list.
//!
//! An import runs entirely inside the transaction and is only committed once
//! the engine reports success, so a failed import leaves the previous data
//! in place.

use crate::db::Pool;
use async_trait::async_trait;
use pantry_transfer::{
    Record, RecordId, Registry, SnapshotStore, StoreError, StoreResult, TableName,
};
use serde_json::{Map, Value};
use sqlx::{Postgres, Transaction};
use tokio::sync::Mutex;

/// A [`SnapshotStore`] over a single database transaction.
pub struct PgSnapshotStore {
    tx: Mutex<Transaction<'static, Postgres>>,
    tables: Vec<TableName>,
}

impl PgSnapshotStore {
    /// Open a read-write transaction for an import.
    pub async fn begin(pool: &Pool, registry: &Registry) -> Result<Self, sqlx::Error> {
        let tx = pool.begin().await?;
        Ok(Self::new(tx, registry))
    }

    /// Open a read-only transaction that sees one consistent state of every table.
    pub async fn begin_read_only(pool: &Pool, registry: &Registry) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(Self::new(tx, registry))
    }

    fn new(tx: Transaction<'static, Postgres>, registry: &Registry) -> Self {
        Self {
            tx: Mutex::new(tx),
            tables: registry.table_names().map(str::to_owned).collect(),
        }
    }

    pub async fn commit(self) -> Result<(), sqlx::Error> {
        self.tx.into_inner().commit().await
    }

    pub async fn rollback(self) -> Result<(), sqlx::Error> {
        self.tx.into_inner().rollback().await
    }

    fn registered(&self, table: &str) -> StoreResult<()> {
        if self.tables.iter().any(|t| t == table) {
            Ok(())
        } else {
            Err(StoreError::new(format!("table {} is not registered", table)))
        }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn select_all(&self, table: &str) -> StoreResult<Vec<Record>> {
        self.registered(table)?;
        let mut tx = self.tx.lock().await;

        let rows = sqlx::query_scalar::<_, Value>(&select_sql(table))
            .fetch_all(&mut **tx)
            .await
            .map_err(store_error)?;

        rows.into_iter()
            .map(|row| match row {
                Value::Object(map) => Ok(Record::from(map)),
                other => Err(StoreError::new(format!(
                    "table {} returned a non-object row: {}",
                    table, other
                ))),
            })
            .collect()
    }

    async fn insert_many(&self, table: &str, rows: Vec<Record>) -> StoreResult<()> {
        self.registered(table)?;
        let mut tx = self.tx.lock().await;

        let rows = Value::Array(rows.into_iter().map(Value::from).collect());
        sqlx::query(&insert_sql(table))
            .bind(rows)
            .execute(&mut **tx)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn purge_all(&self) -> StoreResult<()> {
        let mut tx = self.tx.lock().await;
        sqlx::query(&purge_sql(&self.tables))
            .execute(&mut **tx)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn update_field(
        &self,
        table: &str,
        id: &RecordId,
        field: &str,
        value: Value,
    ) -> StoreResult<()> {
        self.registered(table)?;
        let mut tx = self.tx.lock().await;

        let mut patch = Map::new();
        patch.insert("id".to_string(), id.as_value().clone());
        patch.insert(field.to_string(), value);

        let result = sqlx::query(&update_sql(table, field))
            .bind(Value::Object(patch))
            .execute(&mut **tx)
            .await
            .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::new(format!(
                "row {} not found in table {}",
                id, table
            )));
        }
        Ok(())
    }
}

fn store_error(e: sqlx::Error) -> StoreError {
    StoreError::new(e.to_string())
}

/// Quote an SQL identifier.
fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn select_sql(table: &str) -> String {
    format!("SELECT to_jsonb(t) FROM {} AS t", ident(table))
}

fn insert_sql(table: &str) -> String {
    let table = ident(table);
    format!(
        "INSERT INTO {table} SELECT * FROM jsonb_populate_recordset(NULL::{table}, $1)"
    )
}

fn purge_sql(tables: &[TableName]) -> String {
    let list: Vec<String> = tables.iter().map(|t| ident(t)).collect();
    format!("TRUNCATE {} CASCADE", list.join(", "))
}

fn update_sql(table: &str, field: &str) -> String {
    let table = ident(table);
    let field = ident(field);
    format!(
        "UPDATE {table} SET {field} = p.{field} \
         FROM jsonb_populate_record(NULL::{table}, $1) AS p \
         WHERE {table}.\"id\" = p.\"id\""
    )
}
