//! Export handler - reads every business table into a snapshot.

use crate::db::{PgSnapshotStore, Pool};
use crate::error::Result;
use pantry_transfer::{export, ExportOptions, Registry, Snapshot};

/// Export the whole dataset.
///
/// Reads run in one read-only transaction so the snapshot never mixes two
/// states of the database. The transaction is always rolled back.
pub async fn handle_export(
    pool: &Pool,
    registry: &Registry,
    options: ExportOptions,
) -> Result<Snapshot> {
    let store = PgSnapshotStore::begin_read_only(pool, registry).await?;
    let result = export(&store, registry, options).await;

    if let Err(e) = store.rollback().await {
        tracing::warn!("Failed to close export transaction: {}", e);
    }

    Ok(result?)
}
