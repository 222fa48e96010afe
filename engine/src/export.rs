//! Export: read every registered table and stamp it into a snapshot.

use crate::{error::Result, Error, Registry, Snapshot, SnapshotStore};
use chrono::Utc;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Options for [`export`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    /// Null out the binary columns of tables that declare them
    pub plain: bool,
}

impl ExportOptions {
    /// A full export.
    pub fn full() -> Self {
        Self { plain: false }
    }

    /// An export without binary payloads.
    pub fn plain() -> Self {
        Self { plain: true }
    }
}

/// Read every registered table and build a snapshot document.
///
/// Tables are read concurrently; export only records state, so the order
/// of reads does not matter. The first failed read fails the whole export.
pub async fn export<S>(store: &S, registry: &Registry, options: ExportOptions) -> Result<Snapshot>
where
    S: SnapshotStore + ?Sized,
{
    let reads = registry.tables().iter().map(|spec| async move {
        let rows = store
            .select_all(&spec.name)
            .await
            .map_err(|cause| Error::SourceReadFailed {
                table: spec.name.clone(),
                cause,
            })?;
        tracing::debug!(table = %spec.name, rows = rows.len(), "read table");
        Ok::<_, Error>((spec.name.clone(), rows))
    });

    let tables: BTreeMap<_, _> = match try_join_all(reads).await {
        Ok(tables) => tables.into_iter().collect(),
        Err(e) => {
            tracing::warn!(error = %e, "export aborted");
            return Err(e);
        }
    };

    let mut snapshot = if options.plain {
        Snapshot::encode_with(tables, Utc::now(), |table, row| {
            if let Some(spec) = registry.table(table) {
                spec.strip_binary(row);
            }
        })
    } else {
        Snapshot::encode(tables, Utc::now())
    };
    snapshot.plain = options.plain;

    tracing::info!(
        tables = snapshot.tables.len(),
        records = snapshot.record_count(),
        plain = options.plain,
        "export complete"
    );

    Ok(snapshot)
}
