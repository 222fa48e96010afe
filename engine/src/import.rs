//! Import: replace the destination store with the contents of a snapshot.
//!
//! The import runs as a fixed sequence, each step acknowledged by the store
//! before the next starts:
//!
//! 1. validate the document (no store call is made before this succeeds)
//! 2. purge the store
//! 3. pass 1: independent tables, written concurrently
//! 4. pass 2: deferring tables, with every deferred column nulled
//! 5. pass 3: referenced tables
//! 6. pass 4: dependent tables, in registry order
//! 7. patch the deferred columns back to their original values
//!
//! A failure after step 2 aborts immediately and leaves the store as it
//! is; nothing already written is undone. Callers needing all-or-nothing
//! semantics must run the import inside a store-level transaction.

use crate::{
    error::Result, Error, Pass, Patch, Record, Registry, Snapshot, SnapshotStore, TableName,
    SNAPSHOT_APP, SNAPSHOT_VERSION,
};
use futures::future::try_join_all;
use futures::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Default number of patches in flight at once.
pub const DEFAULT_PATCH_CONCURRENCY: usize = 8;

/// Options for [`import`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOptions {
    /// Maximum concurrent patch updates (at least 1)
    pub patch_concurrency: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            patch_concurrency: DEFAULT_PATCH_CONCURRENCY,
        }
    }
}

/// Outcome of a successful import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// Rows written per registered table
    pub imported: BTreeMap<TableName, usize>,
    /// Deferred columns restored in the patch pass
    pub patched: usize,
}

impl ImportReport {
    /// Total rows written.
    pub fn total(&self) -> usize {
        self.imported.values().sum()
    }
}

/// Validate a raw document and import it.
pub async fn import<S>(
    store: &S,
    registry: &Registry,
    body: &Value,
    options: ImportOptions,
) -> Result<ImportReport>
where
    S: SnapshotStore + ?Sized,
{
    let snapshot = Snapshot::decode(registry, body).inspect_err(|e| {
        tracing::warn!(error = %e, "import rejected");
    })?;
    import_snapshot(store, registry, snapshot, options).await
}

/// Import an already decoded snapshot.
///
/// The snapshot is checked against the registry again before the purge, so
/// a hand-built document cannot cause a partial import either.
pub async fn import_snapshot<S>(
    store: &S,
    registry: &Registry,
    snapshot: Snapshot,
    options: ImportOptions,
) -> Result<ImportReport>
where
    S: SnapshotStore + ?Sized,
{
    let plan = Plan::stage(registry, snapshot).inspect_err(|e| {
        tracing::warn!(error = %e, "import rejected");
    })?;
    let report = plan.report();

    match plan.apply(store, options).await {
        Ok(()) => {
            tracing::info!(
                records = report.total(),
                patched = report.patched,
                "import complete"
            );
            Ok(report)
        }
        Err(e) => {
            tracing::warn!(error = %e, "import aborted, destination may be partially written");
            Err(e)
        }
    }
}

/// Rows staged for writing, already split into their pass-2 form.
struct Plan {
    tables: Vec<Staged>,
    patches: Vec<Patch>,
}

struct Staged {
    pass: Pass,
    name: TableName,
    rows: Vec<Record>,
}

impl Plan {
    fn stage(registry: &Registry, snapshot: Snapshot) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                actual: snapshot.version.to_string(),
            });
        }
        if snapshot.app != SNAPSHOT_APP {
            return Err(Error::AppMismatch {
                expected: SNAPSHOT_APP.to_string(),
                actual: snapshot.app,
            });
        }

        let mut source = snapshot.tables;
        let mut tables = Vec::with_capacity(registry.len());
        let mut patches = Vec::new();

        for spec in registry.tables() {
            let rows = source
                .remove(&spec.name)
                .ok_or_else(|| Error::MissingTable(spec.name.clone()))?;

            let rows = if spec.pass == Pass::Deferring {
                let deferred = spec.split_deferred(&rows)?;
                patches.extend(deferred.patches);
                deferred.rows
            } else {
                rows
            };

            tables.push(Staged {
                pass: spec.pass,
                name: spec.name.clone(),
                rows,
            });
        }

        Ok(Self { tables, patches })
    }

    fn report(&self) -> ImportReport {
        ImportReport {
            imported: self
                .tables
                .iter()
                .map(|t| (t.name.clone(), t.rows.len()))
                .collect(),
            patched: self.patches.len(),
        }
    }

    async fn apply<S>(mut self, store: &S, options: ImportOptions) -> Result<()>
    where
        S: SnapshotStore + ?Sized,
    {
        store
            .purge_all()
            .await
            .map_err(|cause| Error::PurgeFailed { cause })?;
        tracing::debug!("purged destination");

        for pass in Pass::ALL {
            let batch: Vec<_> = self
                .tables
                .iter_mut()
                .filter(|t| t.pass == pass)
                .map(|t| (t.name.clone(), std::mem::take(&mut t.rows)))
                .collect();

            if pass == Pass::Independent {
                try_join_all(
                    batch
                        .into_iter()
                        .map(|(name, rows)| insert(store, name, rows)),
                )
                .await?;
            } else {
                for (name, rows) in batch {
                    insert(store, name, rows).await?;
                }
            }
            tracing::debug!(%pass, "pass written");
        }

        let limit = options.patch_concurrency.max(1);
        stream::iter(self.patches)
            .map(Ok::<_, Error>)
            .try_for_each_concurrent(limit, |patch| async move {
                let Patch {
                    table,
                    record_id,
                    field,
                    value,
                } = patch;
                store
                    .update_field(&table, &record_id, &field, value)
                    .await
                    .map_err(|cause| Error::PatchFailed {
                        table,
                        record_id,
                        cause,
                    })
            })
            .await?;
        tracing::debug!("deferred fields patched");

        Ok(())
    }
}

async fn insert<S>(store: &S, table: TableName, rows: Vec<Record>) -> Result<()>
where
    S: SnapshotStore + ?Sized,
{
    if rows.is_empty() {
        return Ok(());
    }
    let count = rows.len();
    store
        .insert_many(&table, rows)
        .await
        .map_err(|cause| Error::InsertFailed {
            table: table.clone(),
            cause,
        })?;
    tracing::debug!(%table, rows = count, "inserted");
    Ok(())
}
