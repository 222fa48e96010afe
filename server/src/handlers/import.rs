//! Import handler - replaces the dataset with an uploaded snapshot.

use crate::db::{PgSnapshotStore, Pool};
use crate::error::Result;
use pantry_transfer::{import_snapshot, Error, ImportOptions, ImportReport, Registry, Snapshot};
use serde_json::Value;

/// Parse an upload into a JSON document.
///
/// Anything that is not JSON is reported as a malformed body rather than a
/// generic extractor rejection, so clients get the same error shape for
/// every invalid upload.
pub fn parse_body(body: &[u8]) -> std::result::Result<Value, Error> {
    serde_json::from_slice(body).map_err(|e| Error::MalformedBody(e.to_string()))
}

/// Import a snapshot inside one transaction.
///
/// The document is validated before a connection is taken. The transaction
/// commits only when every pass and patch succeeded; otherwise it is rolled
/// back and the previous dataset stays untouched.
pub async fn handle_import(
    pool: &Pool,
    registry: &Registry,
    body: &[u8],
    options: ImportOptions,
) -> Result<ImportReport> {
    let document = parse_body(body)?;
    let snapshot = Snapshot::decode(registry, &document).inspect_err(|e| {
        tracing::warn!("Rejected import: {}", e);
    })?;

    let store = PgSnapshotStore::begin(pool, registry).await?;
    match import_snapshot(&store, registry, snapshot, options).await {
        Ok(report) => {
            store.commit().await?;
            tracing::info!(
                "Imported {} rows across {} tables",
                report.total(),
                report.imported.len()
            );
            Ok(report)
        }
        Err(e) => {
            if let Err(rollback) = store.rollback().await {
                tracing::error!("Failed to roll back import: {}", rollback);
            }
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pantry_transfer::ErrorKind;

    #[test]
    fn parses_json_bodies() {
        let value = parse_body(br#"{"version": 1}"#).unwrap();
        assert_eq!(value["version"], 1);
    }

    #[test]
    fn non_json_is_malformed() {
        let err = parse_body(b"not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedBody);

        let err = parse_body(b"").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedBody);
    }
}
