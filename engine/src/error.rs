//! Error types for the transfer engine.
//!
//! Every failure carries enough context (kind, table, row, cause) for a
//! caller to tell which table or row broke a transfer without looking at
//! engine internals.

use crate::{RecordId, TableName};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a [`SnapshotStore`](crate::SnapshotStore) implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct StoreError {
    message: String,
}

impl StoreError {
    /// Create a store error from any displayable cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The underlying store message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// All possible errors from an export or import.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Validation errors, raised before any destination mutation
    #[error("malformed body: {0}")]
    MalformedBody(String),

    #[error("invalid version: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: String },

    #[error("invalid app: expected {expected}, got {actual}")]
    AppMismatch { expected: String, actual: String },

    #[error("missing or invalid table: {0}")]
    MissingTable(TableName),

    // Export errors
    #[error("export failed on table {table}: {cause}")]
    SourceReadFailed { table: TableName, cause: StoreError },

    // Import errors, raised after the purge may have run
    #[error("purge failed: {cause}")]
    PurgeFailed { cause: StoreError },

    #[error("import failed on table {table}: {cause}")]
    InsertFailed { table: TableName, cause: StoreError },

    #[error("import failed patching {table} {record_id}: {cause}")]
    PatchFailed {
        table: TableName,
        record_id: RecordId,
        cause: StoreError,
    },

    // Configuration errors
    #[error("invalid registry: {0}")]
    InvalidRegistry(String),
}

/// Discriminant of [`Error`], stable across the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    MalformedBody,
    VersionMismatch,
    AppMismatch,
    MissingTable,
    SourceReadFailed,
    PurgeFailed,
    InsertFailed,
    PatchFailed,
    InvalidRegistry,
}

impl ErrorKind {
    /// Whether this kind is raised strictly before the destination store is touched.
    pub fn is_validation(self) -> bool {
        matches!(
            self,
            ErrorKind::MalformedBody
                | ErrorKind::VersionMismatch
                | ErrorKind::AppMismatch
                | ErrorKind::MissingTable
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::MalformedBody => "MalformedBody",
            ErrorKind::VersionMismatch => "VersionMismatch",
            ErrorKind::AppMismatch => "AppMismatch",
            ErrorKind::MissingTable => "MissingTable",
            ErrorKind::SourceReadFailed => "SourceReadFailed",
            ErrorKind::PurgeFailed => "PurgeFailed",
            ErrorKind::InsertFailed => "InsertFailed",
            ErrorKind::PatchFailed => "PatchFailed",
            ErrorKind::InvalidRegistry => "InvalidRegistry",
        };
        f.write_str(name)
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedBody(_) => ErrorKind::MalformedBody,
            Error::VersionMismatch { .. } => ErrorKind::VersionMismatch,
            Error::AppMismatch { .. } => ErrorKind::AppMismatch,
            Error::MissingTable(_) => ErrorKind::MissingTable,
            Error::SourceReadFailed { .. } => ErrorKind::SourceReadFailed,
            Error::PurgeFailed { .. } => ErrorKind::PurgeFailed,
            Error::InsertFailed { .. } => ErrorKind::InsertFailed,
            Error::PatchFailed { .. } => ErrorKind::PatchFailed,
            Error::InvalidRegistry(_) => ErrorKind::InvalidRegistry,
        }
    }

    /// The table the failure is attributed to, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            Error::MissingTable(table)
            | Error::SourceReadFailed { table, .. }
            | Error::InsertFailed { table, .. }
            | Error::PatchFailed { table, .. } => Some(table),
            _ => None,
        }
    }

    /// The row the failure is attributed to, if any.
    pub fn record_id(&self) -> Option<&RecordId> {
        match self {
            Error::PatchFailed { record_id, .. } => Some(record_id),
            _ => None,
        }
    }

    /// The store failure behind this error, if the store produced one.
    pub fn cause(&self) -> Option<&StoreError> {
        match self {
            Error::SourceReadFailed { cause, .. }
            | Error::PurgeFailed { cause }
            | Error::InsertFailed { cause, .. }
            | Error::PatchFailed { cause, .. } => Some(cause),
            _ => None,
        }
    }

    /// Structured, serializable form of this error.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            table: self.table().map(str::to_owned),
            record_id: self.record_id().cloned(),
            cause: self.cause().map(|c| c.message().to_owned()),
            message: self.to_string(),
        }
    }
}

/// Serializable view of an [`Error`] for transports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<TableName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<RecordId>,
    /// Store message behind the failure, without the transfer context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    pub message: String,
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
