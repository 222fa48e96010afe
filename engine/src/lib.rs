//! # Pantry Transfer
//!
//! Snapshot export and import of the Pantry business dataset.
//!
//! An export reads every registered table into a versioned, self-describing
//! [`Snapshot`] document. An import validates such a document, purges the
//! destination store, and writes the tables back in dependency order.
//!
//! ## Design Principles
//!
//! - **No IO of its own**: all reads and writes go through a [`SnapshotStore`]
//! - **Validate first**: a rejected document never touches the destination
//! - **Schema-agnostic rows**: records are opaque column maps; only the `id`,
//!   deferred and binary columns declared in the [`Registry`] are inspected
//!
//! ## Circular references
//!
//! `ingredient.produced_by_recipe_id` references `recipe`, while recipes
//! reference ingredients through their components. The registry declares that
//! column as *deferred*: ingredients are written with it set to null, recipes
//! are written next, and the column is patched back afterwards.
//!
//! ## Quick Start
//!
//! ```rust
//! use pantry_transfer::{
//!     export, import, ExportOptions, ImportOptions, MemoryStore, Record, Registry,
//!     TableSpec,
//! };
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let registry = Registry::builder()
//!     .table(TableSpec::independent("unit"))
//!     .table(TableSpec::deferring("ingredient").defer("produced_by_recipe_id", "recipe"))
//!     .table(TableSpec::referenced("recipe"))
//!     .table(TableSpec::dependent("recipe_component"))
//!     .build()
//!     .unwrap();
//!
//! let source = MemoryStore::with_tables([
//!     ("ingredient", vec![Record::new().with("id", "I1").with("produced_by_recipe_id", "R1")]),
//!     ("recipe", vec![Record::new().with("id", "R1")]),
//! ]);
//!
//! let snapshot = export(&source, &registry, ExportOptions::full()).await.unwrap();
//! let body = serde_json::to_value(&snapshot).unwrap();
//!
//! let destination = MemoryStore::new();
//! let report = import(&destination, &registry, &body, ImportOptions::default())
//!     .await
//!     .unwrap();
//!
//! assert_eq!(report.patched, 1);
//! assert_eq!(destination.rows("ingredient"), source.rows("ingredient"));
//! # });
//! ```

pub mod error;
pub mod export;
pub mod import;
pub mod record;
pub mod schema;
pub mod snapshot;
pub mod store;

// Re-export main types at crate root
pub use error::{Error, ErrorKind, ErrorReport, StoreError};
pub use export::{export, ExportOptions};
pub use import::{import, import_snapshot, ImportOptions, ImportReport, DEFAULT_PATCH_CONCURRENCY};
pub use record::{Record, RecordId};
pub use schema::{Deferred, DeferredField, Pass, Patch, Registry, RegistryBuilder, TableSpec};
pub use snapshot::{Snapshot, SnapshotSummary, SNAPSHOT_APP, SNAPSHOT_VERSION};
pub use store::{MemoryStore, SnapshotStore, StoreResult};

/// Type alias for clarity
pub type TableName = String;
