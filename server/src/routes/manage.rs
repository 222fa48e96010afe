//! Dataset management routes: export and import.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    routing::{get, post},
    Json, Router,
};
use pantry_transfer::{ExportOptions, ImportOptions, ImportReport, Snapshot};

use crate::auth::ExportCapability;
use crate::error::Result;
use crate::handlers::{handle_export, handle_import};
use crate::AppState;

/// Create management routes. Import bodies above `max_import_bytes` are refused.
pub fn routes(max_import_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/export", get(export_handler))
        .route("/export-plain", get(export_plain_handler))
        .route(
            "/import",
            post(import_handler).layer(DefaultBodyLimit::max(max_import_bytes)),
        )
}

/// GET /api/manage/export - Full snapshot, images included.
async fn export_handler(
    State(state): State<AppState>,
    _capability: ExportCapability,
) -> Result<Json<Snapshot>> {
    let snapshot = handle_export(&state.pool, &state.registry, ExportOptions::full()).await?;
    Ok(Json(snapshot))
}

/// GET /api/manage/export-plain - Snapshot without image columns.
async fn export_plain_handler(
    State(state): State<AppState>,
    _capability: ExportCapability,
) -> Result<Json<Snapshot>> {
    let snapshot = handle_export(&state.pool, &state.registry, ExportOptions::plain()).await?;
    Ok(Json(snapshot))
}

/// POST /api/manage/import - Replace the dataset with the uploaded snapshot.
async fn import_handler(
    State(state): State<AppState>,
    capability: ExportCapability,
    body: Bytes,
) -> Result<Json<ImportReport>> {
    tracing::info!(
        "Import of {} bytes requested (token: {})",
        body.len(),
        capability.authenticated
    );
    let options = ImportOptions {
        patch_concurrency: state.config.patch_concurrency,
    };
    let report = handle_import(&state.pool, &state.registry, &body, options).await?;
    Ok(Json(report))
}
