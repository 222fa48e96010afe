//! HTTP route definitions.

mod health;
mod manage;

use crate::AppState;
use axum::Router;

/// Create all application routes.
pub fn create_routes(max_import_bytes: usize) -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .nest("/api/manage", manage::routes(max_import_bytes))
}
