//! Pantry Server - snapshot export and import over HTTP.
//!
//! Exposes the pantry-transfer engine on top of the PostgreSQL business
//! tables. Every transfer runs in its own database transaction.

mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod routes;

use crate::config::Config;
use crate::db::Pool;
use axum::Router;
use pantry_transfer::Registry;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub config: Arc<Config>,
    pub registry: Arc<Registry>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "pantry_server=debug,pantry_transfer=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Pantry Server on {}:{}", config.host, config.port);
    if config.export_token.is_none() {
        tracing::warn!("EXPORT_TOKEN is not set, export and import are open to anyone");
    }

    let pool = db::connect(&config.database_url).await?;

    tracing::info!("Running database migrations...");
    db::migrate(&pool).await?;

    let registry = Registry::inventory();
    tracing::info!("Registered {} tables for transfer", registry.len());

    let max_import_bytes = config.max_import_bytes;
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        registry: Arc::new(registry),
    };

    let app = Router::new()
        .merge(routes::create_routes(max_import_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
