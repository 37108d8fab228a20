mod api;
mod state;

use anyhow::Result;
use axum::{
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use clap::Parser;
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tablemap_core::{Catalog, SqliteRowStore};
use tablemap_sync::{DestinationStore, Materializer, PostgresDestination, SyncConfig};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use state::AppState;

#[derive(Parser, Debug)]
#[clap(author, version, about = "tablemap HTTP service")]
struct Args {
    /// Config file path, shared with the synchronization service
    #[clap(short, long, env = "TABLEMAP_CONFIG")]
    config: Option<String>,

    /// Catalog snapshot file
    #[clap(long, env = "TABLEMAP_CATALOG")]
    catalog: Option<PathBuf>,

    /// SQLite row store file
    #[clap(long, env = "TABLEMAP_ROWS")]
    rows: Option<PathBuf>,

    /// TCP port to listen on
    #[clap(short, long, env = "API_PORT", default_value_t = 8080)]
    port: u16,
}

/// The service router: health endpoints plus the API under `/api`
fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
        .nest("/api", api::create_router(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting tablemap API");

    let args = Args::parse();
    let mut config = SyncConfig::load(args.config.as_deref())?;
    if let Some(catalog) = args.catalog {
        config.catalog_path = catalog;
    }
    if let Some(rows) = args.rows {
        config.row_store_path = rows;
    }

    let mut catalog = Catalog::load(&config.catalog_path, config.core.clone())?;
    let store = Arc::new(SqliteRowStore::open(&config.row_store_path)?);

    let destination: Option<Arc<dyn DestinationStore>> = match &config.destination {
        Some(settings) => Some(Arc::new(PostgresDestination::new(settings)?)),
        None => {
            tracing::warn!("No destination configured, virtual tables are not materialized");
            None
        }
    };
    if let Some(destination) = &destination {
        let (materializer, _) = Materializer::spawn(destination.clone(), config.destination_timeout());
        catalog.subscribe(Arc::new(materializer));
    }

    let mut state = AppState::new(catalog, store);
    state.destination = destination;
    state.catalog_path = Some(config.catalog_path.clone());
    state.destination_timeout = config.destination_timeout();

    // Run the API server
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(Arc::new(state))).await?;
    Ok(())
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

async fn status() -> impl IntoResponse {
    Json(json!({
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "tablemap-api",
        "core_version": tablemap_core::VERSION,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tablemap_core::{CoreConfig, MemoryRowStore};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_and_status() {
        let state = Arc::new(AppState::new(Catalog::new(CoreConfig::default()), Arc::new(MemoryRowStore::new())));
        let app = app(state);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
        assert_eq!(body["service"], "tablemap-api");
    }

    #[tokio::test]
    async fn test_changes_are_saved_to_the_catalog_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let mut state = AppState::new(Catalog::new(CoreConfig::default()), Arc::new(MemoryRowStore::new()));
        state.catalog_path = Some(path.clone());
        let app = app(Arc::new(state));

        let body = json!({
            "description": "erp",
            "host": "10.0.0.5",
            "database_name": "shop",
            "database_username": "reader",
            "info_to_sync_selected": [{"table": "clients", "fields": ["id"]}]
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/connections")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let reloaded = Catalog::load(&path, CoreConfig::default()).unwrap();
        assert_eq!(reloaded.connections().len(), 1);
        assert_eq!(reloaded.tables()[0].table, "shop_clients");
    }
}
