mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::contracts::{RecordStore, SequenceStore};

pub use handlers::{
    AppState, ErrorResponse, HistoryResponse, Metrics, SequenceStateResponse,
    SubmitRecordRequest, SubmitRecordResponse,
};

/// Creates the API router.
pub fn create_router<S: SequenceStore + 'static, R: RecordStore + 'static>(
    state: Arc<AppState<S, R>>,
) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::get_stats::<S, R>))
        .route("/records", post(handlers::submit_record::<S, R>))
        .route("/records", get(handlers::get_history::<S, R>))
        .route(
            "/records/:reception/label",
            get(handlers::get_label::<S, R>),
        )
        .route("/catalog/skus", get(handlers::search_skus::<S, R>))
        .route(
            "/catalog/suppliers",
            get(handlers::search_suppliers::<S, R>),
        )
        .route("/catalog/refresh", post(handlers::refresh_catalog::<S, R>))
        .route("/sequences/:env", get(handlers::get_sequences::<S, R>))
        .route(
            "/sequences/:env/reset",
            post(handlers::reset_sequences::<S, R>),
        )
        .with_state(state)
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// Creates a config from `RECIBO_HOST` / `RECIBO_PORT`.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            host: std::env::var("RECIBO_HOST").unwrap_or(default.host),
            port: std::env::var("RECIBO_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(default.port),
        }
    }
}

/// Starts the HTTP server.
pub async fn start_server<S, R, F>(
    config: ServerConfig,
    state: Arc<AppState<S, R>>,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    S: SequenceStore + 'static,
    R: RecordStore + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
