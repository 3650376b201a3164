use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use recibo::api::{start_server, AppState, Metrics, ServerConfig};
use recibo::catalog::{Catalog, CatalogClient, CatalogConfig};
use recibo::storage::{FileRecordStore, FileSequenceStore, SequenceAllocator};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("recibo=info".parse()?))
        .init();

    tracing::info!("Recibo starting...");

    let data_dir = std::env::var("RECIBO_DATA_DIR").unwrap_or_else(|_| "./data".into());
    std::fs::create_dir_all(&data_dir)?;

    let sequence_store = Arc::new(FileSequenceStore::open(&data_dir)?);
    let records = Arc::new(FileRecordStore::open(&data_dir)?);
    tracing::info!("Opened data directory at {}", data_dir);

    let catalog = Arc::new(Catalog::new());
    let catalog_client = match CatalogConfig::from_env() {
        Some(config) => {
            tracing::info!(base_url = %config.base_url, "Catalog source configured");
            let client = CatalogClient::new(config)?;
            // Best-effort initial sync; the form can refresh later.
            if let Err(e) = client.refresh(&catalog).await {
                tracing::warn!(error = %e, "Initial catalog refresh failed, starting empty");
            }
            Some(client)
        }
        None => {
            tracing::info!("No catalog source configured, autocomplete starts empty");
            None
        }
    };

    let admin_token = std::env::var("RECIBO_ADMIN_TOKEN").ok();
    if admin_token.is_none() {
        tracing::info!("RECIBO_ADMIN_TOKEN not set, administrative reset disabled");
    }

    let state = Arc::new(AppState {
        allocator: SequenceAllocator::new(sequence_store),
        records,
        catalog,
        catalog_client,
        metrics: Arc::new(Metrics::new()),
        admin_token,
    });

    let config = ServerConfig::from_env();
    start_server(config, state, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown signal received");
    })
    .await?;

    Ok(())
}
