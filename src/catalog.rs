//! SKU and supplier catalog: in-memory search for the form's autocomplete
//! plus a remote refresh client.

use std::sync::RwLock;

use backon::Retryable;
use serde::{Deserialize, Serialize};

use crate::contracts::{CatalogError, LockResultExt, StoreError};
use crate::storage::{is_retryable_fetch_error, RetryConfig};

/// Autocomplete result caps, matching the form's dropdown size.
const MAX_SKU_MATCHES: usize = 30;

/// One raw-material SKU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuEntry {
    pub code: String,
    pub name: String,
}

/// One supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    pub name: String,
}

/// A SKU search hit: the code to submit plus the label to display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuMatch {
    pub code: String,
    pub label: String,
}

/// In-memory catalog the autocomplete searches against.
///
/// Read-only with respect to the allocator and record store; refreshed
/// wholesale from the remote source.
#[derive(Default)]
pub struct Catalog {
    skus: RwLock<Vec<SkuEntry>>,
    suppliers: RwLock<Vec<Supplier>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_skus(&self, skus: Vec<SkuEntry>) -> Result<(), StoreError> {
        *self.skus.write().map_lock_err()? = skus;
        Ok(())
    }

    pub fn replace_suppliers(&self, suppliers: Vec<Supplier>) -> Result<(), StoreError> {
        *self.suppliers.write().map_lock_err()? = suppliers;
        Ok(())
    }

    /// Case-insensitive substring search over SKU code and name.
    /// An empty query matches nothing; results are capped.
    pub fn search_skus(&self, query: &str) -> Result<Vec<SkuMatch>, StoreError> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let skus = self.skus.read().map_lock_err()?;
        Ok(skus
            .iter()
            .filter(|s| {
                s.code.to_lowercase().contains(&query) || s.name.to_lowercase().contains(&query)
            })
            .take(MAX_SKU_MATCHES)
            .map(|s| SkuMatch {
                code: s.code.clone(),
                label: format!("{} - {}", s.code, s.name),
            })
            .collect())
    }

    /// Looks up the display name for an exact SKU code.
    pub fn sku_description(&self, code: &str) -> Result<Option<String>, StoreError> {
        let skus = self.skus.read().map_lock_err()?;
        Ok(skus.iter().find(|s| s.code == code).map(|s| s.name.clone()))
    }

    /// Case-insensitive substring search over supplier names, deduplicated.
    pub fn search_suppliers(&self, query: &str) -> Result<Vec<String>, StoreError> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let suppliers = self.suppliers.read().map_lock_err()?;
        let mut seen = std::collections::HashSet::new();
        Ok(suppliers
            .iter()
            .filter(|s| s.name.to_lowercase().contains(&query))
            .filter(|s| seen.insert(s.name.clone()))
            .map(|s| s.name.clone())
            .collect())
    }

    /// (sku count, supplier count), for /stats and refresh logging.
    pub fn counts(&self) -> Result<(usize, usize), StoreError> {
        Ok((
            self.skus.read().map_lock_err()?.len(),
            self.suppliers.read().map_lock_err()?.len(),
        ))
    }
}

/// Configuration for the remote catalog source.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Base URL serving `/skus` and `/suppliers` as JSON arrays.
    pub base_url: String,
    /// Optional authentication token.
    pub auth_token: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Retry policy for fetches.
    pub retry: RetryConfig,
}

impl CatalogConfig {
    /// Creates a config from environment variables; `None` when no catalog
    /// source is configured (`RECIBO_CATALOG_URL` unset).
    ///
    /// Reads:
    /// - `RECIBO_CATALOG_URL`: base URL of the catalog source
    /// - `RECIBO_CATALOG_TOKEN`: optional bearer token
    /// - `RECIBO_CATALOG_TIMEOUT_SECS`: request timeout (default: 30)
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("RECIBO_CATALOG_URL").ok()?;
        Some(Self {
            base_url,
            auth_token: std::env::var("RECIBO_CATALOG_TOKEN").ok(),
            timeout_secs: std::env::var("RECIBO_CATALOG_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            retry: RetryConfig::from_env(),
        })
    }
}

/// HTTP client for the remote catalog source.
pub struct CatalogClient {
    config: CatalogConfig,
    client: reqwest::Client,
}

impl CatalogClient {
    pub fn new(config: CatalogConfig) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CatalogError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn endpoint_url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn add_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref token) = self.config.auth_token {
            request.header("Authorization", format!("Bearer {}", token))
        } else {
            request
        }
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, CatalogError> {
        let url = self.endpoint_url(path);
        let response = (|| async {
            self.add_auth(self.client.get(&url))
                .send()
                .await?
                .error_for_status()
        })
        .retry(self.config.retry.backoff())
        .when(|e: &reqwest::Error| is_retryable_fetch_error(&e.to_string()))
        .notify(|err, dur| {
            tracing::warn!(url = %url, error = %err, retry_in = ?dur, "Catalog fetch failed, retrying");
        })
        .await
        .map_err(|e| CatalogError::Http(e.to_string()))?;

        response
            .json::<T>()
            .await
            .map_err(|e| CatalogError::Decode(e.to_string()))
    }

    pub async fn fetch_skus(&self) -> Result<Vec<SkuEntry>, CatalogError> {
        self.fetch_json("/skus").await
    }

    pub async fn fetch_suppliers(&self) -> Result<Vec<Supplier>, CatalogError> {
        self.fetch_json("/suppliers").await
    }

    /// Fetches both lists and swaps them into the catalog.
    /// Returns (sku count, supplier count).
    pub async fn refresh(&self, catalog: &Catalog) -> Result<(usize, usize), CatalogError> {
        let skus = self.fetch_skus().await?;
        let suppliers = self.fetch_suppliers().await?;
        catalog
            .replace_skus(skus)
            .map_err(|e| CatalogError::Http(e.to_string()))?;
        catalog
            .replace_suppliers(suppliers)
            .map_err(|e| CatalogError::Http(e.to_string()))?;
        let counts = catalog
            .counts()
            .map_err(|e| CatalogError::Http(e.to_string()))?;
        tracing::info!(skus = counts.0, suppliers = counts.1, "Catalog refreshed");
        Ok(counts)
    }
}
