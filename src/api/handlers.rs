use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, CatalogClient, SkuMatch};
use crate::contracts::{
    CatalogError, Environment, Packaging, ReceivingRecord, RecordStore, SequenceError,
    SequenceState, SequenceStore, StoreError, Unit,
};
use crate::label::render_label;
use crate::storage::SequenceAllocator;

/// Server metrics for monitoring.
#[derive(Default)]
pub struct Metrics {
    pub submissions_total: AtomicU64,
    pub allocation_failures_total: AtomicU64,
    pub errors_total: AtomicU64,
    pub catalog_searches_total: AtomicU64,
    pub submit_latency_sum_us: AtomicU64,
    pub start_time: std::sync::OnceLock<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        let m = Self::default();
        let _ = m.start_time.set(Instant::now());
        m
    }

    pub fn record_submission(&self, latency_us: u64) {
        self.submissions_total.fetch_add(1, Ordering::Relaxed);
        self.submit_latency_sum_us
            .fetch_add(latency_us, Ordering::Relaxed);
    }

    pub fn record_allocation_failure(&self) {
        self.allocation_failures_total.fetch_add(1, Ordering::Relaxed);
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_catalog_search(&self) {
        self.catalog_searches_total.fetch_add(1, Ordering::Relaxed);
    }
}

/// Application state shared across handlers.
pub struct AppState<S: SequenceStore, R: RecordStore> {
    pub allocator: SequenceAllocator<S>,
    pub records: Arc<R>,
    pub catalog: Arc<Catalog>,
    pub catalog_client: Option<CatalogClient>,
    pub metrics: Arc<Metrics>,
    /// Bearer token guarding the administrative reset. `None` disables the
    /// reset surface entirely.
    pub admin_token: Option<String>,
}

/// Request body for submitting a receiving entry.
///
/// Unknown fields are rejected; the identifiers and the entry date are
/// assigned server-side, never accepted from the client.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitRecordRequest {
    pub environment: Environment,
    pub sku: String,
    /// Optional; resolved from the catalog when omitted.
    #[serde(default)]
    pub description: Option<String>,
    pub lot: String,
    pub expiry: NaiveDate,
    pub quantity: f64,
    pub unit: Unit,
    pub package_count: u32,
    pub packaging: Packaging,
    pub supplier: String,
    pub delivery_note: String,
    pub received_by: String,
    pub checked_by: String,
}

/// Response for a successful submission.
#[derive(Debug, Serialize)]
pub struct SubmitRecordResponse {
    pub analysis_number: String,
    pub reception_number: String,
    pub record: ReceivingRecord,
    pub label_html: String,
}

/// Query parameters for the history listing.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_env")]
    pub env: Environment,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_env() -> Environment {
    Environment::Production
}

fn default_limit() -> usize {
    100
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub records: Vec<ReceivingRecord>,
    pub count: usize,
}

/// Query parameters for catalog search.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct LabelQuery {
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Sequence state as reported by the peek endpoint.
#[derive(Debug, Serialize)]
pub struct SequenceStateResponse {
    pub environment: Environment,
    pub last_number: u64,
    pub last_reception: u64,
    pub year: u16,
}

impl SequenceStateResponse {
    fn new(environment: Environment, state: SequenceState) -> Self {
        Self {
            environment,
            last_number: state.last_number,
            last_reception: state.last_reception,
            year: state.year,
        }
    }
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// API error type.
pub enum ApiError {
    Sequence(SequenceError),
    Store(StoreError),
    Catalog(CatalogError),
    BadRequest(String),
    NotFound(String),
    Unauthorized(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_response) = match self {
            // Allocation failures block submission; both variants are safe
            // for the operator to retry.
            ApiError::Sequence(SequenceError::Unavailable(msg)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse {
                    error: format!("Sequence unavailable: {}", msg),
                    code: "SEQUENCE_UNAVAILABLE".into(),
                },
            ),
            ApiError::Sequence(SequenceError::Conflict) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse {
                    error: "Sequence busy, try again".into(),
                    code: "SEQUENCE_CONFLICT".into(),
                },
            ),
            ApiError::Sequence(SequenceError::Corrupt(msg)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: format!("Sequence state corrupt, administrative reset required: {}", msg),
                    code: "SEQUENCE_CORRUPT".into(),
                },
            ),
            ApiError::Sequence(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: e.to_string(),
                    code: "SEQUENCE_ERROR".into(),
                },
            ),
            ApiError::Store(StoreError::NotFound(msg)) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: msg,
                    code: "RECORD_NOT_FOUND".into(),
                },
            ),
            ApiError::Store(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: e.to_string(),
                    code: "STORE_ERROR".into(),
                },
            ),
            ApiError::Catalog(CatalogError::NotConfigured) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: "No catalog source configured".into(),
                    code: "CATALOG_NOT_CONFIGURED".into(),
                },
            ),
            ApiError::Catalog(e) => (
                StatusCode::BAD_GATEWAY,
                ErrorResponse {
                    error: e.to_string(),
                    code: "CATALOG_UNAVAILABLE".into(),
                },
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: msg,
                    code: "BAD_REQUEST".into(),
                },
            ),
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: msg,
                    code: "NOT_FOUND".into(),
                },
            ),
            ApiError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse {
                    error: msg,
                    code: "UNAUTHORIZED".into(),
                },
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<SequenceError> for ApiError {
    fn from(e: SequenceError) -> Self {
        ApiError::Sequence(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        ApiError::Catalog(e)
    }
}

fn require_non_empty(value: &str, field: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!(
            "Field '{}' must not be empty",
            field
        )));
    }
    Ok(())
}

fn validate(req: &SubmitRecordRequest) -> Result<(), ApiError> {
    require_non_empty(&req.sku, "sku")?;
    require_non_empty(&req.lot, "lot")?;
    require_non_empty(&req.supplier, "supplier")?;
    require_non_empty(&req.delivery_note, "delivery_note")?;
    require_non_empty(&req.received_by, "received_by")?;
    require_non_empty(&req.checked_by, "checked_by")?;
    if req.quantity.is_nan() || req.quantity <= 0.0 {
        return Err(ApiError::BadRequest(
            "Field 'quantity' must be positive".into(),
        ));
    }
    if req.package_count == 0 {
        return Err(ApiError::BadRequest(
            "Field 'package_count' must be at least 1".into(),
        ));
    }
    Ok(())
}

fn parse_env(raw: &str) -> Result<Environment, ApiError> {
    raw.parse::<Environment>().map_err(ApiError::BadRequest)
}

/// GET /health
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /stats
pub async fn get_stats<S: SequenceStore, R: RecordStore>(
    State(state): State<Arc<AppState<S, R>>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let uptime_secs = state
        .metrics
        .start_time
        .get()
        .map(|t| t.elapsed().as_secs())
        .unwrap_or(0);
    let (sku_count, supplier_count) = state.catalog.counts()?;
    Ok(Json(serde_json::json!({
        "uptime_secs": uptime_secs,
        "submissions_total": state.metrics.submissions_total.load(Ordering::Relaxed),
        "allocation_failures_total": state.metrics.allocation_failures_total.load(Ordering::Relaxed),
        "errors_total": state.metrics.errors_total.load(Ordering::Relaxed),
        "catalog_searches_total": state.metrics.catalog_searches_total.load(Ordering::Relaxed),
        "submit_latency_sum_us": state.metrics.submit_latency_sum_us.load(Ordering::Relaxed),
        "catalog_skus": sku_count,
        "catalog_suppliers": supplier_count,
    })))
}

/// POST /records
///
/// Validates the entry, allocates the analysis number and then the reception
/// number (always in that order), and appends the record. A record is never
/// saved unless both allocations succeeded — the identifiers are embedded in
/// the record itself.
pub async fn submit_record<S: SequenceStore, R: RecordStore>(
    State(state): State<Arc<AppState<S, R>>>,
    Json(req): Json<SubmitRecordRequest>,
) -> Result<(StatusCode, Json<SubmitRecordResponse>), ApiError> {
    let start = Instant::now();
    validate(&req)?;
    let env = req.environment;

    let analysis_number = state.allocator.allocate_analysis_number(env).map_err(|e| {
        state.metrics.record_allocation_failure();
        tracing::error!(env = %env, error = %e, "Analysis number allocation failed");
        ApiError::from(e)
    })?;
    let reception_number = state.allocator.allocate_reception_number(env).map_err(|e| {
        state.metrics.record_allocation_failure();
        tracing::error!(env = %env, error = %e, "Reception number allocation failed");
        ApiError::from(e)
    })?;

    let description = match req.description {
        Some(d) if !d.trim().is_empty() => d,
        _ => state
            .catalog
            .sku_description(&req.sku)?
            .unwrap_or_default(),
    };

    let record = ReceivingRecord {
        environment: env,
        date: chrono::Local::now().date_naive(),
        sku: req.sku,
        description,
        analysis_number: analysis_number.clone(),
        lot: req.lot,
        expiry: req.expiry,
        quantity: req.quantity,
        unit: req.unit,
        package_count: req.package_count,
        packaging: req.packaging,
        supplier: req.supplier,
        delivery_note: req.delivery_note,
        reception_number: reception_number.clone(),
        received_by: req.received_by,
        checked_by: req.checked_by,
    };

    state.records.append(&record).map_err(|e| {
        state.metrics.record_error();
        tracing::error!(env = %env, error = %e, "Record append failed");
        ApiError::from(e)
    })?;

    let label_html = render_label(&record);
    state
        .metrics
        .record_submission(start.elapsed().as_micros() as u64);
    tracing::info!(
        env = %env,
        analysis_number = %analysis_number,
        reception_number = %reception_number,
        sku = %record.sku,
        "Receiving record saved"
    );

    Ok((
        StatusCode::CREATED,
        Json(SubmitRecordResponse {
            analysis_number,
            reception_number,
            record,
            label_html,
        }),
    ))
}

/// GET /records?env=&limit=
pub async fn get_history<S: SequenceStore, R: RecordStore>(
    State(state): State<Arc<AppState<S, R>>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let records = state.records.list(query.env, query.limit)?;
    let count = records.len();
    Ok(Json(HistoryResponse { records, count }))
}

/// GET /records/:reception/label?env=
pub async fn get_label<S: SequenceStore, R: RecordStore>(
    State(state): State<Arc<AppState<S, R>>>,
    Path(reception): Path<String>,
    Query(query): Query<LabelQuery>,
) -> Result<Html<String>, ApiError> {
    let record = state
        .records
        .find_by_reception(query.env, &reception)?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "No {} record with reception number {}",
                query.env, reception
            ))
        })?;
    Ok(Html(render_label(&record)))
}

/// GET /catalog/skus?q=
pub async fn search_skus<S: SequenceStore, R: RecordStore>(
    State(state): State<Arc<AppState<S, R>>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<SkuMatch>>, ApiError> {
    state.metrics.record_catalog_search();
    Ok(Json(state.catalog.search_skus(&query.q)?))
}

/// GET /catalog/suppliers?q=
pub async fn search_suppliers<S: SequenceStore, R: RecordStore>(
    State(state): State<Arc<AppState<S, R>>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
    state.metrics.record_catalog_search();
    Ok(Json(state.catalog.search_suppliers(&query.q)?))
}

/// POST /catalog/refresh
pub async fn refresh_catalog<S: SequenceStore, R: RecordStore>(
    State(state): State<Arc<AppState<S, R>>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let client = state
        .catalog_client
        .as_ref()
        .ok_or(ApiError::Catalog(CatalogError::NotConfigured))?;
    let (skus, suppliers) = client.refresh(&state.catalog).await.map_err(|e| {
        state.metrics.record_error();
        ApiError::from(e)
    })?;
    Ok(Json(serde_json::json!({
        "skus": skus,
        "suppliers": suppliers,
    })))
}

/// GET /sequences/:env
///
/// Read-only counter peek; feeds the form's next-reception-number preview
/// without consuming a value.
pub async fn get_sequences<S: SequenceStore, R: RecordStore>(
    State(state): State<Arc<AppState<S, R>>>,
    Path(env): Path<String>,
) -> Result<Json<SequenceStateResponse>, ApiError> {
    let env = parse_env(&env)?;
    let current = state.allocator.current(env)?;
    Ok(Json(SequenceStateResponse::new(env, current)))
}

/// POST /sequences/:env/reset
///
/// Administrative recovery action: zeroes both counters under the current
/// year. Requires the configured bearer admin token.
pub async fn reset_sequences<S: SequenceStore, R: RecordStore>(
    State(state): State<Arc<AppState<S, R>>>,
    Path(env): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SequenceStateResponse>, ApiError> {
    let expected = state
        .admin_token
        .as_deref()
        .ok_or_else(|| ApiError::Unauthorized("Administrative reset is not enabled".into()))?;
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".into()))?;
    if presented != expected {
        return Err(ApiError::Unauthorized("Invalid admin token".into()));
    }

    let env = parse_env(&env)?;
    let state_after = state.allocator.reset(env)?;
    tracing::warn!(env = %env, "Administrative sequence reset performed");
    Ok(Json(SequenceStateResponse::new(env, state_after)))
}
