use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use medsearch_core::document::parse_date;
use medsearch_core::snippet::highlight;
use medsearch_core::{
    Document, DocumentSummary, EngineConfig, FilterPredicate, IndexStats, IngestOutcome, IngestRequest, SearchEngine,
    SearchHit, SearchRequest,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use time::Date;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod error;

pub use error::ApiError;

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub k: Option<i64>,
    pub subject_id: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    #[serde(default)]
    pub highlight: bool,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Deserialize)]
pub struct CreateDocument {
    pub title: String,
    #[serde(default)]
    pub text: String,
    pub subject_id: Option<String>,
    pub date: Option<String>,
}

#[derive(Serialize)]
pub struct Created {
    pub doc_id: String,
}

#[derive(Deserialize)]
pub struct UploadParams {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub name: String,
    pub subject_id: Option<String>,
    pub date: Option<String>,
}

#[derive(Deserialize)]
pub struct RebuildParams {
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub search_timeout: Duration,
}

impl AppState {
    pub fn new(engine: Arc<SearchEngine>) -> Self {
        let search_timeout = std::env::var("SEARCH_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(10));
        Self { engine, search_timeout }
    }
}

pub fn build_app(config: EngineConfig) -> anyhow::Result<Router> {
    let engine = SearchEngine::open(config)?;
    if let Some(event) = engine.recovery() {
        tracing::warn!(reason = %event.reason, "serving a freshly recreated index");
    }
    Ok(router(AppState::new(Arc::new(engine))))
}

pub fn router(app_state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/documents", get(list_handler).post(create_handler))
        .route("/documents/upload", post(upload_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/doc/:doc_id/raw", get(raw_handler))
        .route("/stats", get(stats_handler))
        .route("/index/rebuild", post(rebuild_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Empty form fields mean "not set".
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn optional_date(value: Option<String>) -> Result<Option<Date>, ApiError> {
    Ok(non_empty(value).as_deref().map(parse_date).transpose()?)
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let limit = match params.k {
        None => state.engine.config().default_limit,
        Some(k) if k > 0 => k as usize,
        Some(k) => return Err(ApiError::BadRequest(format!("k must be a positive integer, got {k}"))),
    };
    let request = SearchRequest {
        query: params.q.clone(),
        limit,
        filter: FilterPredicate {
            subject_id: non_empty(params.subject_id),
            date_from: optional_date(params.date_from)?,
            date_to: optional_date(params.date_to)?,
        },
    };

    // On timeout the blocking task is abandoned; it only reads a committed snapshot.
    let engine = Arc::clone(&state.engine);
    let task = tokio::task::spawn_blocking(move || engine.search(&request));
    let mut results = match tokio::time::timeout(state.search_timeout, task).await {
        Ok(joined) => joined??,
        Err(_) => {
            tracing::warn!(query = %params.q, "search timed out");
            return Err(ApiError::Timeout);
        }
    };

    if params.highlight {
        let terms = state.engine.parse_query(&params.q)?.raw_terms;
        for hit in results.iter_mut() {
            hit.content_snippet = highlight(&hit.content_snippet, &terms);
        }
    }

    let elapsed = start.elapsed();
    Ok(Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits: results.len(), results }))
}

pub async fn list_handler(State(state): State<AppState>) -> Json<Vec<DocumentSummary>> {
    Json(state.engine.list_documents())
}

pub async fn create_handler(State(state): State<AppState>, Json(body): Json<CreateDocument>) -> Result<(StatusCode, Json<Created>), ApiError> {
    let date = optional_date(body.date)?;
    let engine = Arc::clone(&state.engine);
    let doc_id = tokio::task::spawn_blocking(move || {
        engine.index_document(&body.text, &body.title, non_empty(body.subject_id).as_deref(), date)
    })
    .await??;
    tracing::info!(%doc_id, "indexed document");
    Ok((StatusCode::CREATED, Json(Created { doc_id })))
}

pub async fn upload_handler(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestOutcome>), ApiError> {
    let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).map(str::to_string);
    let request = IngestRequest {
        name: params.name,
        bytes: body.to_vec(),
        content_type,
        title: params.title,
        subject_id: non_empty(params.subject_id),
        date: optional_date(params.date)?,
    };
    let engine = Arc::clone(&state.engine);
    let outcome = tokio::task::spawn_blocking(move || engine.ingest(request)).await??;
    tracing::info!(doc_id = %outcome.doc_id, warnings = outcome.warnings.len(), "ingested upload");
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<String>) -> Result<Json<Document>, ApiError> {
    Ok(Json(state.engine.get_document(&doc_id)?))
}

pub async fn raw_handler(State(state): State<AppState>, Path(doc_id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let engine = Arc::clone(&state.engine);
    let id = doc_id.clone();
    let bytes = tokio::task::spawn_blocking(move || engine.retrieve_original(&id)).await??;
    let disposition = format!("attachment; filename=\"{}\"", doc_id.replace('"', "_"));
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream".to_string()), (header::CONTENT_DISPOSITION, disposition)],
        bytes,
    ))
}

pub async fn stats_handler(State(state): State<AppState>) -> Json<IndexStats> {
    Json(state.engine.stats())
}

pub async fn rebuild_handler(State(state): State<AppState>, Query(params): Query<RebuildParams>) -> Result<StatusCode, ApiError> {
    if !params.confirm {
        return Err(ApiError::BadRequest("rebuild is destructive; pass confirm=true".into()));
    }
    let engine = Arc::clone(&state.engine);
    tokio::task::spawn_blocking(move || engine.rebuild_index()).await??;
    tracing::info!("index rebuilt");
    Ok(StatusCode::NO_CONTENT)
}
