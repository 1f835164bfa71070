//! Aidvise HTTP API
//!
//! Axum-based HTTP server exposing the symptom-analysis proxy and the
//! health-log journal.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to an
//! inner function returning `(StatusCode, body)`. The inner functions are
//! directly testable without axum dispatch machinery.
//!
//! Endpoints:
//! - POST   /symptom-analysis : validate, ask the model, log, answer
//! - GET    /health-logs      : caller's logs, newest first
//! - POST   /health-logs      : create a log
//! - PUT    /health-logs/:id  : edit a log
//! - DELETE /health-logs/:id  : delete a log
//! - GET    /health           : health check
//! - GET    /version          : server version info

use std::sync::Arc;

use aidvise_core::config::StoreBackend;
use aidvise_core::models::HealthLogInput;
use aidvise_core::{
    create_store, AidviseConfig, AidviseError, AnalysisError, HealthLogJournal, JournalError,
    OpenAiChatClient, Secret, StoreError, SymptomAnalyzer,
};
use anyhow::Result;
use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, PathRejection};
use axum::extract::{Path, Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    AUTHORIZATION,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::Instrument;
use uuid::Uuid;

/// Body of every 500 response. Upstream detail stays in the server log.
pub const GENERIC_ERROR: &str = "Unexpected error occurred.";
pub const INVALID_SYMPTOMS: &str = "Invalid symptoms";

/// Shared state for all HTTP handlers
pub struct HttpState {
    pub analyzer: SymptomAnalyzer,
    pub journal: Option<HealthLogJournal>,
    pub pool: Option<PgPool>,
}

impl HttpState {
    /// Build clients and stores from configuration. Secrets are consumed
    /// here once and live only inside the clients.
    pub async fn from_config(config: &AidviseConfig) -> Result<Self, AidviseError> {
        let pool = match config.store.backend {
            StoreBackend::Postgres => {
                let db = config
                    .store
                    .database
                    .as_ref()
                    .ok_or(StoreError::MissingCredential("store.database.url"))?;
                let pool = aidvise_core::db::create_pool(db).await?;
                aidvise_core::db::ensure_symptom_log_table(&pool, &config.store.symptom_table)
                    .await?;
                Some(pool)
            }
            StoreBackend::Postgrest => None,
        };

        let inference = Arc::new(OpenAiChatClient::from_config(&config.inference)?);
        let store = create_store(&config.store, pool.clone())?;
        let journal = HealthLogJournal::from_config(&config.store)?;

        if journal.is_none() {
            tracing::warn!("SUPABASE_ANON_KEY not set; /health-logs will answer 503");
        }

        Ok(Self {
            analyzer: SymptomAnalyzer::new(inference, store, config.symptoms.min_length),
            journal,
            pool,
        })
    }
}

// ============================================================================
// CORS
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct CorsPolicy {
    pub allow_methods: &'static str,
}

pub const ANALYSIS_CORS: CorsPolicy = CorsPolicy {
    allow_methods: "POST, OPTIONS",
};

pub const JOURNAL_CORS: CorsPolicy = CorsPolicy {
    allow_methods: "GET, POST, PUT, DELETE, OPTIONS",
};

pub const CORS_ALLOW_HEADERS: &str = "Content-Type, Authorization";

fn apply_cors_headers(headers: &mut HeaderMap, policy: CorsPolicy) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(policy.allow_methods),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
}

/// Answers `OPTIONS` with a bodiless 204 before the request reaches any
/// extractor, and stamps the CORS headers on every other response.
pub async fn cors(State(policy): State<CorsPolicy>, req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        let mut resp = StatusCode::NO_CONTENT.into_response();
        apply_cors_headers(resp.headers_mut(), policy);
        return resp;
    }

    let mut resp = next.run(req).await;
    apply_cors_headers(resp.headers_mut(), policy);
    resp
}

// ============================================================================
// Router / server
// ============================================================================

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    let analysis = Router::new()
        .route(
            "/symptom-analysis",
            post(analyze_handler).fallback(method_not_allowed_handler),
        )
        .layer(middleware::from_fn_with_state(ANALYSIS_CORS, cors));

    let journal = Router::new()
        .route(
            "/health-logs",
            get(list_logs_handler)
                .post(create_log_handler)
                .fallback(method_not_allowed_handler),
        )
        .route(
            "/health-logs/:id",
            put(update_log_handler)
                .delete(delete_log_handler)
                .fallback(method_not_allowed_handler),
        )
        .layer(middleware::from_fn_with_state(JOURNAL_CORS, cors));

    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .merge(analysis)
        .merge(journal)
        .fallback(not_found_handler)
        .with_state(state)
}

/// Start the HTTP server on `addr`.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: HttpState,
    addr: String,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let app = build_router(Arc::new(state));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Aidvise HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SymptomRequest {
    pub symptoms: Option<String>,
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

fn server_error() -> (StatusCode, Value) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "error": GENERIC_ERROR }),
    )
}

/// Inner analysis: parses the raw body and runs the pipeline.
pub async fn analyze_inner(analyzer: &SymptomAnalyzer, body: &[u8]) -> (StatusCode, Value) {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("symptom_analysis", %request_id);

    async move {
        let request: SymptomRequest = match serde_json::from_slice(body) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "Malformed symptom analysis body");
                return server_error();
            }
        };

        match analyzer.analyze(request.symptoms.as_deref()).await {
            Ok(result) => {
                tracing::info!(chars = result.chars().count(), "Symptom analysis complete");
                (StatusCode::OK, json!({ "result": result }))
            }
            Err(AnalysisError::InvalidSymptoms) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": INVALID_SYMPTOMS }),
            ),
            Err(e) => {
                tracing::error!(error = %e, "Symptom analysis failed");
                server_error()
            }
        }
    }
    .instrument(span)
    .await
}

/// Inner health check: reports wiring and, for the postgres backend, the DB.
pub async fn health_inner(state: &HttpState) -> (StatusCode, Value) {
    let mut body = json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "store": state.analyzer.store_name(),
        "inference_model": state.analyzer.model(),
        "journal": state.journal.is_some(),
    });

    if let Some(pool) = &state.pool {
        match aidvise_core::db::health_check(pool).await {
            Ok(v) => body["postgresql"] = json!(v),
            Err(e) => {
                tracing::error!(error = %e, "Database health check failed");
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({ "status": "unhealthy", "error": "database unreachable" }),
                );
            }
        }
    }

    (StatusCode::OK, body)
}

/// Inner version: returns version info (pure, no IO).
pub fn version_inner() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "service": "aidvise",
    })
}

/// Extract the caller's access token from `Authorization: Bearer <token>`.
/// The scheme name is matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Option<Secret> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    Some(Secret::from(token))
}

/// Rejections for the journal routes keep their status but carry a JSON body.
fn rejection_response(status: StatusCode, message: String) -> (StatusCode, Value) {
    (status, json!({ "error": message }))
}

fn journal_error(err: JournalError) -> (StatusCode, Value) {
    match err {
        JournalError::Invalid(e) => (StatusCode::BAD_REQUEST, json!({ "error": e.to_string() })),
        JournalError::Unauthorized(_) => {
            (StatusCode::UNAUTHORIZED, json!({ "error": "Not authorized" }))
        }
        JournalError::NotFound(id) => (
            StatusCode::NOT_FOUND,
            json!({ "error": format!("Health log {} not found", id) }),
        ),
        JournalError::Store(e) => {
            tracing::error!(error = %e, "Health log store failure");
            server_error()
        }
    }
}

/// Common guard for journal endpoints: journal configured, token present.
fn journal_access<'a>(
    journal: Option<&'a HealthLogJournal>,
    token: Option<Secret>,
) -> Result<(&'a HealthLogJournal, Secret), (StatusCode, Value)> {
    let journal = journal.ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            json!({ "error": "Health log journal is not configured" }),
        )
    })?;
    let token = token.ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            json!({ "error": "Missing bearer token" }),
        )
    })?;
    Ok((journal, token))
}

fn parse_log_input(body: &[u8]) -> Result<HealthLogInput, (StatusCode, Value)> {
    serde_json::from_slice(body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            json!({ "error": format!("Invalid health log: {}", e) }),
        )
    })
}

pub async fn list_logs_inner(
    journal: Option<&HealthLogJournal>,
    token: Option<Secret>,
) -> (StatusCode, Value) {
    let (journal, token) = match journal_access(journal, token) {
        Ok(access) => access,
        Err(resp) => return resp,
    };

    match journal.list(&token).await {
        Ok(logs) => (StatusCode::OK, json!(logs)),
        Err(e) => journal_error(e),
    }
}

pub async fn create_log_inner(
    journal: Option<&HealthLogJournal>,
    token: Option<Secret>,
    body: &[u8],
) -> (StatusCode, Value) {
    let (journal, token) = match journal_access(journal, token) {
        Ok(access) => access,
        Err(resp) => return resp,
    };
    let input = match parse_log_input(body) {
        Ok(input) => input,
        Err(resp) => return resp,
    };

    match journal.create(&token, input).await {
        Ok(log) => (StatusCode::CREATED, json!(log)),
        Err(e) => journal_error(e),
    }
}

pub async fn update_log_inner(
    journal: Option<&HealthLogJournal>,
    token: Option<Secret>,
    id: i64,
    body: &[u8],
) -> (StatusCode, Value) {
    let (journal, token) = match journal_access(journal, token) {
        Ok(access) => access,
        Err(resp) => return resp,
    };
    let input = match parse_log_input(body) {
        Ok(input) => input,
        Err(resp) => return resp,
    };

    match journal.update(&token, id, input).await {
        Ok(log) => (StatusCode::OK, json!(log)),
        Err(e) => journal_error(e),
    }
}

/// Returns `(204, Null)` on success; the handler sends no body for 204.
pub async fn delete_log_inner(
    journal: Option<&HealthLogJournal>,
    token: Option<Secret>,
    id: i64,
) -> (StatusCode, Value) {
    let (journal, token) = match journal_access(journal, token) {
        Ok(access) => access,
        Err(resp) => return resp,
    };

    match journal.delete(&token, id).await {
        Ok(()) => (StatusCode::NO_CONTENT, Value::Null),
        Err(e) => journal_error(e),
    }
}

// ============================================================================
// Axum handler wrappers (thin, delegate to inner functions)
// ============================================================================

fn respond(status: StatusCode, body: Value) -> Response {
    if status == StatusCode::NO_CONTENT {
        status.into_response()
    } else {
        (status, Json(body)).into_response()
    }
}

pub async fn analyze_handler(
    State(state): State<Arc<HttpState>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::error!(
                status = rejection.status().as_u16(),
                error = %rejection.body_text(),
                "Unreadable symptom analysis body"
            );
            let (status, body) = server_error();
            return respond(status, body);
        }
    };
    let (status, body) = analyze_inner(&state.analyzer, &body).await;
    respond(status, body)
}

pub async fn method_not_allowed_handler() -> Response {
    respond(
        StatusCode::METHOD_NOT_ALLOWED,
        json!({ "error": "Method not allowed" }),
    )
}

pub async fn not_found_handler() -> Response {
    respond(StatusCode::NOT_FOUND, json!({ "error": "Not found" }))
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> Response {
    let (status, body) = health_inner(&state).await;
    respond(status, body)
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn list_logs_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
) -> Response {
    let (status, body) = list_logs_inner(state.journal.as_ref(), bearer_token(&headers)).await;
    respond(status, body)
}

pub async fn create_log_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(r) => {
            let (status, body) = rejection_response(r.status(), r.body_text());
            return respond(status, body);
        }
    };
    let (status, body) =
        create_log_inner(state.journal.as_ref(), bearer_token(&headers), &body).await;
    respond(status, body)
}

pub async fn update_log_handler(
    State(state): State<Arc<HttpState>>,
    id: Result<Path<i64>, PathRejection>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let (id, body) = match (id, body) {
        (Ok(Path(id)), Ok(body)) => (id, body),
        (Err(r), _) => {
            let (status, body) = rejection_response(r.status(), r.body_text());
            return respond(status, body);
        }
        (_, Err(r)) => {
            let (status, body) = rejection_response(r.status(), r.body_text());
            return respond(status, body);
        }
    };
    let (status, body) =
        update_log_inner(state.journal.as_ref(), bearer_token(&headers), id, &body).await;
    respond(status, body)
}

pub async fn delete_log_handler(
    State(state): State<Arc<HttpState>>,
    id: Result<Path<i64>, PathRejection>,
    headers: HeaderMap,
) -> Response {
    let id = match id {
        Ok(Path(id)) => id,
        Err(r) => {
            let (status, body) = rejection_response(r.status(), r.body_text());
            return respond(status, body);
        }
    };
    let (status, body) = delete_log_inner(state.journal.as_ref(), bearer_token(&headers), id).await;
    respond(status, body)
}

// ============================================================================
// Unit Tests: call inner functions directly
// ============================================================================
