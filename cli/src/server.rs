use std::sync::{Arc, Mutex};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, Request, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use serde::Serialize;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info};

use larder_core::models::{DeleteResponse, ServerRecord, SyncPushRequest, SyncPushResponse};
use larder_core::namespace::Namespace;
use larder_core::server_store::ServerStore;
use larder_core::stats::ExpiryStats;

const BODY_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<ServerStore>>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

// --- Error handling ---

enum ApiError {
    BadRequest(String),
    Body(JsonRejection),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Body(rejection) => (rejection.status(), rejection.body_text()),
            Self::Internal(err) => {
                error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Body(rejection)
    }
}

fn parse_namespace(raw: &str) -> Result<Namespace, ApiError> {
    Namespace::parse(raw).map_err(|e| ApiError::BadRequest(format!("{e}")))
}

// --- Middleware ---

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn push_sync(
    State(state): State<AppState>,
    Path(ns): Path<String>,
    body: Result<Json<SyncPushRequest>, JsonRejection>,
) -> Result<Json<SyncPushResponse>, ApiError> {
    let namespace = parse_namespace(&ns)?;
    let Json(req) = body?;

    let mut store = state
        .store
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let count = store
        .push_batch(&namespace, &req.items)
        .map_err(|e| ApiError::BadRequest(format!("{e:#}")))?;
    info!(namespace = %namespace, count, "accepted push");
    Ok(Json(SyncPushResponse { success: true }))
}

async fn pull_sync(
    State(state): State<AppState>,
    Path(ns): Path<String>,
) -> Result<Json<Vec<ServerRecord>>, ApiError> {
    let namespace = parse_namespace(&ns)?;
    let store = state
        .store
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let records = store
        .pull_all(&namespace)
        .context("failed to read namespace")?;
    Ok(Json(records))
}

async fn delete_record(
    State(state): State<AppState>,
    Path((ns, local_id)): Path<(String, String)>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let namespace = parse_namespace(&ns)?;
    let local_id: i64 = local_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid localId '{local_id}'")))?;

    let store = state
        .store
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let deleted = store
        .delete_one(&namespace, local_id)
        .context("failed to delete record")?;
    info!(namespace = %namespace, local_id, deleted, "delete requested");
    Ok(Json(DeleteResponse {
        success: true,
        deleted,
    }))
}

async fn get_stats(
    State(state): State<AppState>,
    Path(ns): Path<String>,
) -> Result<Json<ExpiryStats>, ApiError> {
    let namespace = parse_namespace(&ns)?;
    let store = state
        .store
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let stats = store
        .compute_stats(&namespace, chrono::Utc::now())
        .context("failed to compute stats")?;
    Ok(Json(stats))
}

// --- Router builder ---

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/sync/{ns}", get(pull_sync).post(push_sync))
        .route("/sync/{ns}/{local_id}", delete(delete_record))
        .route("/stats/{ns}", get(get_stats))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(store: ServerStore, port: u16, bind: &str) -> anyhow::Result<()> {
    let state = AppState {
        store: Arc::new(Mutex::new(store)),
    };
    let app = build_router(state);

    if bind != "127.0.0.1" && bind != "localhost" {
        tracing::warn!(
            "listening on {bind} with no authentication; any device on your network can read and overwrite household data"
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutting down");
        })
        .await?;

    Ok(())
}
