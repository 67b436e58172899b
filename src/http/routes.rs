//! Chain and version routes
//!
//! - `POST /chains` create a chain
//! - `GET  /chains/:chain_id` latest version
//! - `GET  /chains/:chain_id/history` ordered history
//! - `POST /chains/:chain_id/actions/:action_id` apply an action
//! - `GET  /versions/:version_id` one version
//! - `GET  /versions/:version_id/events` supersession stream (SSE)
//! - `GET  /metrics`, `GET /health`
//!
//! The core is synchronous; handlers run it on the blocking pool.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::ApiError;
use crate::coordinator::{MutationCoordinator, MutationRequest};
use crate::errors::MutationResult;
use crate::observability::MetricsSnapshot;
use crate::version::{ChainId, RevisionDetails, Version, VersionId};

/// Header carrying the idempotency token of a mutation.
pub const IDEMPOTENCY_KEY: &str = "idempotency-key";

/// State shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<MutationCoordinator>,
}

impl AppState {
    pub fn new(coordinator: Arc<MutationCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Runs a core call on the blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&MutationCoordinator) -> MutationResult<T> + Send + 'static,
    {
        let coordinator = Arc::clone(&self.coordinator);
        tokio::task::spawn_blocking(move || f(&coordinator))
            .await
            .map_err(|e| ApiError::internal(format!("Worker failed: {}", e)))?
            .map_err(ApiError::from)
    }
}

// ==================
// Request/Response Types
// ==================

#[derive(Debug, Deserialize)]
pub struct CreateChainRequest {
    pub resource_type: String,
    pub chain_id: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub resource_type: String,
    pub expected_version: String,
    #[serde(default)]
    pub arguments: Value,
    pub actor: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub id: VersionId,
    pub version_number: u64,
    pub is_latest: bool,
    pub status: String,
    pub revision_details: Option<RevisionDetails>,
}

impl From<&Version> for HistoryEntry {
    fn from(v: &Version) -> Self {
        Self {
            id: v.id(),
            version_number: v.version_number(),
            is_latest: v.is_latest(),
            status: v.status().to_string(),
            revision_details: v.revision_details().cloned(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub chain_id: ChainId,
    pub versions: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ==================
// Routes
// ==================

pub fn chain_routes(state: AppState) -> Router {
    Router::new()
        .route("/chains", post(create_chain_handler))
        .route("/chains/:chain_id", get(latest_handler))
        .route("/chains/:chain_id/history", get(history_handler))
        .route("/chains/:chain_id/actions/:action_id", post(apply_handler))
        .route("/versions/:version_id", get(version_handler))
        .route("/versions/:version_id/events", get(events_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

fn parse_version_id(raw: &str) -> Result<VersionId, ApiError> {
    VersionId::parse(raw).ok_or_else(|| ApiError::bad_request(format!("Invalid version id: {}", raw)))
}

fn created(version: Version) -> Response {
    let location = format!("/versions/{}", version.id());
    (
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(version),
    )
        .into_response()
}

// ==================
// Handlers
// ==================

async fn create_chain_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateChainRequest>,
) -> Result<Response, ApiError> {
    if request.chain_id.is_empty() {
        return Err(ApiError::bad_request("chain_id must not be empty"));
    }
    let payload = match request.payload {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    let version = state
        .run(move |c| c.create_chain(&request.resource_type, ChainId::new(request.chain_id), payload))
        .await?;
    Ok(created(version))
}

async fn latest_handler(
    State(state): State<AppState>,
    Path(chain_id): Path<String>,
) -> Result<Json<Version>, ApiError> {
    let version = state
        .run(move |c| c.get_latest(&ChainId::new(chain_id)))
        .await?;
    Ok(Json(version))
}

async fn history_handler(
    State(state): State<AppState>,
    Path(chain_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let chain_id = ChainId::new(chain_id);
    let lookup = chain_id.clone();
    let versions = state.run(move |c| c.history(&lookup)).await?;
    Ok(Json(HistoryResponse {
        chain_id,
        versions: versions.iter().map(HistoryEntry::from).collect(),
    }))
}

async fn version_handler(
    State(state): State<AppState>,
    Path(version_id): Path<String>,
) -> Result<Json<Version>, ApiError> {
    let id = parse_version_id(&version_id)?;
    let version = state.run(move |c| c.get_version(id)).await?;
    Ok(Json(version))
}

async fn apply_handler(
    State(state): State<AppState>,
    Path((chain_id, action_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<ActionRequest>,
) -> Result<Response, ApiError> {
    let expected = parse_version_id(&body.expected_version)?;
    let token = match headers.get(IDEMPOTENCY_KEY) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| ApiError::bad_request("Idempotency-Key must be visible ASCII"))?
                .to_string(),
        ),
        None => None,
    };

    let mut request = MutationRequest::new(
        body.resource_type,
        ChainId::new(chain_id),
        action_id,
        body.arguments,
        expected,
        body.actor,
    );
    if let Some(token) = token {
        request = request.with_idempotency_token(token);
    }

    let version = state.run(move |c| c.apply(request)).await?;
    Ok(created(version))
}

/// Streams `replace` then `superseded`, then closes.
async fn events_handler(
    State(state): State<AppState>,
    Path(version_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let id = parse_version_id(&version_id)?;
    let subscription = state.run(move |c| c.subscribe(id)).await?;

    let stream = subscription.into_stream().map(|event| {
        Ok(SseEvent::default()
            .event(event.name())
            .data(event.data().to_string()))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn metrics_handler(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.coordinator.metrics().snapshot())
}

async fn health_handler() -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    (StatusCode::OK, Json(response))
}
