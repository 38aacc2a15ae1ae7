//! HTTP surface: metadata commands and insert visibility
//!
//! Endpoints:
//!   POST /v1/metadata    - run a command document (admin secret required when configured)
//!   POST /v1/visibility  - is the insert permission of `x-hasura-role` visible to this request?
//!   GET  /healthz        - liveness

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::cache::{PermissionCache, SchemaCache};
use crate::command::run_command;
use crate::constants::{
    ADMIN_ROLE, ADMIN_SECRET_HEADER, DEFAULT_SOURCE, ROLE_HEADER, USE_BACKEND_ONLY_PERMISSIONS_HEADER,
};
use crate::db::MetadataStore;
use crate::error::PermError;
use crate::gate::{admin_secret_ok, backend_only_visible, parse_header_bool, GateInput};
use crate::types::{MetadataObjId, PermKind, SourceName, TableName};

// ============================================================================
// State
// ============================================================================

pub struct AppState {
    pub store: MetadataStore,
    /// Also serializes metadata writes
    pub cache: Mutex<PermissionCache>,
    pub admin_secret: Option<String>,
}

impl AppState {
    pub fn new(store: MetadataStore, cache: PermissionCache, admin_secret: Option<String>) -> Self {
        AppState { store, cache: Mutex::new(cache), admin_secret }
    }

    fn secret_ok(&self, headers: &HeaderMap) -> bool {
        admin_secret_ok(self.admin_secret.as_deref(), header(headers, ADMIN_SECRET_HEADER))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/metadata", post(post_metadata))
        .route("/v1/visibility", post(post_visibility))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

pub enum ApiError {
    Unauthorized,
    Perm(PermError),
}

impl From<PermError> for ApiError {
    fn from(e: PermError) -> Self {
        ApiError::Perm(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "code": "access-denied", "error": "invalid admin secret" })),
            )
                .into_response(),
            ApiError::Perm(e) => {
                let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if status.is_server_error() {
                    tracing::error!(error = %e, "metadata request failed");
                }
                let body = json!({ "code": e.code().as_str(), "error": e.root().to_string(), "path": e.path() });
                (status, Json(body)).into_response()
            }
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn healthz() -> &'static str {
    "OK"
}

async fn post_metadata(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(doc): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    if !state.secret_ok(&headers) {
        return Err(ApiError::Unauthorized);
    }
    let mut cache = state.cache.lock().await;
    Ok(Json(run_command(&state.store, &mut *cache, doc)?))
}

#[derive(Debug, Deserialize)]
struct VisibilityReq {
    #[serde(default)]
    source: Option<SourceName>,
    table: TableName,
}

#[derive(Debug, Serialize, PartialEq)]
struct VisibilityRes {
    role: String,
    defined: bool,
    backend_only: bool,
    visible: bool,
}

async fn post_visibility(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<VisibilityReq>,
) -> Result<Json<VisibilityRes>, ApiError> {
    let source = req.source.as_deref().unwrap_or(DEFAULT_SOURCE);
    let role = header(&headers, ROLE_HEADER).unwrap_or(ADMIN_ROLE).to_string();
    let secret_ok = state.secret_ok(&headers);
    if role == ADMIN_ROLE {
        // Admin is not governed by permissions, but still needs the secret
        return Ok(Json(VisibilityRes { role, defined: true, backend_only: false, visible: secret_ok }));
    }

    let cache = state.cache.lock().await;
    let schema = cache.schema(source).ok_or_else(|| PermError::SourceNotFound(source.to_string()))?;
    if !schema.table_exists(&req.table) {
        return Err(PermError::TableNotFound { source_name: source.to_string(), table: req.table }.into());
    }
    let id = MetadataObjId::new(source, &req.table, &role, PermKind::Insert);
    let Some(insert) = cache.descriptor(&id).and_then(|d| d.as_insert()) else {
        return Ok(Json(VisibilityRes { role, defined: false, backend_only: false, visible: false }));
    };
    let visible = backend_only_visible(GateInput {
        backend_only: insert.backend_only,
        admin_secret_ok: secret_ok,
        use_backend_only: parse_header_bool(header(&headers, USE_BACKEND_ONLY_PERMISSIONS_HEADER)),
        role: &role,
    });
    Ok(Json(VisibilityRes { role, defined: true, backend_only: insert.backend_only, visible }))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
