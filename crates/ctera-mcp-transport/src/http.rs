//! HTTP surface for tool invocation.
//!
//! Routes:
//! - GET  /api/v1/tools               (bearer) tool descriptors
//! - POST /api/v1/run                 (bearer) run a tool
//! - GET  /api/session/{session_key}  (bearer) one stored session
//! - POST /mcp                        (bearer) run a tool, MCP clients
//! - GET  /mcp                        tool schema for MCP clients
//! - GET  /mcp-tools-schema           tool registration (when enabled)
//! - GET  /api/health                 liveness and session count

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use ctera_mcp_core::{ClientFactory, ErrorKind, SessionKey, SessionStore};
use serde_json::{Map, Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::tools::{DispatchError, ToolDispatcher};

/// Shared state for the HTTP handlers.
pub struct AppState<S, F>
where
    S: SessionStore,
    F: ClientFactory,
{
    dispatcher: ToolDispatcher<S, F>,
    token: Arc<str>,
    tools_registration: bool,
}

impl<S, F> Clone for AppState<S, F>
where
    S: SessionStore,
    F: ClientFactory,
{
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            token: Arc::clone(&self.token),
            tools_registration: self.tools_registration,
        }
    }
}

impl<S, F> AppState<S, F>
where
    S: SessionStore,
    F: ClientFactory,
{
    /// Create state guarded by the given bearer token.
    #[must_use]
    pub fn new(dispatcher: ToolDispatcher<S, F>, token: impl Into<Arc<str>>) -> Self {
        Self {
            dispatcher,
            token: token.into(),
            tools_registration: false,
        }
    }

    /// Serve `/mcp-tools-schema` for editor tool registration.
    #[must_use]
    pub const fn with_tools_registration(mut self, enabled: bool) -> Self {
        self.tools_registration = enabled;
        self
    }
}

/// Build the agent router.
pub fn router<S, F>(state: AppState<S, F>) -> Router
where
    S: SessionStore + 'static,
    F: ClientFactory + 'static,
{
    let api = Router::new()
        .route("/api/v1/tools", get(list_tools::<S, F>))
        .route("/api/v1/run", post(run_tool::<S, F>))
        .route("/api/session/{session_key}", get(session_detail::<S, F>))
        .route("/mcp", post(run_tool::<S, F>))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer::<S, F>,
        ));

    let mut public = Router::new()
        .route("/api/health", get(health::<S, F>))
        .route("/mcp", get(mcp_schema::<S, F>));
    if state.tools_registration {
        public = public.route("/mcp-tools-schema", get(mcp_tools_registration::<S, F>));
    }

    public
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn require_bearer<S, F>(
    State(state): State<AppState<S, F>>,
    request: Request,
    next: Next,
) -> Response
where
    S: SessionStore + 'static,
    F: ClientFactory + 'static,
{
    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token == &*state.token);

    if authorized {
        next.run(request).await
    } else {
        tracing::warn!(path = %request.uri().path(), "Rejected unauthenticated request");
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" }))).into_response()
    }
}

/// GET /api/v1/tools
async fn list_tools<S, F>(State(state): State<AppState<S, F>>) -> impl IntoResponse
where
    S: SessionStore + 'static,
    F: ClientFactory + 'static,
{
    Json(state.dispatcher.descriptors())
}

/// GET /mcp
async fn mcp_schema<S, F>(State(state): State<AppState<S, F>>) -> impl IntoResponse
where
    S: SessionStore + 'static,
    F: ClientFactory + 'static,
{
    Json(json!({ "functions": state.dispatcher.descriptors() }))
}

/// GET /mcp-tools-schema
async fn mcp_tools_registration<S, F>(State(state): State<AppState<S, F>>) -> impl IntoResponse
where
    S: SessionStore + 'static,
    F: ClientFactory + 'static,
{
    Json(json!({
        "name": "CTERA SDK",
        "description": "CTERA SDK Tools for Cursor",
        "schema": { "functions": state.dispatcher.descriptors() },
    }))
}

/// GET /api/session/{session_key}
async fn session_detail<S, F>(
    State(state): State<AppState<S, F>>,
    Path(session_key): Path<String>,
) -> Response
where
    S: SessionStore + 'static,
    F: ClientFactory + 'static,
{
    let session_key = SessionKey::from(session_key);
    match state.dispatcher.manager().session_summary(&session_key).await {
        Ok(summary) => Json(summary).into_response(),
        Err(error) => {
            let status = if error.kind() == ErrorKind::SessionNotFound {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            error_response(status, &error.to_string(), error.kind())
        }
    }
}

/// POST /api/v1/run and POST /mcp
async fn run_tool<S, F>(State(state): State<AppState<S, F>>, body: Bytes) -> Response
where
    S: SessionStore + 'static,
    F: ClientFactory + 'static,
{
    let (name, parameters) = match parse_run_body(&body) {
        Ok(parsed) => parsed,
        Err(message) => return bad_request(&message, ErrorKind::InvalidParameter),
    };

    match state.dispatcher.run(&name, &parameters).await {
        Ok(envelope) => Json(envelope).into_response(),
        Err(error) => {
            tracing::info!(tool = %name, %error, "Rejected tool request");
            let status = match error {
                DispatchError::UnknownTool(_) => StatusCode::NOT_FOUND,
                DispatchError::MissingParameter(_) | DispatchError::InvalidParameter { .. } => {
                    StatusCode::BAD_REQUEST
                }
            };
            error_response(status, &error.to_string(), error.kind())
        }
    }
}

/// GET /api/health
async fn health<S, F>(State(state): State<AppState<S, F>>) -> Response
where
    S: SessionStore + 'static,
    F: ClientFactory + 'static,
{
    match state.dispatcher.manager().session_count().await {
        Ok(active_sessions) => Json(json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "active_sessions": active_sessions,
        }))
        .into_response(),
        Err(error) => {
            tracing::error!(%error, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unavailable",
                    "version": env!("CARGO_PKG_VERSION"),
                    "error": error.to_string(),
                })),
            )
                .into_response()
        }
    }
}

/// Split a run body into tool name and parameters.
fn parse_run_body(body: &[u8]) -> Result<(String, Map<String, Value>), String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err("Missing request body".to_string());
    }

    let body: Value =
        serde_json::from_slice(body).map_err(|e| format!("Invalid request body: {e}"))?;
    let Value::Object(mut body) = body else {
        return Err("Invalid request body: expected a JSON object".to_string());
    };

    let name = match body.remove("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name,
        _ => return Err("Missing tool name".to_string()),
    };

    let parameters = match body.remove("parameters") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(parameters)) => parameters,
        Some(_) => return Err("Invalid request body: parameters must be an object".to_string()),
    };

    Ok((name, parameters))
}

fn bad_request(message: &str, kind: ErrorKind) -> Response {
    error_response(StatusCode::BAD_REQUEST, message, kind)
}

fn error_response(status: StatusCode, message: &str, kind: ErrorKind) -> Response {
    (status, Json(json!({ "error": message, "kind": kind }))).into_response()
}
