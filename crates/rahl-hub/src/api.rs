//! REST API server — expose the gateway over HTTP.
//!
//! Endpoints:
//! - GET  /health — Health check
//! - POST /api/chat — Send a message and get a structured reply
//! - GET  /api/session/{id} — Inspect a session's mode and generated files
//! - POST /api/github/auth — Exchange an OAuth code for a token
//! - POST /api/github/create-repo — Export generated files to a new repository
//! - POST /api/execute — Code execution placeholder (never runs code)
//! - GET  /api/metrics — Runtime metrics

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path as UrlPath, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::{error, info, warn};

use rahl_core::config::ServerSettings;
use rahl_core::error::RahlError;
use rahl_core::gateway::ChatGateway;
use rahl_core::message::{ChatInput, ChatReply};
use rahl_core::provider::LlmProvider;

use crate::github::{CreatedRepo, GitHubClient, TokenResponse};
use crate::metrics::{spawn_event_listener, SharedMetrics};
use crate::middleware::logging_middleware;

/// Shared API state.
pub struct ApiState {
    pub gateway: ChatGateway,
    pub provider: Box<dyn LlmProvider>,
    pub github: GitHubClient,
    pub metrics: SharedMetrics,
}

// The gateway serializes per session, so no lock wraps the whole state.
type SharedState = Arc<ApiState>;

// ─── Request/Response types ────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: String,
    pub is_coding_mode: bool,
    pub current_project: String,
    pub files: BTreeMap<String, String>,
    pub turns: usize,
}

#[derive(Deserialize)]
pub struct GitHubAuthRequest {
    pub code: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRepoRequest {
    pub access_token: String,
    pub repo_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRepoResponse {
    pub success: bool,
    #[serde(flatten)]
    pub repo: CreatedRepo,
}

#[derive(Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    pub language: String,
}

#[derive(Serialize)]
pub struct ExecuteResponse {
    pub output: String,
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<bool>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
            fallback: None,
        }),
    )
}

/// Unwrap a JSON body, turning any rejection into a generic 400.
fn accept<T>(
    state: &ApiState,
    endpoint: &str,
    payload: Result<Json<T>, JsonRejection>,
) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(|e| {
        state.metrics.record_invalid();
        warn!("Rejected {} request: {}", endpoint, e.body_text());
        api_error(StatusCode::BAD_REQUEST, "Invalid request")
    })
}

// ─── Handlers ──────────────────────────────────────────────

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "Rahl AI Backend",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn chat(
    State(state): State<SharedState>,
    payload: Result<Json<ChatInput>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let input = accept(&state, "chat", payload)?;

    match state.gateway.process(state.provider.as_ref(), &input).await {
        Ok(result) => {
            state.metrics.record_request(true);
            if result.fell_back {
                state.metrics.record_parse_fallback();
            }
            Ok(Json(result.reply))
        }
        Err(RahlError::InvalidInput(reason)) => {
            state.metrics.record_invalid();
            warn!("Rejected chat request: {}", reason);
            Err(api_error(StatusCode::BAD_REQUEST, "Invalid request"))
        }
        Err(e) => {
            state.metrics.record_request(false);
            error!("Chat error: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to process request".to_string(),
                    fallback: Some(true),
                }),
            ))
        }
    }
}

async fn session(
    State(state): State<SharedState>,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state
        .gateway
        .sessions()
        .snapshot(&id)
        .await
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Session not found"))?;

    Ok(Json(SessionView {
        session_id: session.id().to_string(),
        is_coding_mode: session.is_coding_mode(),
        current_project: session.current_project().to_string(),
        files: session.files().clone(),
        turns: session.history().len(),
    }))
}

async fn github_auth(
    State(state): State<SharedState>,
    payload: Result<Json<GitHubAuthRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let req = accept(&state, "GitHub auth", payload)?;
    if !state.github.oauth_enabled() {
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "GitHub integration not configured",
        ));
    }

    state.github.exchange_code(&req.code).await.map(Json).map_err(|e| {
        warn!("GitHub auth error: {}", e);
        api_error(StatusCode::BAD_REQUEST, "GitHub authentication failed")
    })
}

async fn github_create_repo(
    State(state): State<SharedState>,
    payload: Result<Json<CreateRepoRequest>, JsonRejection>,
) -> Result<Json<CreateRepoResponse>, ApiError> {
    let req = accept(&state, "create-repo", payload)?;
    match state
        .github
        .create_repository(
            &req.access_token,
            &req.repo_name,
            req.description.as_deref(),
            &req.files,
        )
        .await
    {
        Ok(repo) => {
            state.metrics.record_repo_created();
            Ok(Json(CreateRepoResponse {
                success: true,
                repo,
            }))
        }
        Err(e) => {
            error!("GitHub error: {}", e);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create repository",
            ))
        }
    }
}

/// Placeholder for a sandboxed runner; code is never evaluated here.
async fn execute(
    State(state): State<SharedState>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let req = accept(&state, "execute", payload)?;
    Ok(Json(ExecuteResponse {
        output: format!("Code execution simulated for {}", req.language),
        error: None,
    }))
}

async fn metrics(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(state.metrics.to_json(state.gateway.sessions().len()))
}

// ─── Server builder ────────────────────────────────────────

/// Build the API router. Unmatched paths are served from `static_dir`
/// when one is given.
pub fn build_router(state: SharedState, static_dir: Option<&Path>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/session/{id}", get(session))
        .route("/api/github/auth", post(github_auth))
        .route("/api/github/create-repo", post(github_create_repo))
        .route("/api/execute", post(execute))
        .route("/api/metrics", get(metrics))
        .with_state(state);

    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(middleware::from_fn(logging_middleware))
        .layer(CorsLayer::permissive())
}

/// Start the API server.
pub async fn start_server(state: ApiState, settings: &ServerSettings) -> anyhow::Result<()> {
    let shared = Arc::new(state);
    spawn_event_listener(
        shared.metrics.clone(),
        shared.gateway.sessions().bus().subscribe(),
    );

    let app = build_router(shared, settings.static_dir.as_deref());

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    info!("🌐 API server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
