use std::sync::Arc;

use ambient_core::{Messenger, UserId};
use ambient_engine::{Companion, EngineError};
use ambient_settings::ServerSettings;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::telegram::Update;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub webhook_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            webhook_path: s.webhook_path.clone(),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub companion: Arc<Companion>,
    /// Delivers replies to webhook messages.
    pub messenger: Arc<dyn Messenger>,
}

#[derive(Debug)]
enum ApiError {
    Forbidden,
    Engine(EngineError),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self::Engine(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(json!({"error": "user not allowed", "kind": "forbidden"})),
            )
                .into_response(),
            Self::Engine(e) => {
                error!(error = %e, error_kind = e.kind(), "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": e.to_string(), "kind": e.kind()})),
                )
                    .into_response()
            }
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, webhook_path: &str) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/message", post(message_handler))
        .route("/memory", get(memory_handler))
        .route("/forget", post(forget_handler))
        .route(webhook_path, post(webhook_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve until `cancel` fires.
pub async fn start(config: ServerConfig, state: AppState, cancel: CancellationToken) -> Result<ServerHandle, std::io::Error> {
    let router = build_router(state, &config.webhook_path);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    info!(port = local_addr.port(), webhook_path = %config.webhook_path, "ambient server started");

    let server = tokio::spawn(async move {
        let shutdown = async move { cancel.cancelled().await };
        if let Err(e) = axum::serve(listener, router).with_graceful_shutdown(shutdown).await {
            error!(error = %e, "server stopped with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        server,
    })
}

/// Handle returned by `start()`.
pub struct ServerHandle {
    pub port: u16,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Wait for the server task to exit after cancellation.
    pub async fn stopped(self) {
        let _ = self.server.await;
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let autonomy = state.companion.autonomy();
    let autonomy_state = autonomy.state().await;
    Json(json!({
        "status": "healthy",
        "liveSession": state.companion.conversation().live().await.is_some(),
        "pendingSyntheses": state.companion.conversation().pending_count(),
        "lastCycleAt": autonomy_state.last_cycle_at,
        "lastProactiveAt": autonomy_state.last_proactive_at,
        "proactiveCountToday": autonomy.proactive_count_today().await,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageBody {
    user_id: UserId,
    text: String,
}

/// Direct inbound message; the reply comes back in the response body.
async fn message_handler(State(state): State<AppState>, Json(body): Json<MessageBody>) -> Result<Json<Value>, ApiError> {
    if !state.companion.access().is_allowed(body.user_id) {
        return Err(ApiError::Forbidden);
    }
    let reply = state.companion.handle_inbound(body.user_id, &body.text).await?;
    Ok(Json(json!({ "reply": reply })))
}

/// Telegram webhook. Acknowledges immediately and replies out of band, so
/// slow completions never trigger a redelivery.
async fn webhook_handler(State(state): State<AppState>, Json(update): Json<Update>) -> StatusCode {
    let Some((user_id, chat_id, text)) = update.text_message() else {
        return StatusCode::OK;
    };
    let text = text.to_string();
    tokio::spawn(async move {
        match state.companion.handle_inbound(user_id, &text).await {
            Ok(Some(reply)) => {
                if let Err(e) = state.messenger.send(chat_id, &reply).await {
                    warn!(user_id, error = %e, "reply not delivered");
                }
            }
            Ok(None) => {}
            Err(e) => error!(user_id, error = %e, error_kind = e.kind(), "inbound message failed"),
        }
    });
    StatusCode::OK
}

async fn memory_handler(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let snapshot = state.companion.store().read_all().map_err(EngineError::from)?;
    let documents: serde_json::Map<String, Value> = snapshot
        .iter()
        .map(|(name, content)| (name.file_name().to_string(), Value::String(content.to_string())))
        .collect();
    Ok(Json(json!({
        "documents": documents,
        "preview": state.companion.memory_preview()?,
    })))
}

async fn forget_handler(State(state): State<AppState>) -> Json<Value> {
    let forgotten = state.companion.forget().await;
    Json(json!({ "forgotten": forgotten.map(|id| id.to_string()) }))
}
