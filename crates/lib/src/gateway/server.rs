//! Bot HTTP server (single port).
//!
//! - `POST /api/messages`: activities from the channel.
//! - `POST /api/notify`: proactive message `{user_id, message}`.
//! - `GET /auth-start.html`, `GET /auth-end.html`: SSO popup pages from `server.staticDir`.
//! - `GET /`: health.

use crate::agent::AgentClient;
use crate::bot::{BotHandler, NotifyError, OAuthCardDialog, ProactiveNotifier};
use crate::channels::{Activity, BotConnector, BotFrameworkConnector};
use crate::config::{self, Config};
use crate::conversation::ConversationReferenceStore;
use crate::telemetry::TelemetryHandle;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Deadline for outbound connector calls (replies, proactive sends, token requests).
const CONNECTOR_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state for the server (config, handler, notifier, reference store).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub handler: Arc<BotHandler>,
    pub notifier: Arc<ProactiveNotifier>,
    pub references: Arc<ConversationReferenceStore>,
}

impl GatewayState {
    /// Wire the handler, notifier and reference store around `connector`.
    /// SSO is enabled when a connection name is configured.
    pub fn new(config: Config, connector: Arc<dyn BotConnector>, telemetry: TelemetryHandle) -> Self {
        let references = Arc::new(ConversationReferenceStore::new());
        let agent = AgentClient::from_config(&config);
        log::info!("agent endpoint: {}", agent.chat_url());
        let mut handler = BotHandler::new(
            connector.clone(),
            agent,
            references.clone(),
            telemetry.clone(),
        )
        .with_welcome_message(config.bot.welcome_message.clone());
        if let Some(connection) = config::resolve_sso_connection(&config) {
            log::info!("sso enabled (connection {})", connection);
            handler = handler.with_sso(Arc::new(OAuthCardDialog::new(connection)));
        } else {
            log::info!("sso not configured; sso commands will report unavailable");
        }
        let notifier = ProactiveNotifier::new(references.clone(), connector, telemetry);
        Self {
            config: Arc::new(config),
            handler: Arc::new(handler),
            notifier: Arc::new(notifier),
            references,
        }
    }
}

/// Routes of the bot server.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/api/messages", post(messages))
        .route("/api/notify", post(notify))
        .route("/auth-start.html", get(auth_start))
        .route("/auth-end.html", get(auth_end))
        .with_state(state)
}

/// Run the bot server on server.bind:server.port.
/// Binding a non-loopback address requires bot credentials.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind = config.server.bind.trim().to_string();
    let credentials = config::resolve_bot_credentials(&config);
    if !config::is_loopback_bind(&bind) && credentials.is_none() {
        anyhow::bail!(
            "refusing to bind to {} without bot credentials (set bot.appId and bot.appPassword or BOT_ID and BOT_PASSWORD)",
            bind
        );
    }
    if credentials.is_none() {
        log::warn!("no bot credentials configured; outbound calls are unauthenticated (emulator mode)");
    }
    let connector = BotFrameworkConnector::new(credentials, CONNECTOR_TIMEOUT)
        .with_token_service_url(config::resolve_token_service_url(&config));
    let bind_addr = format!("{}:{}", bind, config.server.port);
    let state = GatewayState::new(config, Arc::new(connector), TelemetryHandle::log());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("bot listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("bot server exited")?;
    log::info!("bot server stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.server.port,
        "conversationReferences": state.references.len().await,
    }))
}

/// POST /api/messages: one activity per request; the turn runs before the response is sent.
async fn messages(State(state): State<GatewayState>, body: Bytes) -> StatusCode {
    let activity: Activity = match serde_json::from_slice(&body) {
        Ok(a) => a,
        Err(e) => {
            log::debug!("messages: invalid activity: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };
    let status = state.handler.on_turn(activity).await;
    StatusCode::from_u16(status).unwrap_or(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
struct NotifyRequest {
    #[serde(alias = "userId")]
    user_id: String,
    message: String,
}

/// POST /api/notify: 200 when sent, 404 with known keys when the user was never seen, 500 on delivery failure.
async fn notify(
    State(state): State<GatewayState>,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    let req: NotifyRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid notify request: {}", e) })),
            );
        }
    };
    let user_id = req.user_id.trim();
    if user_id.is_empty() || req.message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "user_id and message are required" })),
        );
    }
    match state.notifier.notify(user_id, &req.message).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "sent", "userId": user_id })),
        ),
        Err(NotifyError::UnknownUser { user_id, known }) => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": format!("no conversation reference for user {}", user_id),
                "knownUsers": known,
            })),
        ),
        Err(e @ NotifyError::Delivery(_)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

async fn auth_start(State(state): State<GatewayState>) -> Response {
    static_page(&state, "auth-start.html").await
}

async fn auth_end(State(state): State<GatewayState>) -> Response {
    static_page(&state, "auth-end.html").await
}

async fn static_page(state: &GatewayState, name: &str) -> Response {
    let Some(ref dir) = state.config.server.static_dir else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let path = dir.join(name);
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            log::debug!("static page {} unavailable: {}", path.display(), e);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}
