//! Shared fixtures for integration tests: a recording connector, a scripted agent
//! service and a bot server on a free port. No network beyond 127.0.0.1.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use lib::channels::{Activity, ActivityType, BotConnector, ConnectorError};
use lib::config::Config;
use lib::conversation::ConversationReference;
use lib::gateway::{router, GatewayState};
use lib::telemetry::TelemetryHandle;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Connector that keeps every outbound activity instead of sending it.
#[derive(Default)]
pub struct RecordingConnector {
    sent: Mutex<Vec<Activity>>,
    fail: bool,
    /// Message sends still to reject before delivering again.
    fail_messages: AtomicUsize,
}

impl RecordingConnector {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Rejects the first `n` message activities; typing indicators go through.
    pub fn failing_first_messages(n: usize) -> Self {
        Self {
            fail_messages: AtomicUsize::new(n),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Activity> {
        self.sent.lock().unwrap().clone()
    }

    /// Text of the message activities sent so far (typing indicators skipped).
    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|a| a.typ == ActivityType::Message)
            .filter_map(|a| a.text)
            .collect()
    }
}

#[async_trait]
impl BotConnector for RecordingConnector {
    async fn send_activity(
        &self,
        _reference: &ConversationReference,
        activity: &Activity,
    ) -> Result<(), ConnectorError> {
        if self.fail {
            return Err(ConnectorError::Api("503 service unavailable".to_string()));
        }
        if activity.typ == ActivityType::Message
            && self
                .fail_messages
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(ConnectorError::Api("400 bad request".to_string()));
        }
        self.sent.lock().unwrap().push(activity.clone());
        Ok(())
    }
}

/// Scripted agent service. Every chat call answers with `chat_status` and `chat_body`.
pub struct MockAgent {
    pub chat_status: StatusCode,
    pub chat_body: Value,
    pub chat_calls: AtomicUsize,
    pub clear_calls: AtomicUsize,
    pub last_chat: Mutex<Option<Value>>,
    pub last_traceparent: Mutex<Option<String>>,
    pub last_request_id: Mutex<Option<String>>,
}

impl MockAgent {
    pub fn new(chat_status: StatusCode, chat_body: Value) -> Self {
        Self {
            chat_status,
            chat_body,
            chat_calls: AtomicUsize::new(0),
            clear_calls: AtomicUsize::new(0),
            last_chat: Mutex::new(None),
            last_traceparent: Mutex::new(None),
            last_request_id: Mutex::new(None),
        }
    }

    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    pub fn clear_calls(&self) -> usize {
        self.clear_calls.load(Ordering::SeqCst)
    }
}

async fn agent_chat(
    State(agent): State<Arc<MockAgent>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    agent.chat_calls.fetch_add(1, Ordering::SeqCst);
    *agent.last_chat.lock().unwrap() = Some(body);
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    *agent.last_traceparent.lock().unwrap() = header("traceparent");
    *agent.last_request_id.lock().unwrap() = header("request-id");
    (agent.chat_status, Json(agent.chat_body.clone()))
}

async fn clear_history(State(agent): State<Arc<MockAgent>>) -> impl IntoResponse {
    agent.clear_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "status": "cleared" }))
}

/// Serve `agent` on a free port; returns its base URL.
pub async fn spawn_agent(agent: Arc<MockAgent>) -> String {
    let app = Router::new()
        .route("/agent_chat", post(agent_chat))
        .route("/clear_history", post(clear_history))
        .with_state(agent);
    let addr = serve(app).await;
    format!("http://{}", addr)
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind free port");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Config pointing at `agent_url` with fast retries.
pub fn test_config(agent_url: &str) -> Config {
    let mut config = Config::default();
    config.server.bind = "127.0.0.1".to_string();
    config.agent.url = agent_url.to_string();
    config.agent.clear_history_url = agent_url.to_string();
    config.agent.timeout_secs = 5;
    config.agent.retry_backoff_ms = 10;
    config
}

/// Bot server on a free port. Returns the base URL and the shared state.
pub async fn spawn_bot(config: Config, connector: Arc<dyn BotConnector>) -> (String, GatewayState) {
    spawn_bot_with_telemetry(config, connector, TelemetryHandle::noop()).await
}

pub async fn spawn_bot_with_telemetry(
    mut config: Config,
    connector: Arc<dyn BotConnector>,
    telemetry: TelemetryHandle,
) -> (String, GatewayState) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind free port");
    let addr = listener.local_addr().expect("local_addr");
    config.server.port = addr.port();
    let state = GatewayState::new(config, connector, telemetry);
    let app = router(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{}", addr), state)
}

/// Teams-style message activity from user `29:ada` (AAD `aad-ada`).
pub fn message(text: &str) -> Value {
    json!({
        "type": "message",
        "id": "act-1",
        "channelId": "msteams",
        "serviceUrl": "https://smba.trafficmanager.net/emea/",
        "from": { "id": "29:ada", "name": "Ada", "aadObjectId": "aad-ada" },
        "recipient": { "id": "28:relay-bot", "name": "Relay" },
        "conversation": { "id": "a:conv-1", "conversationType": "personal" },
        "locale": "en-US",
        "text": text
    })
}

pub fn invoke(name: &str) -> Value {
    let mut activity = message("");
    activity["type"] = json!("invoke");
    activity["name"] = json!(name);
    activity["value"] = json!({ "id": "exchange-1", "connectionName": "graph" });
    activity
}

pub async fn post_activity(base: &str, activity: &Value) -> reqwest::StatusCode {
    reqwest::Client::new()
        .post(format!("{}/api/messages", base))
        .json(activity)
        .send()
        .await
        .expect("post activity")
        .status()
}
