//! Client for the external agent service.
//!
//! `POST {url}/agent_chat` with `{session_id, message}` answers one user turn;
//! `POST {clear_history_url}/clear_history` with `{session_id}` resets the agent-side
//! history. Every request has an explicit deadline. Transport errors and 5xx responses
//! are retried with linear backoff up to the configured count; 4xx is returned at once.

use crate::config::{self, Config};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://localhost:8989";
const CHAT_PATH: &str = "/agent_chat";
const CLEAR_HISTORY_PATH: &str = "/clear_history";
/// Error bodies longer than this are cut before they reach logs or the user.
const MAX_ERROR_BODY: usize = 300;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("agent returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl AgentError {
    fn is_retryable(&self) -> bool {
        match self {
            AgentError::Request(_) => true,
            AgentError::Status { status, .. } => *status >= 500,
        }
    }
}

/// How failed requests are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Delay before retry n is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    session_id: &'a str,
    message: &'a str,
}

#[derive(Serialize)]
struct ClearHistoryRequest<'a> {
    session_id: &'a str,
}

/// Client for the agent HTTP API.
#[derive(Clone)]
pub struct AgentClient {
    chat_url: String,
    clear_history_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl AgentClient {
    /// Client for the given base URLs (default http://localhost:8989) with a 60s deadline.
    pub fn new(base_url: Option<String>, clear_history_base_url: Option<String>) -> Self {
        let base = |u: Option<String>| {
            u.map(|u| u.trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
        };
        Self {
            chat_url: format!("{}{}", base(base_url), CHAT_PATH),
            clear_history_url: format!("{}{}", base(clear_history_base_url), CLEAR_HISTORY_PATH),
            client: build_client(Duration::from_secs(60)),
            retry: RetryPolicy::default(),
        }
    }

    /// Client from config, honoring AGENT_URL / CLEAR_HISTORY_URL and the timeout/retry settings.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Some(config::resolve_agent_url(config)),
            Some(config::resolve_clear_history_url(config)),
        )
        .with_timeout(config.agent.timeout())
        .with_retry(RetryPolicy {
            max_retries: config.agent.max_retries,
            backoff: config.agent.retry_backoff(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }

    /// Send one user message. Never fails: errors come back as an apology for the user.
    pub async fn chat(&self, session_id: &str, message: &str, traceparent: Option<&str>) -> String {
        match self.try_chat(session_id, message, traceparent).await {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("agent: chat failed for session {}: {}", session_id, e);
                apology(&e)
            }
        }
    }

    /// Send one user message and return the agent's reply text.
    pub async fn try_chat(
        &self,
        session_id: &str,
        message: &str,
        traceparent: Option<&str>,
    ) -> Result<String, AgentError> {
        let body = ChatRequest {
            session_id,
            message,
        };
        let text = self.post_with_retry(&self.chat_url, &body, traceparent).await?;
        Ok(extract_reply(&text))
    }

    /// Ask the agent to forget the history of `session_id`.
    pub async fn clear_history(&self, session_id: &str) -> Result<(), AgentError> {
        let body = ClearHistoryRequest { session_id };
        self.post_with_retry(&self.clear_history_url, &body, None)
            .await
            .map(|_| ())
    }

    async fn post_with_retry<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        traceparent: Option<&str>,
    ) -> Result<String, AgentError> {
        let mut attempt: u32 = 0;
        loop {
            match self.post_once(url, body, traceparent).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.backoff * attempt;
                    log::debug!(
                        "agent: {} failed ({}), retry {}/{} in {:?}",
                        url,
                        e,
                        attempt,
                        self.retry.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn post_once<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        traceparent: Option<&str>,
    ) -> Result<String, AgentError> {
        let mut req = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(body);
        if let Some(tp) = traceparent {
            req = req.header("traceparent", tp);
            if let Some(id) = request_id(tp) {
                req = req.header("request-id", id);
            }
        }
        let res = req.send().await?;
        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(AgentError::Status {
                status: status.as_u16(),
                body: truncate(&text, MAX_ERROR_BODY),
            });
        }
        Ok(text)
    }
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            log::warn!("agent: http client with timeout unavailable ({}), using defaults", e);
            reqwest::Client::new()
        })
}

/// Legacy `request-id` (`|{trace-id}.{span-id}.`) for receivers that predate `traceparent`.
fn request_id(traceparent: &str) -> Option<String> {
    let mut parts = traceparent.split('-');
    let (_version, trace_id, span_id) = (parts.next()?, parts.next()?, parts.next()?);
    if trace_id.is_empty() || span_id.is_empty() {
        return None;
    }
    Some(format!("|{}.{}.", trace_id, span_id))
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => format!("{}…", &s[..i]),
        None => s.to_string(),
    }
}

/// User-facing text for a failed agent call.
pub fn apology(err: &AgentError) -> String {
    format!(
        "Sorry, I couldn't reach the assistant right now ({}). Please try again.",
        err
    )
}

/// Reply text from a successful response body: the `response` or `message` field of an
/// object (null and blank strings count as absent), the value of a JSON string, otherwise the body as-is. Non-string fields are
/// returned as JSON text so the normalizer can interpret them.
pub fn extract_reply(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(obj)) => reply_field(&obj, "response")
            .or_else(|| reply_field(&obj, "message"))
            .or_else(|| obj.get("response").filter(|v| v.is_string()))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| Value::Object(obj.clone()).to_string()),
        Ok(Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(_) => body.to_string(),
    }
}

fn reply_field<'a>(obj: &'a serde_json::Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    })
}
