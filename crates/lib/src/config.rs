//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.relay-bot/config.json`) and environment.
//! Environment variables win over file values so a container can run without a config file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Bot registration (app id / password) and conversational defaults.
    #[serde(default)]
    pub bot: BotConfig,

    /// External agent service endpoints and call policy.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Single sign-on. SSO commands are answered with "not available" when no connection is set.
    #[serde(default)]
    pub sso: SsoConfig,
}

/// Server bind, port and static auth pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port for `/api/messages` and `/api/notify` (default 3978). Overridden by PORT env.
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_server_bind")]
    pub bind: String,

    /// Directory holding `auth-start.html` and `auth-end.html`. When unset those routes return 404.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

fn default_server_port() -> u16 {
    3978
}

fn default_server_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            bind: default_server_bind(),
            static_dir: None,
        }
    }
}

/// Bot Framework registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    /// Microsoft app id. Overridden by BOT_ID env.
    pub app_id: Option<String>,
    /// Microsoft app password. Overridden by BOT_PASSWORD env.
    pub app_password: Option<String>,
    /// Tenant used for the client-credentials token (default "botframework.com"). Overridden by BOT_TENANT_ID env.
    pub tenant_id: Option<String>,
    /// Sent when a user is added to a conversation with the bot. Nothing is sent when unset.
    pub welcome_message: Option<String>,
}

/// Agent service endpoints. Base URLs; `/agent_chat` and `/clear_history` are appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Base URL of the chat endpoint (default http://localhost:8989). Overridden by AGENT_URL env.
    #[serde(default = "default_agent_url")]
    pub url: String,

    /// Base URL of the clear-history endpoint (default http://localhost:8989). Overridden by CLEAR_HISTORY_URL env.
    #[serde(default = "default_agent_url")]
    pub clear_history_url: String,

    /// Deadline for one agent request, in seconds.
    #[serde(default = "default_agent_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra attempts after a transport error or 5xx. 4xx is never retried.
    #[serde(default = "default_agent_max_retries")]
    pub max_retries: u32,

    /// Linear backoff step between attempts, in milliseconds.
    #[serde(default = "default_agent_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_agent_url() -> String {
    "http://localhost:8989".to_string()
}

fn default_agent_timeout_secs() -> u64 {
    60
}

fn default_agent_max_retries() -> u32 {
    1
}

fn default_agent_retry_backoff_ms() -> u64 {
    500
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            url: default_agent_url(),
            clear_history_url: default_agent_url(),
            timeout_secs: default_agent_timeout_secs(),
            max_retries: default_agent_max_retries(),
            retry_backoff_ms: default_agent_retry_backoff_ms(),
        }
    }
}

impl AgentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// SSO (OAuth connection configured on the bot registration).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsoConfig {
    /// OAuth connection name. Overridden by SSO_CONNECTION_NAME env.
    pub connection_name: Option<String>,
    /// Bot Framework token service (default https://token.botframework.com).
    pub token_service_url: Option<String>,
}

/// App id, password and tenant for authenticating outbound connector calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotCredentials {
    pub app_id: String,
    pub app_password: String,
    pub tenant_id: String,
}

const DEFAULT_BOT_TENANT: &str = "botframework.com";
const DEFAULT_TOKEN_SERVICE_URL: &str = "https://token.botframework.com";

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve the agent chat base URL: env AGENT_URL overrides config.
pub fn resolve_agent_url(config: &Config) -> String {
    env_non_empty("AGENT_URL").unwrap_or_else(|| config.agent.url.trim().to_string())
}

/// Resolve the clear-history base URL: env CLEAR_HISTORY_URL overrides config.
pub fn resolve_clear_history_url(config: &Config) -> String {
    env_non_empty("CLEAR_HISTORY_URL")
        .unwrap_or_else(|| config.agent.clear_history_url.trim().to_string())
}

/// Resolve bot credentials from env (BOT_ID, BOT_PASSWORD, BOT_TENANT_ID) or config.
/// Returns None unless both app id and password are set (local emulator mode).
pub fn resolve_bot_credentials(config: &Config) -> Option<BotCredentials> {
    let app_id = env_non_empty("BOT_ID").or_else(|| non_empty(config.bot.app_id.as_ref()))?;
    let app_password =
        env_non_empty("BOT_PASSWORD").or_else(|| non_empty(config.bot.app_password.as_ref()))?;
    let tenant_id = env_non_empty("BOT_TENANT_ID")
        .or_else(|| non_empty(config.bot.tenant_id.as_ref()))
        .unwrap_or_else(|| DEFAULT_BOT_TENANT.to_string());
    Some(BotCredentials {
        app_id,
        app_password,
        tenant_id,
    })
}

/// Resolve the SSO connection name: env SSO_CONNECTION_NAME overrides config.
pub fn resolve_sso_connection(config: &Config) -> Option<String> {
    env_non_empty("SSO_CONNECTION_NAME").or_else(|| non_empty(config.sso.connection_name.as_ref()))
}

/// Token service base URL for sign-out calls.
pub fn resolve_token_service_url(config: &Config) -> String {
    non_empty(config.sso.token_service_url.as_ref())
        .unwrap_or_else(|| DEFAULT_TOKEN_SERVICE_URL.to_string())
}

/// Resolve the listen port: env PORT overrides config.
pub fn resolve_port(config: &Config) -> u16 {
    env_non_empty("PORT")
        .and_then(|p| p.parse().ok())
        .unwrap_or(config.server.port)
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".relay-bot").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, RELAY_CONFIG_PATH, or the default path. Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_local_agent_and_bot_port() {
        let config = Config::default();
        assert_eq!(config.server.port, 3978);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.agent.url, "http://localhost:8989");
        assert_eq!(config.agent.clear_history_url, "http://localhost:8989");
        assert_eq!(config.agent.timeout(), Duration::from_secs(60));
        assert_eq!(config.agent.max_retries, 1);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"agent":{"url":"http://agent:9000"},"sso":{"connectionName":"graph"}}"#)
                .unwrap();
        assert_eq!(config.agent.url, "http://agent:9000");
        assert_eq!(config.agent.clear_history_url, "http://localhost:8989");
        assert_eq!(config.agent.retry_backoff_ms, 500);
        assert_eq!(config.sso.connection_name.as_deref(), Some("graph"));
        assert_eq!(config.server.port, 3978);
    }

    #[test]
    fn credentials_require_id_and_password() {
        let mut config = Config::default();
        config.bot.app_id = Some("app".to_string());
        if std::env::var("BOT_PASSWORD").is_err() {
            assert!(resolve_bot_credentials(&config).is_none());
        }
        config.bot.app_password = Some(" secret ".to_string());
        if std::env::var("BOT_ID").is_err() && std::env::var("BOT_TENANT_ID").is_err() {
            let creds = resolve_bot_credentials(&config).unwrap();
            assert_eq!(creds.app_password, "secret");
            assert_eq!(creds.tenant_id, "botframework.com");
        }
    }

    #[test]
    fn zero_timeout_is_clamped() {
        let agent = AgentConfig {
            timeout_secs: 0,
            ..AgentConfig::default()
        };
        assert_eq!(agent.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn loopback_detection() {
        assert!(is_loopback_bind("127.0.0.1"));
        assert!(is_loopback_bind(" localhost "));
        assert!(!is_loopback_bind("0.0.0.0"));
    }
}
