//! Bot Framework connector: POST activities to `{serviceUrl}/v3/conversations/{id}/activities`.
//!
//! Outbound calls carry a bearer token from the client-credentials flow when an app id
//! and password are configured; without credentials requests go out unauthenticated,
//! which is what the local emulator expects.

use crate::channels::connector::{BotConnector, ConnectorError};
use crate::channels::Activity;
use crate::config::BotCredentials;
use crate::conversation::ConversationReference;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const LOGIN_BASE: &str = "https://login.microsoftonline.com";
const TOKEN_SCOPE: &str = "https://api.botframework.com/.default";
const DEFAULT_TOKEN_SERVICE_URL: &str = "https://token.botframework.com";
/// Tokens are refreshed this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Connector for Bot Framework channels (Teams, emulator).
pub struct BotFrameworkConnector {
    credentials: Option<BotCredentials>,
    login_base: String,
    token_service_url: String,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl BotFrameworkConnector {
    pub fn new(credentials: Option<BotCredentials>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("bot connector: http client with timeout unavailable ({}), using defaults", e);
                reqwest::Client::new()
            });
        Self {
            credentials,
            login_base: LOGIN_BASE.to_string(),
            token_service_url: DEFAULT_TOKEN_SERVICE_URL.to_string(),
            client,
            token: Mutex::new(None),
        }
    }

    /// Override the identity endpoint (tests, sovereign clouds).
    pub fn with_login_base(mut self, base: impl Into<String>) -> Self {
        self.login_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_token_service_url(mut self, url: impl Into<String>) -> Self {
        self.token_service_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Bearer token for connector calls; None when running without credentials.
    async fn access_token(&self) -> Result<Option<String>, ConnectorError> {
        let Some(ref creds) = self.credentials else {
            return Ok(None);
        };
        let mut cached = self.token.lock().await;
        if let Some(ref t) = *cached {
            if Instant::now() < t.refresh_at {
                return Ok(Some(t.value.clone()));
            }
        }
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_base, creds.tenant_id
        );
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", creds.app_id.as_str()),
            ("client_secret", creds.app_password.as_str()),
            ("scope", TOKEN_SCOPE),
        ];
        let res = self.client.post(&url).form(&form).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ConnectorError::Auth(format!("{} {}", status, body)));
        }
        let token: TokenResponse = res.json().await?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS));
        log::debug!("bot connector: acquired token valid for {:?}", lifetime);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN),
        });
        Ok(Some(token.access_token))
    }

    fn authorized(
        &self,
        req: reqwest::RequestBuilder,
        token: Option<String>,
    ) -> reqwest::RequestBuilder {
        match token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }
}

/// `{serviceUrl}/v3/conversations/{conversationId}/activities`; `/` and other reserved path characters in the id are percent-encoded.
pub fn activities_url(service_url: &str, conversation_id: &str) -> Result<reqwest::Url, ConnectorError> {
    let mut url = reqwest::Url::parse(service_url)
        .map_err(|e| ConnectorError::ServiceUrl(format!("{}: {}", service_url, e)))?;
    url.path_segments_mut()
        .map_err(|_| ConnectorError::ServiceUrl(service_url.to_string()))?
        .pop_if_empty()
        .extend(["v3", "conversations", conversation_id, "activities"]);
    Ok(url)
}

#[async_trait]
impl BotConnector for BotFrameworkConnector {
    async fn send_activity(
        &self,
        reference: &ConversationReference,
        activity: &Activity,
    ) -> Result<(), ConnectorError> {
        let url = activities_url(&reference.service_url, &reference.conversation.id)?;
        let token = self.access_token().await?;
        let res = self
            .authorized(self.client.post(url), token)
            .json(activity)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ConnectorError::Api(format!("send activity failed: {} {}", status, body)));
        }
        Ok(())
    }

    async fn sign_out_user(
        &self,
        reference: &ConversationReference,
        connection_name: &str,
    ) -> Result<(), ConnectorError> {
        let url = format!("{}/api/usertoken/SignOut", self.token_service_url);
        let token = self.access_token().await?;
        let res = self
            .authorized(self.client.delete(&url), token)
            .query(&[
                ("userId", reference.user.id.as_str()),
                ("connectionName", connection_name),
                ("channelId", reference.channel_id.as_str()),
            ])
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ConnectorError::Api(format!("sign-out failed: {} {}", status, body)));
        }
        Ok(())
    }
}
