//! Outbound side of the messaging platform: deliver activities to a conversation.

use crate::channels::Activity;
use crate::conversation::ConversationReference;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("connector request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("connector api error: {0}")]
    Api(String),
    #[error("connector auth failed: {0}")]
    Auth(String),
    #[error("invalid service url: {0}")]
    ServiceUrl(String),
    #[error("{0} is not supported by this connector")]
    Unsupported(&'static str),
}

/// Sends activities into conversations (replies, typing indicators, proactive messages).
#[async_trait]
pub trait BotConnector: Send + Sync {
    /// Deliver an already-addressed activity to the conversation of `reference`.
    async fn send_activity(
        &self,
        reference: &ConversationReference,
        activity: &Activity,
    ) -> Result<(), ConnectorError>;

    /// Sign the user out of an OAuth connection. Default returns `Unsupported`.
    async fn sign_out_user(
        &self,
        _reference: &ConversationReference,
        _connection_name: &str,
    ) -> Result<(), ConnectorError> {
        Err(ConnectorError::Unsupported("sign-out"))
    }
}
