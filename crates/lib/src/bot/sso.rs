//! Single sign-on dialog.
//!
//! The token exchange itself belongs to the channel and the Bot Framework token
//! service. The bot only starts sign-in (OAuth card), signs users out, and answers
//! `signin/*` invokes.

use crate::bot::context::TurnContext;
use crate::bot::text::SsoCommand;
use crate::channels::{Activity, Attachment, ConnectorError};
use async_trait::async_trait;
use serde_json::json;

const OAUTH_CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.oauth";
const INVOKE_TOKEN_EXCHANGE: &str = "signin/tokenExchange";
const INVOKE_VERIFY_STATE: &str = "signin/verifyState";

/// Status returned for a token exchange the bot does not perform. The channel treats
/// it as "fall back to the sign-in card", not as a failure.
pub const STATUS_PRECONDITION_FAILED: u16 = 412;
pub const STATUS_OK: u16 = 200;
pub const STATUS_NOT_IMPLEMENTED: u16 = 501;

#[derive(Debug, thiserror::Error)]
pub enum SsoError {
    #[error("sso delivery failed: {0}")]
    Connector(#[from] ConnectorError),
}

/// Sign-in dialog run for SSO commands and `signin/*` invokes.
#[async_trait]
pub trait SsoDialog: Send + Sync {
    async fn run(&self, turn: &TurnContext, command: SsoCommand) -> Result<(), SsoError>;

    /// Handle an invoke activity; returns the HTTP status for the channel.
    async fn on_invoke(&self, turn: &TurnContext) -> Result<u16, SsoError>;
}

/// Dialog backed by an OAuth connection on the bot registration.
pub struct OAuthCardDialog {
    connection_name: String,
}

impl OAuthCardDialog {
    pub fn new(connection_name: impl Into<String>) -> Self {
        Self {
            connection_name: connection_name.into(),
        }
    }

    fn sign_in_card(&self) -> Attachment {
        Attachment {
            content_type: OAUTH_CARD_CONTENT_TYPE.to_string(),
            content: json!({
                "text": "Please sign in to continue.",
                "connectionName": self.connection_name,
                "buttons": [{ "type": "signin", "title": "Sign in" }],
            }),
            name: None,
        }
    }
}

#[async_trait]
impl SsoDialog for OAuthCardDialog {
    async fn run(&self, turn: &TurnContext, command: SsoCommand) -> Result<(), SsoError> {
        match command {
            SsoCommand::Login | SsoCommand::Show => {
                log::debug!("sso: sending sign-in card for {}", command.as_str());
                turn.send(Activity::default().with_attachment(self.sign_in_card()))
                    .await?;
            }
            SsoCommand::Logout => {
                turn.connector()
                    .sign_out_user(turn.reference(), &self.connection_name)
                    .await?;
                turn.send_text("You have been signed out.").await?;
            }
        }
        Ok(())
    }

    async fn on_invoke(&self, turn: &TurnContext) -> Result<u16, SsoError> {
        match turn.activity().name.as_deref() {
            Some(INVOKE_TOKEN_EXCHANGE) => {
                log::debug!("sso: token exchange requested, deferring to sign-in card");
                Ok(STATUS_PRECONDITION_FAILED)
            }
            Some(INVOKE_VERIFY_STATE) => {
                turn.send_text("You're signed in.").await?;
                Ok(STATUS_OK)
            }
            _ => Ok(STATUS_NOT_IMPLEMENTED),
        }
    }
}
