//! Per-turn activity handling.
//!
//! Message flow: record the conversation reference, normalize the text, then route to
//! history reset (`/cls`, `/new`), the SSO dialog, or the agent. Agent replies go through
//! [`crate::normalize`] before they are sent. Any error that escapes a turn is reported to
//! telemetry and echoed to the user; it never takes the server down.

use crate::agent::{self, AgentClient};
use crate::bot::context::TurnContext;
use crate::bot::sso::{SsoDialog, SsoError, STATUS_NOT_IMPLEMENTED, STATUS_OK, STATUS_PRECONDITION_FAILED};
use crate::bot::text::{self, Command, SsoCommand};
use crate::channels::{Activity, ActivityType, BotConnector, ConnectorError};
use crate::conversation::ConversationReferenceStore;
use crate::normalize::normalize;
use crate::telemetry::TelemetryHandle;
use std::sync::Arc;

pub const HISTORY_CLEARED: &str = "Conversation history cleared.";
pub const SSO_UNAVAILABLE: &str = "Single sign-on is not available for this bot.";
pub const EMPTY_MESSAGE: &str = "Please send me a text message.";
/// Sent instead of a blank agent answer; channels reject empty messages.
pub const EMPTY_REPLY: &str = "The assistant returned an empty response. Please try rephrasing your question.";
pub const UNHANDLED_ERROR_PREFIX: &str = "The bot encountered an unhandled error";

/// Status for activities that cannot be answered (no sender, conversation or service URL).
pub const STATUS_BAD_REQUEST: u16 = 400;

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    #[error(transparent)]
    Sso(#[from] SsoError),
}

/// Handles inbound activities for the bot.
pub struct BotHandler {
    connector: Arc<dyn BotConnector>,
    agent: AgentClient,
    references: Arc<ConversationReferenceStore>,
    sso: Option<Arc<dyn SsoDialog>>,
    telemetry: TelemetryHandle,
    welcome_message: Option<String>,
}

impl BotHandler {
    pub fn new(
        connector: Arc<dyn BotConnector>,
        agent: AgentClient,
        references: Arc<ConversationReferenceStore>,
        telemetry: TelemetryHandle,
    ) -> Self {
        Self {
            connector,
            agent,
            references,
            sso: None,
            telemetry,
            welcome_message: None,
        }
    }

    pub fn with_sso(mut self, dialog: Arc<dyn SsoDialog>) -> Self {
        self.sso = Some(dialog);
        self
    }

    pub fn with_welcome_message(mut self, text: Option<String>) -> Self {
        self.welcome_message = text.filter(|t| !t.trim().is_empty());
        self
    }

    /// Run one turn. Returns the HTTP status for the channel.
    pub async fn on_turn(&self, activity: Activity) -> u16 {
        let mut op = self.telemetry.start_operation("bot.turn");
        op.set_context(activity.user_id(), activity.conversation_id());
        let activity_type = activity.typ;
        let Some(turn) = TurnContext::new(activity, self.connector.clone()) else {
            log::debug!("turn: {:?} activity without sender, conversation or service url", activity_type);
            op.stop(false, Some("activity cannot be addressed"));
            return STATUS_BAD_REQUEST;
        };
        self.references.insert(turn.reference().clone()).await;

        match self.dispatch(&turn).await {
            Ok(status) => {
                op.stop(true, None);
                status
            }
            Err(e) => {
                let detail = e.to_string();
                log::error!("turn: unhandled error: {}", detail);
                let activity_type = format!("{:?}", activity_type);
                self.telemetry
                    .track_exception(&detail, &[("activityType", activity_type.as_str())]);
                let notice = format!("{}: {}", UNHANDLED_ERROR_PREFIX, detail);
                if let Err(send_err) = turn.send_text(&notice).await {
                    log::warn!("turn: could not report error to user: {}", send_err);
                }
                op.stop(false, Some(&detail));
                STATUS_OK
            }
        }
    }

    async fn dispatch(&self, turn: &TurnContext) -> Result<u16, TurnError> {
        match turn.activity().typ {
            ActivityType::Message => {
                self.on_message(turn).await?;
                Ok(STATUS_OK)
            }
            ActivityType::ConversationUpdate => {
                self.on_members_added(turn).await?;
                Ok(STATUS_OK)
            }
            ActivityType::Invoke => self.on_invoke(turn).await,
            other => {
                log::debug!("turn: ignoring {:?} activity", other);
                Ok(STATUS_OK)
            }
        }
    }

    fn branch(&self, name: &str) {
        self.telemetry.track_event("message.branch", &[("branch", name)]);
    }

    async fn on_message(&self, turn: &TurnContext) -> Result<(), TurnError> {
        let activity = turn.activity();
        self.telemetry.track_event(
            "message.received",
            &[("channel", activity.channel_id.as_deref().unwrap_or(""))],
        );
        let normalized = text::command_text(activity.text());
        if normalized.is_empty() {
            self.branch("empty");
            turn.send_text(EMPTY_MESSAGE).await?;
            return Ok(());
        }
        match text::parse_command(&normalized) {
            Command::ClearHistory => self.clear_history(turn).await,
            Command::Sso(command) => self.run_sso(turn, command).await,
            Command::Chat => self.chat(turn).await,
        }
    }

    async fn clear_history(&self, turn: &TurnContext) -> Result<(), TurnError> {
        self.branch("clear_history");
        let session_id = turn.activity().session_id().unwrap_or_default();
        match self.agent.clear_history(session_id).await {
            Ok(()) => {
                self.references.clear().await;
                self.references.insert(turn.reference().clone()).await;
                self.telemetry
                    .track_event("history.cleared", &[("session", session_id)]);
                turn.send_text(HISTORY_CLEARED).await?;
            }
            Err(e) => {
                let detail = e.to_string();
                log::warn!("turn: clearing history for {} failed: {}", session_id, detail);
                self.telemetry
                    .track_event("history.clear_failed", &[("error", detail.as_str())]);
                turn.send_text(&format!("Couldn't clear the conversation history: {}", detail))
                    .await?;
            }
        }
        Ok(())
    }

    async fn run_sso(&self, turn: &TurnContext, command: SsoCommand) -> Result<(), TurnError> {
        self.branch("sso");
        match self.sso {
            Some(ref dialog) => dialog.run(turn, command).await?,
            None => {
                log::debug!("turn: sso command {} without sso configured", command.as_str());
                turn.send_text(SSO_UNAVAILABLE).await?;
            }
        }
        Ok(())
    }

    async fn chat(&self, turn: &TurnContext) -> Result<(), TurnError> {
        self.branch("agent");
        let activity = turn.activity();
        turn.send_typing().await;

        let session_id = activity.session_id().unwrap_or_default();
        let message = text::strip_mentions(activity.text());
        let mut call = self.telemetry.start_operation("agent.chat");
        call.set_context(activity.user_id(), activity.conversation_id());
        let traceparent = call.traceparent();

        let reply = match self.agent.try_chat(session_id, &message, Some(&traceparent)).await {
            Ok(raw) => {
                call.stop(true, None);
                let normalized = normalize(&raw);
                log::debug!(
                    "turn: agent reply for {} carried {} history item(s)",
                    session_id,
                    normalized.history.len()
                );
                if normalized.display.trim().is_empty() {
                    self.telemetry.track_event("agent.empty_reply", &[("session", session_id)]);
                    EMPTY_REPLY.to_string()
                } else {
                    normalized.display
                }
            }
            Err(e) => {
                let detail = e.to_string();
                log::warn!("turn: agent call for {} failed: {}", session_id, detail);
                call.stop(false, Some(&detail));
                self.telemetry
                    .track_event("agent.failure", &[("error", detail.as_str())]);
                agent::apology(&e)
            }
        };
        turn.send_text(&reply).await?;
        Ok(())
    }

    async fn on_members_added(&self, turn: &TurnContext) -> Result<(), TurnError> {
        let Some(ref welcome) = self.welcome_message else {
            return Ok(());
        };
        if turn.activity().members_added_except_bot().next().is_some() {
            turn.send_text(welcome).await?;
        }
        Ok(())
    }

    async fn on_invoke(&self, turn: &TurnContext) -> Result<u16, TurnError> {
        let name = turn.activity().name.as_deref().unwrap_or("");
        if !name.starts_with("signin/") {
            log::debug!("turn: unhandled invoke {}", name);
            return Ok(STATUS_NOT_IMPLEMENTED);
        }
        match self.sso {
            Some(ref dialog) => Ok(dialog.on_invoke(turn).await?),
            None => {
                log::debug!("turn: {} invoke without sso configured", name);
                Ok(STATUS_PRECONDITION_FAILED)
            }
        }
    }
}
