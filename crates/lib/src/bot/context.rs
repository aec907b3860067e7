//! Per-turn context: the inbound activity, its conversation reference and a way to reply.

use crate::channels::{Activity, BotConnector, ConnectorError};
use crate::conversation::ConversationReference;
use std::sync::Arc;

pub struct TurnContext {
    activity: Activity,
    reference: ConversationReference,
    connector: Arc<dyn BotConnector>,
}

impl TurnContext {
    /// None when the activity cannot be replied to (no sender, conversation or service URL).
    pub fn new(activity: Activity, connector: Arc<dyn BotConnector>) -> Option<Self> {
        let reference = ConversationReference::from_activity(&activity)?;
        Some(Self {
            activity,
            reference,
            connector,
        })
    }

    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    pub fn reference(&self) -> &ConversationReference {
        &self.reference
    }

    pub fn connector(&self) -> &Arc<dyn BotConnector> {
        &self.connector
    }

    /// Send an activity into this conversation.
    pub async fn send(&self, activity: Activity) -> Result<(), ConnectorError> {
        let outbound = self.reference.apply(activity);
        self.connector.send_activity(&self.reference, &outbound).await
    }

    pub async fn send_text(&self, text: &str) -> Result<(), ConnectorError> {
        self.send(Activity::message(text)).await
    }

    /// Best-effort typing indicator.
    pub async fn send_typing(&self) {
        if let Err(e) = self.send(Activity::typing()).await {
            log::debug!("turn: typing indicator failed: {}", e);
        }
    }
}
