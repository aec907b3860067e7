//! Proactive messages: reopen a stored conversation and deliver text without an inbound turn.

use crate::channels::{Activity, BotConnector, ConnectorError};
use crate::conversation::ConversationReferenceStore;
use crate::telemetry::TelemetryHandle;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// No reference for the key. `known` lists the keys that are stored.
    #[error("no conversation reference for user {user_id}")]
    UnknownUser { user_id: String, known: Vec<String> },
    #[error("failed to deliver proactive message: {0}")]
    Delivery(#[from] ConnectorError),
}

pub struct ProactiveNotifier {
    references: Arc<ConversationReferenceStore>,
    connector: Arc<dyn BotConnector>,
    telemetry: TelemetryHandle,
}

impl ProactiveNotifier {
    pub fn new(
        references: Arc<ConversationReferenceStore>,
        connector: Arc<dyn BotConnector>,
        telemetry: TelemetryHandle,
    ) -> Self {
        Self {
            references,
            connector,
            telemetry,
        }
    }

    /// Deliver `message` to the conversation last seen for `user_id` (user id or AAD object id).
    /// Single attempt.
    pub async fn notify(&self, user_id: &str, message: &str) -> Result<(), NotifyError> {
        let mut op = self.telemetry.start_operation("notify.send");
        let Some(reference) = self.references.get(user_id).await else {
            let known: Vec<String> = self.references.list_keys().await.into_iter().collect();
            log::info!(
                "notify: no conversation reference for {} ({} known)",
                user_id,
                known.len()
            );
            op.stop(false, Some("unknown user"));
            return Err(NotifyError::UnknownUser {
                user_id: user_id.to_string(),
                known,
            });
        };
        op.set_context(Some(user_id), Some(&reference.conversation.id));

        let activity = reference.apply(Activity::message(message));
        match self.connector.send_activity(&reference, &activity).await {
            Ok(()) => {
                op.stop(true, None);
                self.telemetry
                    .track_event("notify.sent", &[("user", user_id)]);
                Ok(())
            }
            Err(e) => {
                let detail = e.to_string();
                log::warn!("notify: delivery to {} failed: {}", user_id, detail);
                op.stop(false, Some(&detail));
                Err(NotifyError::Delivery(e))
            }
        }
    }
}
