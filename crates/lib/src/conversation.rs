//! Conversation references and the store used for proactive messages.
//!
//! Every inbound activity refreshes the reference for its sender, keyed by platform
//! user id. When the activity carries a directory (AAD) object id that id is kept as an
//! alias pointing at the user id, so callers that only know one id scheme can still
//! reach the user. Aliases never hold a copy of the reference.

use crate::channels::{Activity, ChannelAccount, ConversationAccount};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

/// Where and how to deliver a future message to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
    pub user: ChannelAccount,
    pub bot: ChannelAccount,
    pub conversation: ConversationAccount,
    pub channel_id: String,
    pub service_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl ConversationReference {
    /// Capture the reference of an inbound activity. None when the activity lacks a
    /// sender, conversation or service URL.
    pub fn from_activity(activity: &Activity) -> Option<Self> {
        activity.user_id()?;
        activity.conversation_id()?;
        let service_url = activity
            .service_url
            .as_deref()
            .filter(|s| !s.trim().is_empty())?;
        Some(Self {
            activity_id: activity.id.clone(),
            user: activity.from.clone().unwrap_or_default(),
            bot: activity.recipient.clone().unwrap_or_default(),
            conversation: activity.conversation.clone().unwrap_or_default(),
            channel_id: activity.channel_id.clone().unwrap_or_default(),
            service_url: service_url.to_string(),
            locale: activity.locale.clone(),
        })
    }

    /// Address an outbound activity to this conversation: from the bot, to the user,
    /// replying to the captured activity.
    pub fn apply(&self, mut activity: Activity) -> Activity {
        activity.from = Some(self.bot.clone());
        activity.recipient = Some(self.user.clone());
        activity.conversation = Some(self.conversation.clone());
        activity.channel_id = Some(self.channel_id.clone());
        activity.service_url = Some(self.service_url.clone());
        if activity.locale.is_none() {
            activity.locale = self.locale.clone();
        }
        if activity.reply_to_id.is_none() {
            activity.reply_to_id = self.activity_id.clone();
        }
        if activity.timestamp.is_none() {
            activity.timestamp = Some(chrono::Utc::now().to_rfc3339());
        }
        activity
    }
}

#[derive(Default)]
struct StoreInner {
    /// user id -> latest reference
    by_user: HashMap<String, ConversationReference>,
    /// directory object id -> user id
    aliases: HashMap<String, String>,
}

/// In-memory map from user id (or alias) to the latest conversation reference.
/// At most one reference per user; last write wins.
#[derive(Default)]
pub struct ConversationReferenceStore {
    inner: RwLock<StoreInner>,
}

impl ConversationReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture and store the reference of an inbound activity. Returns the primary key
    /// (user id) when something was stored.
    pub async fn record(&self, activity: &Activity) -> Option<String> {
        let reference = ConversationReference::from_activity(activity)?;
        Some(self.insert(reference).await)
    }

    /// Store a reference under its user id and register the user's AAD object id as alias.
    pub async fn insert(&self, reference: ConversationReference) -> String {
        let user_id = reference.user.id.clone();
        let alias = reference
            .user
            .aad_object_id
            .clone()
            .filter(|a| !a.is_empty() && *a != user_id);
        let mut g = self.inner.write().await;
        if let Some(alias) = alias {
            g.aliases.insert(alias, user_id.clone());
        }
        g.by_user.insert(user_id.clone(), reference);
        user_id
    }

    /// Look up by user id, then by alias.
    pub async fn get(&self, key: &str) -> Option<ConversationReference> {
        let g = self.inner.read().await;
        g.by_user
            .get(key)
            .or_else(|| g.aliases.get(key).and_then(|user| g.by_user.get(user)))
            .cloned()
    }

    /// All keys that resolve to a reference (user ids and aliases), sorted.
    pub async fn list_keys(&self) -> BTreeSet<String> {
        let g = self.inner.read().await;
        g.by_user
            .keys()
            .cloned()
            .chain(
                g.aliases
                    .iter()
                    .filter(|(_, user)| g.by_user.contains_key(*user))
                    .map(|(alias, _)| alias.clone()),
            )
            .collect()
    }

    /// Drop every reference and alias.
    pub async fn clear(&self) {
        let mut g = self.inner.write().await;
        g.by_user.clear();
        g.aliases.clear();
    }

    /// Number of users with a stored reference.
    pub async fn len(&self) -> usize {
        self.inner.read().await.by_user.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
