//! Messaging platform boundary (Bot Framework).
//!
//! Activity payloads, the connector trait used for every outbound send, and the
//! REST connector that talks to the channel service.

mod activity;
mod bot_framework;
mod connector;

pub use activity::{Activity, ActivityType, Attachment, ChannelAccount, ConversationAccount};
pub use bot_framework::{activities_url, BotFrameworkConnector};
pub use connector::{BotConnector, ConnectorError};
