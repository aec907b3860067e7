//! Teams agent relay bot: receives Bot Framework activities, relays chat to an external
//! agent service, normalizes its replies, and delivers proactive messages to users the
//! bot has seen before.

pub mod agent;
pub mod bot;
pub mod channels;
pub mod config;
pub mod conversation;
pub mod gateway;
pub mod init;
pub mod normalize;
pub mod telemetry;
