//! Bot logic: per-turn handling, SSO dialog and proactive notifications.

mod context;
mod handler;
mod notify;
mod sso;
mod text;

pub use context::TurnContext;
pub use handler::{
    BotHandler, TurnError, EMPTY_MESSAGE, EMPTY_REPLY, HISTORY_CLEARED, SSO_UNAVAILABLE,
    STATUS_BAD_REQUEST, UNHANDLED_ERROR_PREFIX,
};
pub use notify::{NotifyError, ProactiveNotifier};
pub use sso::{
    OAuthCardDialog, SsoDialog, SsoError, STATUS_NOT_IMPLEMENTED, STATUS_OK,
    STATUS_PRECONDITION_FAILED,
};
pub use text::{command_text, parse_command, strip_mentions, Command, SsoCommand};
