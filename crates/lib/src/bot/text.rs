//! Message text cleanup and command routing.

use regex::Regex;
use std::sync::LazyLock;

static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<at[^>]*>.*?</at>").expect("valid mention regex"));

/// Commands that reset the agent-side history.
const CLEAR_HISTORY_COMMANDS: [&str; 2] = ["/cls", "/new"];

/// SSO commands handled by the sign-in dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsoCommand {
    Login,
    Show,
    Logout,
}

impl SsoCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            SsoCommand::Login => "login",
            SsoCommand::Show => "show",
            SsoCommand::Logout => "logout",
        }
    }
}

/// Route for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ClearHistory,
    Sso(SsoCommand),
    Chat,
}

/// Remove `<at>...</at>` mentions (Teams adds one for the bot in group chats) and trim.
pub fn strip_mentions(text: &str) -> String {
    MENTION.replace_all(text, "").trim().to_string()
}

/// Mention-free, lowercase, single-line form used for command matching.
pub fn command_text(text: &str) -> String {
    strip_mentions(text)
        .to_lowercase()
        .replace(['\r', '\n'], "")
        .trim()
        .to_string()
}

/// Route normalized text (see [`command_text`]).
pub fn parse_command(normalized: &str) -> Command {
    if CLEAR_HISTORY_COMMANDS.contains(&normalized) {
        return Command::ClearHistory;
    }
    match normalized {
        "login" => Command::Sso(SsoCommand::Login),
        "show" => Command::Sso(SsoCommand::Show),
        "logout" | "signout" => Command::Sso(SsoCommand::Logout),
        _ => Command::Chat,
    }
}
