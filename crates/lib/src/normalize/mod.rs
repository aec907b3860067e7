//! Agent reply normalization.
//!
//! The agent answers with whatever its last step produced: plain text, a single JSON
//! object (`{"response": ...}`, a tool call, ...), or a JSON array of role-tagged
//! messages. [`normalize`] turns any of these into one display string for the user and
//! a structured history. It is pure and never fails; anything it cannot interpret is
//! shown as the raw text.

mod legacy;
mod tool_results;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Shown when the agent returned messages but none of them is an assistant answer.
pub const PROCESSED_PLACEHOLDER: &str = "Request processed successfully.";

/// Keys scanned, in order, when an object has none of the well-known reply shapes.
const CONTENT_KEYS: [&str; 6] = ["content", "text", "message", "response", "result", "data"];

/// Author of a history item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            "tool" => Some(Role::Tool),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

/// One message of the conversation as reported by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHistoryItem {
    pub role: Role,
    pub content: String,
}

impl MessageHistoryItem {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Result of [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedReply {
    /// Text to send to the user.
    pub display: String,
    /// Structured messages recovered from the reply.
    pub history: Vec<MessageHistoryItem>,
}

impl NormalizedReply {
    fn plain(raw: &str) -> Self {
        Self {
            display: raw.to_string(),
            history: vec![MessageHistoryItem::assistant(raw)],
        }
    }
}

/// Normalize a raw agent reply into display text and history.
pub fn normalize(raw: &str) -> NormalizedReply {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return NormalizedReply::plain(raw),
    };
    let reply = match parsed {
        Value::Array(entries) => return from_array(&entries),
        Value::Object(obj) => from_object(&obj),
        Value::String(s) => NormalizedReply::plain(&s),
        other => NormalizedReply::plain(&other.to_string()),
    };
    if reply.display.trim().is_empty() {
        NormalizedReply {
            display: raw.to_string(),
            history: reply.history,
        }
    } else {
        reply
    }
}

/// Text of a `content`-like value: strings as-is, null/absent as empty, anything else as JSON.
fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn non_empty_str(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn from_array(entries: &[Value]) -> NormalizedReply {
    let history: Vec<MessageHistoryItem> = entries
        .iter()
        .filter_map(|entry| {
            let obj = entry.as_object()?;
            let role = obj.get("role").and_then(Value::as_str).and_then(Role::parse)?;
            if role == Role::System {
                return None;
            }
            Some(MessageHistoryItem::new(role, value_text(obj.get("content"))))
        })
        .collect();

    let last_answer = history
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant && !m.content.trim().is_empty());
    let display = match last_answer {
        Some(m) => m.content.clone(),
        None if !history.is_empty() => tool_results::render_history(&history)
            .unwrap_or_else(|| PROCESSED_PLACEHOLDER.to_string()),
        None => format!("Received {} message(s) from the agent.", entries.len()),
    };
    NormalizedReply { display, history }
}

fn from_object(obj: &Map<String, Value>) -> NormalizedReply {
    if let Some((role, content)) = role_content(obj) {
        return NormalizedReply {
            display: content.clone(),
            history: vec![MessageHistoryItem::new(role, content)],
        };
    }
    let display = non_empty_str(obj, "response")
        .or_else(|| non_empty_str(obj, "message"))
        .or_else(|| describe_tool_calls(obj))
        .or_else(|| CONTENT_KEYS.iter().find_map(|k| non_empty_str(obj, k)))
        .unwrap_or_else(|| {
            serde_json::to_string_pretty(obj).unwrap_or_else(|_| Value::Object(obj.clone()).to_string())
        });
    NormalizedReply {
        history: vec![MessageHistoryItem::assistant(display.as_str())],
        display,
    }
}

/// `{"role": ..., "content": ...}` with non-empty content. Unknown roles count as assistant.
fn role_content(obj: &Map<String, Value>) -> Option<(Role, String)> {
    let role = obj.get("role").and_then(Value::as_str)?;
    let content = value_text(obj.get("content"));
    if content.trim().is_empty() {
        return None;
    }
    Some((Role::parse(role).unwrap_or(Role::Assistant), content))
}

/// Human-readable rendering of `tool_calls` / `function_call`.
fn describe_tool_calls(obj: &Map<String, Value>) -> Option<String> {
    let mut lines = Vec::new();
    if let Some(calls) = obj.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let function = call.get("function").unwrap_or(call);
            lines.push(describe_call(function));
        }
    }
    if let Some(function) = obj.get("function_call").filter(|v| v.is_object()) {
        lines.push(describe_call(function));
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn describe_call(function: &Value) -> String {
    let name = function
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let args = match function.get("arguments") {
        None | Some(Value::Null) => "{}".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    format!("Executed tool `{}` with arguments {}", name, args)
}
