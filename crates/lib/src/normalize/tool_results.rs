//! Rendering of tool results that carry directory user records.
//!
//! The people-search tool returns a JSON array of user objects (`display_name`,
//! `job_title`, `department`, `mail`). When the agent stops after the tool step
//! those records are the only useful output, so they are shown as a numbered list.

use super::legacy;
use super::{MessageHistoryItem, Role};
use serde_json::{Map, Value};
use std::fmt::Write;

/// A directory user as reported by a tool. Empty fields are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct UserRecord {
    pub display_name: Option<String>,
    pub job_title: Option<String>,
    pub department: Option<String>,
    pub email: Option<String>,
}

/// Render the most recent tool message that holds user records.
pub(crate) fn render_history(history: &[MessageHistoryItem]) -> Option<String> {
    history
        .iter()
        .rev()
        .filter(|m| m.role == Role::Tool)
        .find_map(|m| render_tool_content(&m.content))
}

/// Render tool content as a user list: JSON first, then the legacy textual format.
pub(crate) fn render_tool_content(content: &str) -> Option<String> {
    let records = match serde_json::from_str::<Value>(content) {
        Ok(Value::Array(items)) => records_from_json(&items)?,
        Ok(_) => return None,
        Err(_) => legacy::parse_user_records(content)?,
    };
    if records.is_empty() {
        return None;
    }
    Some(render_user_list(&records))
}

fn records_from_json(items: &[Value]) -> Option<Vec<UserRecord>> {
    let first = items.first()?.as_object()?;
    if !first.contains_key("display_name") {
        return None;
    }
    Some(
        items
            .iter()
            .filter_map(Value::as_object)
            .map(|o| UserRecord {
                display_name: field(o, "display_name"),
                job_title: field(o, "job_title"),
                department: field(o, "department"),
                email: field(o, "mail").or_else(|| field(o, "email")),
            })
            .collect(),
    )
}

fn field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn render_user_list(records: &[UserRecord]) -> String {
    let mut out = String::new();
    for (i, r) in records.iter().enumerate() {
        let name = r.display_name.as_deref().unwrap_or("No name");
        let _ = write!(out, "{}. **{}**", i + 1, name);
        if let Some(ref title) = r.job_title {
            let _ = write!(out, "\n   Title: {}", title);
        }
        if let Some(ref department) = r.department {
            let _ = write!(out, "\n   Department: {}", department);
        }
        if let Some(ref email) = r.email {
            let _ = write!(out, "\n   Email: {}", email);
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}
