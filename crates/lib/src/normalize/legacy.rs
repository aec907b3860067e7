//! Legacy user-record format adapter.
//!
//! Some versions of the people-search tool return the repr of their result objects
//! instead of JSON:
//!
//! ```text
//! [User(id='1', display_name='Ada Lovelace', job_title='Engineer', department=None, mail='ada@example.com')]
//! ```
//!
//! This module pulls the fields out with regexes. It only exists until the tool emits
//! JSON; nothing else should depend on this shape.

use super::tool_results::UserRecord;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static RECORD_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bUser\(").expect("valid user record regex"));

static FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\w+)=(?:'([^']*)'|"([^"]*)"|None)"#).expect("valid user field regex")
});

/// Parse `User(...)` records. Returns None unless at least one record has a `display_name` field.
pub(crate) fn parse_user_records(text: &str) -> Option<Vec<UserRecord>> {
    if !text.contains("display_name=") {
        return None;
    }
    let starts: Vec<usize> = RECORD_START.find_iter(text).map(|m| m.start()).collect();
    let records: Vec<UserRecord> = starts
        .iter()
        .enumerate()
        .filter_map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            let fields = parse_fields(&text[start..end]);
            if !fields.contains_key("display_name") {
                return None;
            }
            let get = |k: &str| fields.get(k).cloned().flatten();
            Some(UserRecord {
                display_name: get("display_name"),
                job_title: get("job_title"),
                department: get("department"),
                email: get("mail").or_else(|| get("email")),
            })
        })
        .collect();
    if records.is_empty() {
        None
    } else {
        Some(records)
    }
}

/// Map of field name to value; `None` and empty strings become `None`.
fn parse_fields(segment: &str) -> HashMap<String, Option<String>> {
    FIELD
        .captures_iter(segment)
        .map(|c| {
            let value = c
                .get(2)
                .or_else(|| c.get(3))
                .map(|m| m.as_str().trim().to_string())
                .filter(|s| !s.is_empty());
            (c[1].to_string(), value)
        })
        .collect()
}
