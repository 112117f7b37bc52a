//! Lenient parsing of `<action>` bodies
//!
//! Models frequently emit JSON with `//` comments, `/* */` blocks, and
//! trailing commas. The body is cleaned before parsing; if the cleaned text
//! still is not a JSON object the action is dropped and the failure surfaces
//! as an `Error` event — never as a fatal stream error.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CortexError, Result};

use super::types::{Action, ActionType, ExecutionMode};
use super::variables::VariableStore;

/// Clean a raw action body into (hopefully) valid JSON.
///
/// In order: strip `// ...` line comments, strip `/* ... */` block comments,
/// remove trailing commas before `]` or `}`, trim surrounding whitespace.
/// All three passes are string-aware so content inside JSON string literals
/// is never touched.
pub fn clean_json(raw: &str) -> String {
    let decommented = strip_comments(raw);
    let cleaned = strip_trailing_commas(&decommented);
    cleaned.trim().to_string()
}

fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' => match chars.peek() {
                Some('/') => {
                    // Line comment: drop until end of line, keep the newline.
                    for next in chars.by_ref() {
                        if next == '\n' {
                            out.push('\n');
                            break;
                        }
                    }
                }
                Some('*') => {
                    chars.next();
                    let mut prev = '\0';
                    for next in chars.by_ref() {
                        if prev == '*' && next == '/' {
                            break;
                        }
                        prev = next;
                    }
                }
                _ => out.push(c),
            },
            _ => out.push(c),
        }
    }
    out
}

fn strip_trailing_commas(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in input.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ']' | '}' => {
                // Drop a comma separated from the bracket only by whitespace.
                let trimmed_len = out.trim_end().len();
                if out[..trimmed_len].ends_with(',') {
                    out.truncate(trimmed_len - 1);
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn first_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn attr_or_field<'a>(
    attrs: &'a HashMap<String, String>,
    root: &'a Value,
    key: &str,
) -> Option<String> {
    attrs
        .get(key)
        .cloned()
        .or_else(|| root.get(key).and_then(Value::as_str).map(str::to_string))
}

/// Parse a cleaned action body plus its tag attributes into an [`Action`].
///
/// `id`, `type` and `mode` are read from the tag attributes first, falling
/// back to same-named JSON fields, then to the protocol defaults. A missing
/// `id` is synthesized (with a warning); a missing `name` is a parse error.
/// `$name` references in the parameters are resolved against `store` as of
/// parse time.
pub fn parse_action(
    body: &str,
    attrs: &HashMap<String, String>,
    store: &VariableStore,
) -> Result<Action> {
    let cleaned = clean_json(body);
    let root: Value = serde_json::from_str(&cleaned).map_err(|e| {
        CortexError::Parse(format!(
            "invalid action JSON: {} (cleaned body: {})",
            e,
            first_chars(&cleaned, 200)
        ))
    })?;
    if !root.is_object() {
        return Err(CortexError::Parse(format!(
            "action body is not a JSON object: {}",
            first_chars(&cleaned, 200)
        )));
    }

    let id = match attr_or_field(attrs, &root, "id") {
        Some(id) if !id.is_empty() => id,
        _ => {
            let synthesized = format!("action_{}", uuid::Uuid::new_v4().simple());
            warn!(id = %synthesized, "action missing id; synthesized one");
            synthesized
        }
    };

    let kind = attr_or_field(attrs, &root, "type")
        .map(|s| ActionType::parse(&s))
        .unwrap_or(ActionType::Tool);
    let mode = attr_or_field(attrs, &root, "mode")
        .map(|s| ExecutionMode::parse(&s))
        .unwrap_or(ExecutionMode::Async);

    let mut name = root
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            CortexError::Parse(format!(
                "action '{}' is missing the required 'name' field",
                id
            ))
        })?;

    let mut parameters = root
        .get("parameters")
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

    // A relic addressed as "service.endpoint" is split; the endpoint travels
    // in the parameters unless the model already put one there.
    if kind == ActionType::Relic {
        if let Some(dot) = name.find('.') {
            let endpoint = name[dot + 1..].to_string();
            name.truncate(dot);
            if let Value::Object(ref mut map) = parameters {
                map.entry("endpoint".to_string())
                    .or_insert_with(|| Value::String(endpoint));
            }
        }
    }

    let output_key = root
        .get("output_key")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(&id)
        .to_string();

    let depends_on = root
        .get("depends_on")
        .and_then(Value::as_array)
        .map(|deps| {
            deps.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let timeout_secs = root
        .get("timeout_secs")
        .or_else(|| root.get("timeout"))
        .and_then(Value::as_u64)
        .unwrap_or(30);
    let retry_count = root
        .get("retry_count")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    let skip_on_error = root
        .get("skip_on_error")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let parameters = store.resolve_value(&parameters);
    debug!(id = %id, name = %name, %kind, %mode, "parsed action");

    Ok(Action {
        id: id.clone(),
        kind,
        mode,
        name,
        parameters,
        output_key,
        depends_on,
        timeout_secs,
        retry_count,
        skip_on_error,
        embedded_in_thought: false,
    })
}
