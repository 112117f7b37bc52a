//! Variable store and `$name` substitution
//!
//! Completed actions register their results here under both their `id` and
//! `output_key`; context feeds mirror their materialized content into a
//! secondary map. Substitution scans for `$identifier` references and
//! replaces each with the scalar rendering of the matching value, falling
//! back to feed content, and leaving unknown identifiers untouched.
//!
//! Substitution never interleaves with parsing: it always consumes a fully
//! parsed value (action parameters at parse time, a response body at close
//! time).

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

static VAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$(\w+)").expect("variable regex"));

/// Registry of action results and context-feed content consulted by `$name`
/// substitution.
#[derive(Debug, Default)]
pub struct VariableStore {
    values: HashMap<String, Value>,
    feed_contents: HashMap<String, String>,
}

impl VariableStore {
    /// Insert or overwrite a result value.
    pub fn put(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    /// Look up a result value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Remove a result value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Drop all result values. Feed content is unaffected.
    pub fn clear_values(&mut self) {
        self.values.clear();
    }

    /// Number of stored result values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no result values are stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Ordered snapshot of the result values, for iteration envelopes.
    pub fn snapshot_values(&self) -> BTreeMap<String, Value> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Register (or update) a context feed's materialized content.
    pub fn set_feed(&mut self, id: &str, content: &str) {
        self.feed_contents
            .insert(id.to_string(), content.to_string());
    }

    /// Remove a context feed's content.
    pub fn remove_feed(&mut self, id: &str) {
        self.feed_contents.remove(id);
    }

    /// Replace the feed-content map wholesale with a fresh snapshot.
    pub fn sync_feeds(&mut self, contents: HashMap<String, String>) {
        self.feed_contents = contents;
    }

    /// Resolve `$identifier` references in a string.
    ///
    /// Each match is replaced by the scalar rendering of the matching result
    /// value (string → itself, number → decimal, bool → `true`/`false`,
    /// null → `null`, object/array → compact JSON), falling back to the
    /// matching feed's content. Unknown identifiers stay literal.
    pub fn resolve_str(&self, input: &str) -> String {
        VAR_RE
            .replace_all(input, |caps: &Captures| {
                let name = &caps[1];
                if let Some(value) = self.values.get(name) {
                    render_scalar(value)
                } else if let Some(content) = self.feed_contents.get(name) {
                    content.clone()
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned()
    }

    /// Resolve `$identifier` references recursively through a JSON value.
    ///
    /// Strings are resolved as in [`resolve_str`](Self::resolve_str); arrays
    /// and objects element-wise; other scalars pass through unchanged.
    pub fn resolve_value(&self, input: &Value) -> Value {
        match input {
            Value::String(s) => Value::String(self.resolve_str(s)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.resolve_value(v)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

/// Render a JSON value the way substitution embeds it into text.
fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}
