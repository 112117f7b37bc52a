//! Core record types for the streaming execution protocol
//!
//! This module defines the data carried through the protocol: parsed actions,
//! responses, and context feeds. Action `type` and `mode` are tagged enums
//! rather than free-form strings; unrecognized values fall back to the
//! protocol defaults instead of failing, matching the lenient grammar.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Dispatch class of an action embedded in model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Stateless function/tool invocation.
    Tool,
    /// Sub-agent delegation.
    Agent,
    /// Persistent service, addressed as `service.endpoint`.
    Relic,
    /// Multi-step pipeline.
    Workflow,
    /// Nested model call for a sub-task.
    Llm,
    /// In-process primitive (context feeds, variables); never reaches the
    /// external executor.
    Internal,
}

impl ActionType {
    /// Parse a type string leniently. Unknown values default to `Tool`.
    pub fn parse(s: &str) -> Self {
        match s {
            "tool" => Self::Tool,
            "agent" => Self::Agent,
            "relic" => Self::Relic,
            "workflow" => Self::Workflow,
            "llm" => Self::Llm,
            "internal" => Self::Internal,
            _ => Self::Tool,
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tool => write!(f, "tool"),
            Self::Agent => write!(f, "agent"),
            Self::Relic => write!(f, "relic"),
            Self::Workflow => write!(f, "workflow"),
            Self::Llm => write!(f, "llm"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// How the scheduler treats an action relative to ongoing parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Block the current parse pass until the executor returns.
    Sync,
    /// Run on a background task; parsing continues while it executes.
    Async,
    /// Dispatch on a background task and mark completed immediately;
    /// the result is not awaited.
    FireAndForget,
}

impl ExecutionMode {
    /// Parse a mode string leniently. Unknown values default to `Async`.
    pub fn parse(s: &str) -> Self {
        match s {
            "sync" => Self::Sync,
            "async" => Self::Async,
            "fire_and_forget" => Self::FireAndForget,
            _ => Self::Async,
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync => write!(f, "sync"),
            Self::Async => write!(f, "async"),
            Self::FireAndForget => write!(f, "fire_and_forget"),
        }
    }
}

/// A structured request parsed from an `<action>` tag.
///
/// The action carries everything the scheduler needs: the dispatch target,
/// pre-resolved parameters, the key under which the result is registered,
/// the dependency set, and the failure policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Caller-supplied identifier; also the fallback result key.
    pub id: String,
    /// Dispatch class.
    #[serde(rename = "type")]
    pub kind: ActionType,
    /// Scheduling mode.
    pub mode: ExecutionMode,
    /// Dispatch target name.
    pub name: String,
    /// Arbitrary JSON parameters, `$name` references already resolved.
    pub parameters: Value,
    /// Key under which the result is registered. Defaults to `id`.
    pub output_key: String,
    /// Identifiers that must be completed before this action may run.
    pub depends_on: Vec<String>,
    /// Executor invocation timeout. `0` disables the timeout.
    pub timeout_secs: u64,
    /// Number of immediate re-dispatches after a failure.
    pub retry_count: u32,
    /// When true, a failure still counts as completed for dependents.
    pub skip_on_error: bool,
    /// True if the action tag appeared inside an open `<thought>`.
    pub embedded_in_thought: bool,
}

impl Action {
    /// Create an action with protocol defaults for everything but `id` and
    /// `name`.
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: ActionType::Tool,
            mode: ExecutionMode::Async,
            name: name.to_string(),
            parameters: Value::Object(serde_json::Map::new()),
            output_key: id.to_string(),
            depends_on: Vec::new(),
            timeout_secs: 30,
            retry_count: 0,
            skip_on_error: false,
            embedded_in_thought: false,
        }
    }
}

/// A parsed `<response>` body.
///
/// `is_final` defaults to `true` when the `final` attribute is absent; only
/// the literal values `"false"` and `"0"` make a response non-final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedResponse {
    /// The response body with variables already substituted.
    pub content: String,
    /// Whether this response terminates the iteration loop.
    pub is_final: bool,
}

/// Refresh class of a context feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    /// Materialized at prompt-build time by invoking the executor.
    OnDemand,
    /// Refreshed externally on a schedule; the core sees a pre-populated
    /// content string.
    Periodic,
    /// Fixed content.
    Static,
    /// Materialized from process-local signals (e.g. the wall clock).
    Internal,
}

impl FeedKind {
    /// Parse a kind string leniently. Unknown values default to `Static`.
    pub fn parse(s: &str) -> Self {
        match s {
            "on_demand" => Self::OnDemand,
            "periodic" => Self::Periodic,
            "static" => Self::Static,
            "internal" => Self::Internal,
            _ => Self::Static,
        }
    }
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OnDemand => write!(f, "on_demand"),
            Self::Periodic => write!(f, "periodic"),
            Self::Static => write!(f, "static"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// A named string injected into the prompt to carry ambient context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextFeed {
    /// Unique feed identifier; also resolvable via `$id` in responses.
    pub id: String,
    /// Refresh class.
    #[serde(rename = "type")]
    pub kind: FeedKind,
    /// Opaque JSON consumed by the executor when materializing the feed
    /// (`{"action": "...", "params": {...}}` for on-demand feeds).
    pub source: Value,
    /// Materialized content string; empty until refreshed.
    pub content: String,
    /// Seconds the materialized content stays fresh. `0` = refresh every time.
    pub cache_ttl: u64,
    /// Soft cap on feed size, in tokens. `0` = unlimited.
    pub max_tokens: usize,
    /// When the content was last materialized.
    #[serde(skip)]
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl Default for ContextFeed {
    fn default() -> Self {
        Self {
            id: String::new(),
            kind: FeedKind::Static,
            source: Value::Null,
            content: String::new(),
            cache_ttl: 0,
            max_tokens: 0,
            refreshed_at: None,
        }
    }
}

impl ContextFeed {
    /// Create a static feed with fixed content.
    pub fn fixed(id: &str, content: &str) -> Self {
        Self {
            id: id.to_string(),
            content: content.to_string(),
            ..Self::default()
        }
    }

    /// Create an on-demand feed materialized through the executor.
    pub fn on_demand(id: &str, source: Value) -> Self {
        Self {
            id: id.to_string(),
            kind: FeedKind::OnDemand,
            source,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_type_parse() {
        assert_eq!(ActionType::parse("tool"), ActionType::Tool);
        assert_eq!(ActionType::parse("agent"), ActionType::Agent);
        assert_eq!(ActionType::parse("relic"), ActionType::Relic);
        assert_eq!(ActionType::parse("workflow"), ActionType::Workflow);
        assert_eq!(ActionType::parse("llm"), ActionType::Llm);
        assert_eq!(ActionType::parse("internal"), ActionType::Internal);
        // Unknown values fall back to the default dispatch class.
        assert_eq!(ActionType::parse("banana"), ActionType::Tool);
    }

    #[test]
    fn test_action_type_display_roundtrip() {
        for t in [
            ActionType::Tool,
            ActionType::Agent,
            ActionType::Relic,
            ActionType::Workflow,
            ActionType::Llm,
            ActionType::Internal,
        ] {
            assert_eq!(ActionType::parse(&t.to_string()), t);
        }
    }

    #[test]
    fn test_execution_mode_parse() {
        assert_eq!(ExecutionMode::parse("sync"), ExecutionMode::Sync);
        assert_eq!(ExecutionMode::parse("async"), ExecutionMode::Async);
        assert_eq!(
            ExecutionMode::parse("fire_and_forget"),
            ExecutionMode::FireAndForget
        );
        assert_eq!(ExecutionMode::parse(""), ExecutionMode::Async);
    }

    #[test]
    fn test_action_defaults() {
        let action = Action::new("a1", "search");
        assert_eq!(action.id, "a1");
        assert_eq!(action.name, "search");
        assert_eq!(action.kind, ActionType::Tool);
        assert_eq!(action.mode, ExecutionMode::Async);
        assert_eq!(action.output_key, "a1");
        assert!(action.depends_on.is_empty());
        assert_eq!(action.timeout_secs, 30);
        assert_eq!(action.retry_count, 0);
        assert!(!action.skip_on_error);
        assert!(!action.embedded_in_thought);
    }

    #[test]
    fn test_action_serde_roundtrip() {
        let mut action = Action::new("a1", "add");
        action.kind = ActionType::Relic;
        action.mode = ExecutionMode::Sync;
        action.depends_on = vec!["a0".to_string()];
        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("\"type\":\"relic\""));
        assert!(json.contains("\"mode\":\"sync\""));
        let back: Action = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn test_parsed_response_roundtrip() {
        let response = ParsedResponse {
            content: "done".into(),
            is_final: true,
        };
        let round: ParsedResponse =
            serde_json::from_str(&serde_json::to_string(&response).unwrap()).unwrap();
        assert_eq!(round, response);
    }

    #[test]
    fn test_feed_kind_parse() {
        assert_eq!(FeedKind::parse("on_demand"), FeedKind::OnDemand);
        assert_eq!(FeedKind::parse("periodic"), FeedKind::Periodic);
        assert_eq!(FeedKind::parse("internal"), FeedKind::Internal);
        assert_eq!(FeedKind::parse("whatever"), FeedKind::Static);
    }

    #[test]
    fn test_context_feed_fixed() {
        let feed = ContextFeed::fixed("weather", "sunny, 22C");
        assert_eq!(feed.id, "weather");
        assert_eq!(feed.kind, FeedKind::Static);
        assert_eq!(feed.content, "sunny, 22C");
        assert_eq!(feed.cache_ttl, 0);
    }

    #[test]
    fn test_context_feed_on_demand() {
        let feed = ContextFeed::on_demand(
            "clock",
            serde_json::json!({"action": "system_clock", "params": {}}),
        );
        assert_eq!(feed.kind, FeedKind::OnDemand);
        assert!(feed.content.is_empty());
        assert_eq!(feed.source["action"], "system_clock");
    }
}
