//! Context feed management
//!
//! Context feeds are named strings injected into every prompt to carry
//! ambient context: the current time, sensor values, retrieved documents.
//! The manager keeps the registry, materializes `on_demand` feeds through
//! the external executor and `internal` feeds from process-local signals,
//! honors per-feed cache TTLs, and renders the `<context_feeds>` prompt
//! block.
//!
//! Feeds survive parser resets: a feed added in one prompt is still injected
//! in the next.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::exec::ActionExecutor;
use crate::protocol::{Action, ActionType, ContextFeed, ExecutionMode, FeedKind};

/// Registry of context feeds shared between the agent loop (prompt
/// injection), the stream parser (inline feeds) and the scheduler (internal
/// actions).
///
/// The map is ordered by feed id so prompt injection is deterministic.
#[derive(Debug, Default)]
pub struct ContextFeedManager {
    feeds: Mutex<BTreeMap<String, ContextFeed>>,
}

impl ContextFeedManager {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry seeded with pre-configured feeds.
    pub fn with_feeds(feeds: Vec<ContextFeed>) -> Self {
        let map: BTreeMap<String, ContextFeed> = feeds
            .into_iter()
            .map(|feed| (feed.id.clone(), feed))
            .collect();
        Self {
            feeds: Mutex::new(map),
        }
    }

    /// Register a feed, replacing any feed with the same id.
    pub async fn register(&self, feed: ContextFeed) {
        info!(id = %feed.id, kind = %feed.kind, "registering context feed");
        self.feeds.lock().await.insert(feed.id.clone(), feed);
    }

    /// Remove a feed. Returns whether it existed.
    ///
    /// This is the single removal path, used both by the public API and by
    /// the `remove_context_feed` internal action.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.feeds.lock().await.remove(id).is_some();
        if removed {
            info!(id = %id, "removed context feed");
        } else {
            warn!(id = %id, "attempted to remove unknown context feed");
        }
        removed
    }

    /// A feed's materialized content, if the feed exists.
    pub async fn content(&self, id: &str) -> Option<String> {
        self.feeds.lock().await.get(id).map(|f| f.content.clone())
    }

    /// Number of registered feeds.
    pub async fn len(&self) -> usize {
        self.feeds.lock().await.len()
    }

    /// Whether no feeds are registered.
    pub async fn is_empty(&self) -> bool {
        self.feeds.lock().await.is_empty()
    }

    /// Snapshot of all feeds.
    pub async fn snapshot(&self) -> Vec<ContextFeed> {
        self.feeds.lock().await.values().cloned().collect()
    }

    /// Map of feed id → materialized content, for mirroring into the
    /// variable store.
    pub async fn contents_map(&self) -> HashMap<String, String> {
        self.feeds
            .lock()
            .await
            .iter()
            .map(|(id, feed)| (id.clone(), feed.content.clone()))
            .collect()
    }

    /// Materialize stale `on_demand` and `internal` feeds.
    ///
    /// Called at the start of every iteration, before the prompt is built.
    /// Fresh feeds (within their `cache_ttl`) are left alone; `periodic` and
    /// `static` feeds reduce to their pre-populated content.
    pub async fn refresh(&self, executor: Option<&Arc<dyn ActionExecutor>>) {
        let stale: Vec<ContextFeed> = self
            .feeds
            .lock()
            .await
            .values()
            .filter(|f| needs_refresh(f))
            .cloned()
            .collect();

        for mut feed in stale {
            let materialized = match feed.kind {
                FeedKind::Internal => Some(internal_content(&feed)),
                FeedKind::OnDemand => match executor {
                    Some(executor) => materialize_on_demand(&feed, executor).await,
                    None => {
                        debug!(id = %feed.id, "no executor; on-demand feed left empty");
                        None
                    }
                },
                _ => None,
            };
            let Some(mut content) = materialized else {
                continue;
            };
            if feed.max_tokens > 0 {
                clamp_to_tokens(&mut content, feed.max_tokens);
            }
            debug!(id = %feed.id, bytes = content.len(), "materialized context feed");
            feed.content = content;
            feed.refreshed_at = Some(Utc::now());

            let mut map = self.feeds.lock().await;
            // The feed may have been removed while the executor ran.
            if let Some(entry) = map.get_mut(&feed.id) {
                entry.content = feed.content;
                entry.refreshed_at = feed.refreshed_at;
            }
        }
    }

    /// Render the `<context_feeds>` prompt block, or `None` when no feed has
    /// content.
    pub async fn prompt_block(&self) -> Option<String> {
        let feeds = self.feeds.lock().await;
        let filled: Vec<&ContextFeed> = feeds.values().filter(|f| !f.content.is_empty()).collect();
        if filled.is_empty() {
            return None;
        }
        let mut block = String::from("<context_feeds>\n");
        for feed in filled {
            block.push_str(&format!(
                "\t<feed id=\"{}\" type=\"{}\">\n\t\t{}\n\t</feed>\n",
                feed.id, feed.kind, feed.content
            ));
        }
        block.push_str("</context_feeds>\n");
        Some(block)
    }
}

fn needs_refresh(feed: &ContextFeed) -> bool {
    if !matches!(feed.kind, FeedKind::OnDemand | FeedKind::Internal) {
        return false;
    }
    if feed.content.is_empty() || feed.cache_ttl == 0 {
        return true;
    }
    match feed.refreshed_at {
        Some(at) => {
            let age = Utc::now().signed_duration_since(at);
            age.num_seconds() >= feed.cache_ttl as i64
        }
        None => true,
    }
}

/// Content for `internal` feeds, produced from process-local signals.
fn internal_content(feed: &ContextFeed) -> String {
    let action = feed
        .source
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or("system_clock");
    match action {
        "system_clock" | "current_time" | "datetime" => {
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        }
        other => {
            warn!(id = %feed.id, action = %other, "unknown internal feed signal");
            feed.content.clone()
        }
    }
}

/// Invoke the executor with the feed's `source.action`/`source.params` and
/// render the result as feed content.
async fn materialize_on_demand(
    feed: &ContextFeed,
    executor: &Arc<dyn ActionExecutor>,
) -> Option<String> {
    let name = feed.source.get("action").and_then(Value::as_str)?;
    let mut action = Action::new(&format!("feed_{}", feed.id), name);
    action.kind = ActionType::Tool;
    action.mode = ExecutionMode::Sync;
    action.parameters = feed
        .source
        .get("params")
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

    match executor.execute(&action).await {
        Ok(result) => Some(render_feed_content(&result)),
        Err(e) => {
            warn!(id = %feed.id, error = %e, "failed to materialize context feed");
            None
        }
    }
}

fn render_feed_content(result: &Value) -> String {
    match result {
        Value::String(s) => s.clone(),
        other => {
            // A result carrying a timestamp field reduces to it; anything
            // else is injected as readable JSON.
            if let Some(ts) = other.get("timestamp").and_then(Value::as_str) {
                ts.to_string()
            } else {
                serde_json::to_string_pretty(other).unwrap_or_default()
            }
        }
    }
}

fn clamp_to_tokens(content: &mut String, max_tokens: usize) {
    // Rough budget: four characters per token.
    let max_chars = max_tokens.saturating_mul(4);
    if content.chars().count() > max_chars {
        let clamped: String = content.chars().take(max_chars).collect();
        *content = clamped;
        content.push_str("... (truncated)");
    }
}
