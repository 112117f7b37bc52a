//! Agent loop implementation
//!
//! The loop owns a per-prompt stream parser, builds the augmented prompt for
//! each model iteration, pulls chunks from the token source, and decides
//! whether to iterate again when the model ends a turn with a non-final
//! response. Action results accumulated during a non-final iteration are
//! serialized into an `<iteration_k>` envelope and appended to the history
//! so the next iteration sees them.

use std::sync::{Arc, Mutex as StdMutex};

use futures::StreamExt;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::error::Result;
use crate::exec::{ActionExecutor, TokenSource};
use crate::feeds::ContextFeedManager;
use crate::protocol::{ContextFeed, EventSink, StreamParser, TokenCallback, TokenEvent};

use super::history::History;
use super::prompt::PromptBuilder;

/// Outcome of one `prompt` call.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptOutcome {
    /// The model produced a `<response final="true">`; this is its content.
    Final(String),
    /// The iteration cap was reached without a final response.
    IterationCapExceeded {
        /// How many iterations ran.
        iterations: usize,
    },
}

impl PromptOutcome {
    /// Whether the model produced a final response.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final(_))
    }

    /// The response text, or a cap-exceeded notice.
    pub fn into_text(self) -> String {
        match self {
            Self::Final(content) => content,
            Self::IterationCapExceeded { iterations } => format!(
                "[agent stopped: no final response after {} iterations]",
                iterations
            ),
        }
    }
}

/// The multi-iteration agent loop.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use cortex::agent::AgentLoop;
/// use cortex::config::AgentConfig;
///
/// let config = AgentConfig::named("sage");
/// let mut agent = AgentLoop::new(config, Arc::new(my_source))?
///     .with_executor(Arc::new(my_executor));
///
/// let outcome = agent.prompt("hello", Arc::new(|event| {
///     println!("{:?}", event);
/// })).await?;
/// ```
pub struct AgentLoop {
    config: AgentConfig,
    source: Arc<dyn TokenSource>,
    executor: Option<Arc<dyn ActionExecutor>>,
    feeds: Arc<ContextFeedManager>,
    history: History,
}

impl AgentLoop {
    /// Create an agent loop from a validated config and a token source.
    ///
    /// # Errors
    /// Returns `CortexError::Config` when the config fails validation.
    pub fn new(config: AgentConfig, source: Arc<dyn TokenSource>) -> Result<Self> {
        config.validate()?;
        let feeds = Arc::new(ContextFeedManager::with_feeds(config.context_feeds.clone()));
        let history = History::new(config.history_char_limit);
        Ok(Self {
            config,
            source,
            executor: None,
            feeds,
            history,
        })
    }

    /// Attach the action executor used for non-internal actions.
    pub fn with_executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// The shared context-feed registry.
    pub fn feeds(&self) -> &Arc<ContextFeedManager> {
        &self.feeds
    }

    /// The conversation history.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// The agent configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Clear the conversation history.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Register a context feed.
    ///
    /// Behaves identically to the `add_context_feed` internal action.
    pub async fn add_context_feed(&self, feed: ContextFeed) {
        self.feeds.register(feed).await;
    }

    /// Remove a context feed. Returns whether it existed.
    ///
    /// Behaves identically to the `remove_context_feed` internal action.
    pub async fn remove_context_feed(&self, id: &str) -> bool {
        self.feeds.remove(id).await
    }

    /// Process one user prompt, iterating until the model produces a final
    /// response or the iteration cap is reached.
    ///
    /// Every [`TokenEvent`] from every iteration is delivered to `on_event`
    /// in order while the model streams.
    ///
    /// # Errors
    /// Returns an error only for token-source failures and configuration
    /// faults (an action required an executor but none is attached). Parse
    /// and execution failures are reported through the event stream instead.
    pub async fn prompt(
        &mut self,
        user_input: &str,
        on_event: TokenCallback,
    ) -> Result<PromptOutcome> {
        self.history.push("user", user_input);

        // Intercept the event stream to capture the final response while
        // still forwarding everything to the caller.
        let final_slot: Arc<StdMutex<Option<String>>> = Arc::new(StdMutex::new(None));
        let slot = Arc::clone(&final_slot);
        let sink = EventSink::new(Arc::new(move |event: &TokenEvent| {
            if let TokenEvent::Response {
                content,
                is_final: true,
                ..
            } = event
            {
                if let Ok(mut captured) = slot.lock() {
                    *captured = Some(content.clone());
                }
            }
            on_event(event);
        }));

        let mut parser = StreamParser::new(self.executor.clone(), Arc::clone(&self.feeds), sink);

        let cap = self.config.iteration_cap;
        for iteration in 0..cap {
            info!(iteration = iteration + 1, cap, "starting iteration");

            self.feeds.refresh(self.executor.as_ref()).await;
            let feed_contents = self.feeds.contents_map().await;
            {
                let store = parser.store();
                store.lock().await.sync_feeds(feed_contents);
            }

            let prompt_text = PromptBuilder::new(&self.config)
                .feeds_block(self.feeds.prompt_block().await)
                .history(self.history.records())
                .build();
            debug!(length = prompt_text.len(), "built augmented prompt");

            parser.begin_iteration();
            if let Ok(mut captured) = final_slot.lock() {
                *captured = None;
            }

            let mut stream = self.source.stream(&prompt_text).await?;
            let mut finished = false;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                let is_final = chunk.is_final;
                parser.feed(&chunk.text, is_final).await;
                if is_final {
                    finished = true;
                    break;
                }
            }
            if !finished {
                // The source ended without marking a final chunk.
                parser.feed("", true).await;
            }

            if let Some(fatal) = parser.take_fatal().await {
                return Err(fatal);
            }

            let final_content = final_slot.lock().ok().and_then(|c| c.clone());
            if let Some(content) = final_content {
                info!(iteration = iteration + 1, "final response received");
                self.history.push("assistant", &content);
                return Ok(PromptOutcome::Final(content));
            }

            // Non-final turn: carry the iteration's action results forward.
            let snapshot = {
                let store = parser.store();
                let store = store.lock().await;
                store.snapshot_values()
            };
            let envelope = iteration_envelope(iteration, &snapshot);
            self.history.push("assistant", &envelope);
            info!(iteration = iteration + 1, "non-final response; continuing");
        }

        warn!(cap, "iteration cap reached without a final response");
        Ok(PromptOutcome::IterationCapExceeded { iterations: cap })
    }
}

/// Serialize one iteration's action results for the history.
fn iteration_envelope(iteration: usize, results: &BTreeMap<String, Value>) -> String {
    let mut out = format!("<iteration_{}>\n", iteration);
    if !results.is_empty() {
        out.push_str("<action_results>\n");
        for (key, value) in results {
            let compact = serde_json::to_string(value).unwrap_or_default();
            out.push_str(&format!("<result key=\"{}\">{}</result>\n", key, compact));
        }
        out.push_str("</action_results>\n");
    }
    out.push_str(&format!("</iteration_{}>", iteration));
    out
}
