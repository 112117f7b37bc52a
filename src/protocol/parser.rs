//! Incremental stream parser for the agent protocol
//!
//! Consumes model output chunk by chunk and drives the whole pipeline:
//! tag scanning, action parsing, scheduling, variable resolution, and typed
//! event emission. The parser is a five-state machine:
//!
//! ```text
//! Idle ──<thought>──▶ InThought ──</thought>──▶ Idle
//!   │                    │
//!   │                    ├──<action>──▶ InAction ──</action>──▶ (back)
//!   │                    └──<response>─▶ InResponse ─</response>─▶ Idle
//!   └──<context_feed>──▶ InContextFeed ──</context_feed>──▶ Idle
//! ```
//!
//! Text is only ever consumed once the scanner has classified it, so
//! delivering the same output in different chunk splits produces the same
//! event sequence. When the stream finishes without any tagged output the
//! buffered text becomes a single synthetic final response — the safety net
//! that keeps the outer loop from stalling on a model that ignored the
//! protocol.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::CortexError;
use crate::exec::ActionExecutor;
use crate::feeds::ContextFeedManager;

use super::action;
use super::events::{EventSink, TokenEvent};
use super::scanner::{self, TagMatch};
use super::types::{ContextFeed, FeedKind};
use super::scheduler::ActionScheduler;
use super::variables::VariableStore;

/// Minimum accumulated thought bytes before an emission (unless a newline or
/// a buffer drain forces one earlier). Keeps the UI from repainting per byte.
const THOUGHT_CHUNK_BYTES: usize = 10;

/// Parser state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Outside any tag; stray text is junk.
    Idle,
    /// Inside `<thought>`.
    InThought,
    /// Inside `<action>`; accumulating the JSON body.
    InAction,
    /// Inside `<response>`; accumulating the body for later resolution.
    InResponse,
    /// Inside `<context_feed>`.
    InContextFeed,
}

/// Streaming protocol parser.
///
/// One instance lives for the duration of one user prompt (possibly spanning
/// several model iterations). [`begin_iteration`](Self::begin_iteration)
/// clears the state machine between iterations; [`reset`](Self::reset)
/// additionally clears action results between prompts. Context feeds survive
/// both.
pub struct StreamParser {
    state: ParserState,
    buffer: String,
    at_line_start: bool,
    /// Text seen in `Idle`; discarded when a tag opens, used for the
    /// plain-text fallback when none ever does.
    idle_junk: String,
    saw_tagged: bool,

    current_thought: String,
    thought_emitted: usize,
    thought_open: bool,

    current_action: String,
    action_attrs: HashMap<String, String>,
    action_embedded: bool,

    current_response: String,
    response_attrs: HashMap<String, String>,

    current_feed: String,
    feed_attrs: HashMap<String, String>,

    store: Arc<Mutex<VariableStore>>,
    scheduler: ActionScheduler,
    feeds: Arc<ContextFeedManager>,
    sink: EventSink,
}

impl StreamParser {
    /// Create a parser wired to an optional executor, the shared feed
    /// registry and an event sink.
    pub fn new(
        executor: Option<Arc<dyn ActionExecutor>>,
        feeds: Arc<ContextFeedManager>,
        sink: EventSink,
    ) -> Self {
        let store = Arc::new(Mutex::new(VariableStore::default()));
        let scheduler = ActionScheduler::new(
            executor,
            Arc::clone(&store),
            Arc::clone(&feeds),
            sink.clone(),
        );
        Self {
            state: ParserState::Idle,
            buffer: String::new(),
            at_line_start: true,
            idle_junk: String::new(),
            saw_tagged: false,
            current_thought: String::new(),
            thought_emitted: 0,
            thought_open: false,
            current_action: String::new(),
            action_attrs: HashMap::new(),
            action_embedded: false,
            current_response: String::new(),
            response_attrs: HashMap::new(),
            current_feed: String::new(),
            feed_attrs: HashMap::new(),
            store,
            scheduler,
            feeds,
            sink,
        }
    }

    /// The shared variable store.
    pub fn store(&self) -> Arc<Mutex<VariableStore>> {
        Arc::clone(&self.store)
    }

    /// The scheduler driving action dispatch.
    pub fn scheduler(&self) -> &ActionScheduler {
        &self.scheduler
    }

    /// Current machine state.
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Take the first fatal configuration error hit while executing actions.
    pub async fn take_fatal(&self) -> Option<CortexError> {
        self.scheduler.take_fatal().await
    }

    /// Feed one chunk from the token source. `is_final` marks the last chunk
    /// of the stream and triggers finalization.
    pub async fn feed(&mut self, chunk: &str, is_final: bool) {
        self.buffer.push_str(chunk);
        self.process(false).await;
        if is_final {
            self.finalize().await;
        }
    }

    /// Clear the state machine for the next model iteration. Action results,
    /// completion tracking and context feeds are preserved.
    pub fn begin_iteration(&mut self) {
        self.state = ParserState::Idle;
        self.buffer.clear();
        self.at_line_start = true;
        self.idle_junk.clear();
        self.saw_tagged = false;
        self.current_thought.clear();
        self.thought_emitted = 0;
        self.thought_open = false;
        self.current_action.clear();
        self.action_attrs.clear();
        self.action_embedded = false;
        self.current_response.clear();
        self.response_attrs.clear();
        self.current_feed.clear();
        self.feed_attrs.clear();
    }

    /// Clear all per-prompt state: the machine, action results and completion
    /// tracking. Context feeds survive.
    pub async fn reset(&mut self) {
        self.begin_iteration();
        self.store.lock().await.clear_values();
        self.scheduler.reset().await;
        debug!("parser reset");
    }

    /// Run the scan loop over the buffer. With `finalizing` set, partial
    /// tags and trailing fence fragments no longer wait for more input.
    async fn process(&mut self, finalizing: bool) {
        loop {
            if self.buffer.is_empty() {
                break;
            }

            // Markdown fence lines are stripped wherever they start a line.
            match scanner::scan_fence(&self.buffer, self.at_line_start, finalizing) {
                scanner::FenceAction::Strip(len) => {
                    self.buffer.drain(..len);
                    self.at_line_start = true;
                    continue;
                }
                scanner::FenceAction::Content(len) => {
                    let run: String = self.buffer.drain(..len).collect();
                    self.consume_content(&run);
                    self.at_line_start = false;
                    continue;
                }
                scanner::FenceAction::Wait => break,
                scanner::FenceAction::Discard => {
                    self.buffer.clear();
                    break;
                }
                scanner::FenceAction::NotAFence => {}
            }

            if self.buffer.starts_with('<') {
                let (open, close) = self.candidates();
                match scanner::match_tag(&self.buffer, open, close) {
                    TagMatch::Open { name, attrs, len } => {
                        self.buffer.drain(..len);
                        self.at_line_start = false;
                        self.handle_open(name, attrs);
                        continue;
                    }
                    TagMatch::Close { name, len } => {
                        self.buffer.drain(..len);
                        self.at_line_start = false;
                        self.handle_close(name).await;
                        continue;
                    }
                    TagMatch::Partial if !finalizing => break,
                    _ => {
                        // Not a protocol tag here; the '<' is plain content.
                        let c = self.buffer.remove(0);
                        self.consume_content(&c.to_string());
                        self.at_line_start = false;
                        continue;
                    }
                }
            }

            let n = scanner::content_run(&self.buffer, self.at_line_start);
            let run: String = self.buffer.drain(..n).collect();
            self.at_line_start = run.ends_with('\n');
            self.consume_content(&run);
        }
    }

    /// Tag names recognized as opening/closing in the current state.
    fn candidates(&self) -> (&'static [&'static str], &'static [&'static str]) {
        match self.state {
            ParserState::Idle => (&["thought", "action", "response", "context_feed"], &[]),
            ParserState::InThought => (&["thought", "action", "response"], &["thought"]),
            // Action and feed bodies are raw content; only their own closing
            // tag is structural, so `<` may appear freely inside.
            ParserState::InAction => (&[], &["action"]),
            ParserState::InResponse => (&["action"], &["response"]),
            ParserState::InContextFeed => (&[], &["context_feed"]),
        }
    }

    fn consume_content(&mut self, text: &str) {
        match self.state {
            ParserState::Idle => self.idle_junk.push_str(text),
            ParserState::InThought => {
                self.current_thought.push_str(text);
                let pending = self.current_thought.len() - self.thought_emitted;
                if pending > 0
                    && (pending >= THOUGHT_CHUNK_BYTES
                        || text.contains('\n')
                        || self.buffer.is_empty())
                {
                    self.flush_thought();
                }
            }
            ParserState::InAction => self.current_action.push_str(text),
            ParserState::InResponse => self.current_response.push_str(text),
            ParserState::InContextFeed => self.current_feed.push_str(text),
        }
    }

    /// Emit any thought text accumulated since the last emission.
    fn flush_thought(&mut self) {
        if self.current_thought.len() > self.thought_emitted {
            let content = self.current_thought[self.thought_emitted..].to_string();
            self.thought_emitted = self.current_thought.len();
            self.sink.emit(TokenEvent::Thought { content });
        }
    }

    fn clear_thought(&mut self) {
        self.current_thought.clear();
        self.thought_emitted = 0;
        self.thought_open = false;
    }

    fn handle_open(&mut self, name: &str, attrs: HashMap<String, String>) {
        self.saw_tagged = true;
        if self.state == ParserState::Idle {
            // Bytes outside any tag are discarded once real protocol output
            // shows up.
            self.idle_junk.clear();
        }
        match name {
            "thought" => {
                // Re-opening while already in a thought just continues it.
                self.state = ParserState::InThought;
                self.thought_open = true;
            }
            "action" => {
                if self.state == ParserState::InThought {
                    // The UI should see the reasoning so far before the
                    // action card appears mid-thought.
                    self.flush_thought();
                }
                self.action_embedded = self.thought_open;
                self.action_attrs = attrs;
                self.current_action.clear();
                self.state = ParserState::InAction;
            }
            "response" => {
                if self.state == ParserState::InThought {
                    self.flush_thought();
                    self.clear_thought();
                }
                self.response_attrs = attrs;
                self.current_response.clear();
                self.state = ParserState::InResponse;
            }
            "context_feed" => {
                self.feed_attrs = attrs;
                self.current_feed.clear();
                self.state = ParserState::InContextFeed;
            }
            _ => {}
        }
    }

    async fn handle_close(&mut self, name: &str) {
        self.saw_tagged = true;
        match name {
            "thought" => {
                self.flush_thought();
                self.clear_thought();
                self.state = ParserState::Idle;
            }
            "action" => {
                let body = std::mem::take(&mut self.current_action);
                let attrs = std::mem::take(&mut self.action_attrs);
                let parsed = {
                    let store = self.store.lock().await;
                    action::parse_action(&body, &attrs, &store)
                };
                match parsed {
                    Ok(mut parsed) => {
                        parsed.embedded_in_thought = self.action_embedded;
                        self.scheduler.submit(parsed).await;
                    }
                    Err(e) => {
                        warn!(error = %e, "dropping malformed action");
                        self.sink.error(e.to_string(), "action");
                    }
                }
                self.action_embedded = false;
                self.state = if self.thought_open {
                    ParserState::InThought
                } else {
                    ParserState::Idle
                };
            }
            "response" => {
                // Settle in-flight work so the snapshot is complete, then
                // resolve variables over the accumulated body.
                self.scheduler.quiesce().await;
                let body = std::mem::take(&mut self.current_response);
                let attrs = std::mem::take(&mut self.response_attrs);
                let content = self.store.lock().await.resolve_str(&body);
                let is_final = final_attr(&attrs);
                debug!(is_final, "response closed");
                self.sink.emit(TokenEvent::Response {
                    content,
                    is_final,
                    fallback: false,
                });
                self.state = ParserState::Idle;
            }
            "context_feed" => {
                let content = std::mem::take(&mut self.current_feed);
                let attrs = std::mem::take(&mut self.feed_attrs);
                match attrs.get("id").filter(|id| !id.is_empty()) {
                    Some(id) => {
                        let feed = ContextFeed {
                            id: id.clone(),
                            kind: attrs
                                .get("type")
                                .map(|t| FeedKind::parse(t))
                                .unwrap_or(FeedKind::Static),
                            content: content.clone(),
                            refreshed_at: Some(chrono::Utc::now()),
                            ..ContextFeed::default()
                        };
                        self.feeds.register(feed).await;
                        self.store.lock().await.set_feed(id, &content);
                        self.sink.emit(TokenEvent::ContextFeed {
                            feed_id: id.clone(),
                            content,
                        });
                    }
                    None => {
                        self.sink
                            .error("context feed missing 'id' attribute", "context_feed");
                    }
                }
                self.state = ParserState::Idle;
            }
            _ => {}
        }
    }

    /// Handle the end of the token stream.
    async fn finalize(&mut self) {
        self.process(true).await;

        match self.state {
            ParserState::InThought => {
                self.flush_thought();
                self.clear_thought();
            }
            ParserState::InResponse if !self.current_response.is_empty() => {
                // The stream was cut before `</response>`; deliver what we
                // have rather than dropping the answer.
                warn!("stream ended inside <response>; flushing partial body");
                self.scheduler.quiesce().await;
                let body = std::mem::take(&mut self.current_response);
                let attrs = std::mem::take(&mut self.response_attrs);
                let content = self.store.lock().await.resolve_str(&body);
                let is_final = final_attr(&attrs);
                self.sink.emit(TokenEvent::Response {
                    content,
                    is_final,
                    fallback: false,
                });
            }
            ParserState::InAction if !self.current_action.is_empty() => {
                self.sink.error(
                    "stream ended inside <action>; fragment dropped",
                    "action",
                );
                self.current_action.clear();
            }
            ParserState::InContextFeed if !self.current_feed.is_empty() => {
                self.sink.error(
                    "stream ended inside <context_feed>; fragment dropped",
                    "context_feed",
                );
                self.current_feed.clear();
            }
            _ => {}
        }
        self.state = ParserState::Idle;

        self.scheduler.quiesce().await;
        self.scheduler.drain_orphans().await;

        if !self.saw_tagged {
            let mut text = std::mem::take(&mut self.idle_junk);
            text.push_str(&self.buffer);
            self.buffer.clear();
            if !text.trim().is_empty() {
                warn!("model output did not use the streaming protocol; emitting as plain text");
                self.sink.emit(TokenEvent::Response {
                    content: text,
                    is_final: true,
                    fallback: true,
                });
            }
        } else {
            self.idle_junk.clear();
            self.buffer.clear();
        }
    }
}

/// Whether a `final` attribute marks the response terminal. Absent means
/// final; only the literal values `"false"` and `"0"` mean non-final.
fn final_attr(attrs: &HashMap<String, String>) -> bool {
    attrs
        .get("final")
        .map(|v| v != "false" && v != "0")
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::Action;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex as StdMutex;

    struct MapExecutor {
        results: HashMap<String, Value>,
    }

    #[async_trait]
    impl ActionExecutor for MapExecutor {
        async fn execute(&self, action: &Action) -> crate::error::Result<Value> {
            self.results
                .get(&action.name)
                .cloned()
                .ok_or_else(|| CortexError::Execution(format!("unknown tool {}", action.name)))
        }
    }

    fn collecting_sink() -> (EventSink, Arc<StdMutex<Vec<TokenEvent>>>) {
        let events: Arc<StdMutex<Vec<TokenEvent>>> = Arc::new(StdMutex::new(Vec::new()));
        let captured = Arc::clone(&events);
        let sink = EventSink::new(Arc::new(move |ev: &TokenEvent| {
            if let Ok(mut buf) = captured.lock() {
                buf.push(ev.clone());
            }
        }));
        (sink, events)
    }

    fn parser_with(results: &[(&str, Value)]) -> (StreamParser, Arc<StdMutex<Vec<TokenEvent>>>) {
        let executor = Arc::new(MapExecutor {
            results: results
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        });
        let (sink, events) = collecting_sink();
        let parser = StreamParser::new(Some(executor), Arc::new(ContextFeedManager::new()), sink);
        (parser, events)
    }

    fn thoughts_concatenated(events: &[TokenEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                TokenEvent::Thought { content } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_simple_final_response() {
        let (mut parser, events) = parser_with(&[]);
        parser
            .feed("<thought>ok</thought><response final=\"true\">Hi</response>", true)
            .await;

        let events = events.lock().unwrap();
        assert_eq!(thoughts_concatenated(&events), "ok");
        assert!(events.iter().any(|e| matches!(
            e,
            TokenEvent::Response { content, is_final: true, fallback: false } if content == "Hi"
        )));
    }

    #[tokio::test]
    async fn test_chunk_split_invariance() {
        let input = "<thought>thinking hard about this</thought><response final=\"true\">All done</response>";

        let (mut whole, whole_events) = parser_with(&[]);
        whole.feed(input, true).await;

        let (mut split, split_events) = parser_with(&[]);
        let chars: Vec<String> = input.chars().map(|c| c.to_string()).collect();
        for (i, c) in chars.iter().enumerate() {
            split.feed(c, i == chars.len() - 1).await;
        }

        let whole_events = whole_events.lock().unwrap();
        let split_events = split_events.lock().unwrap();
        // Thought chunk boundaries may differ; the reconstructed text and the
        // non-thought events must not.
        assert_eq!(
            thoughts_concatenated(&whole_events),
            thoughts_concatenated(&split_events)
        );
        let non_thought = |evs: &[TokenEvent]| -> Vec<TokenEvent> {
            evs.iter()
                .filter(|e| !matches!(e, TokenEvent::Thought { .. }))
                .cloned()
                .collect()
        };
        assert_eq!(non_thought(&whole_events), non_thought(&split_events));
    }

    #[tokio::test]
    async fn test_action_with_substitution() {
        let (mut parser, events) = parser_with(&[("add", json!(7))]);
        let input = concat!(
            "<thought>compute</thought>",
            "<action type=\"tool\" mode=\"async\" id=\"a1\">",
            "{\"name\":\"add\",\"parameters\":{\"x\":2,\"y\":3},\"output_key\":\"sum\"}",
            "</action>",
            "<response final=\"true\">= $sum</response>",
        );
        parser.feed(input, true).await;

        let events = events.lock().unwrap();
        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e {
                TokenEvent::Thought { .. } => "thought",
                TokenEvent::ActionStart { .. } => "start",
                TokenEvent::ActionComplete { .. } => "complete",
                TokenEvent::Response { .. } => "response",
                TokenEvent::ContextFeed { .. } => "feed",
                TokenEvent::Error { .. } => "error",
            })
            .collect();
        assert_eq!(kinds, vec!["thought", "start", "complete", "response"]);
        assert!(events.iter().any(|e| matches!(
            e,
            TokenEvent::Response { content, .. } if content == "= 7"
        )));
    }

    #[tokio::test]
    async fn test_plain_text_fallback() {
        let (mut parser, events) = parser_with(&[]);
        parser.feed("hello", true).await;

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            TokenEvent::Response {
                content: "hello".into(),
                is_final: true,
                fallback: true,
            }
        );
    }

    #[tokio::test]
    async fn test_no_fallback_after_tagged_output() {
        let (mut parser, events) = parser_with(&[]);
        parser
            .feed("<response final=\"true\">done</response>trailing junk", true)
            .await;

        let events = events.lock().unwrap();
        let responses = events
            .iter()
            .filter(|e| matches!(e, TokenEvent::Response { .. }))
            .count();
        assert_eq!(responses, 1);
    }

    #[tokio::test]
    async fn test_fence_stripping_around_body() {
        let fenced = "```xml\n<thought>ok</thought><response final=\"true\">Hi</response>\n```";
        let (mut parser, events) = parser_with(&[]);
        parser.feed(fenced, true).await;

        let events = events.lock().unwrap();
        assert_eq!(thoughts_concatenated(&events), "ok");
        assert!(events.iter().any(|e| matches!(
            e,
            TokenEvent::Response { content, is_final: true, .. } if content == "Hi"
        )));
    }

    #[tokio::test]
    async fn test_backticks_mid_line_preserved() {
        let (mut parser, events) = parser_with(&[]);
        parser
            .feed("<thought>use ``` for fences</thought>", true)
            .await;
        let events = events.lock().unwrap();
        assert_eq!(thoughts_concatenated(&events), "use ``` for fences");
    }

    #[tokio::test]
    async fn test_embedded_action_returns_to_thought() {
        let (mut parser, events) = parser_with(&[("noop", json!(null))]);
        let input = concat!(
            "<thought>before ",
            "<action type=\"tool\" mode=\"sync\" id=\"a1\">{\"name\":\"noop\"}</action>",
            " after</thought>",
        );
        parser.feed(input, true).await;

        let events = events.lock().unwrap();
        assert_eq!(thoughts_concatenated(&events), "before  after");
        let started = events
            .iter()
            .find_map(|e| match e {
                TokenEvent::ActionStart { action } => Some(action.clone()),
                _ => None,
            })
            .expect("action started");
        assert!(started.embedded_in_thought);
    }

    #[tokio::test]
    async fn test_malformed_action_emits_error_and_continues() {
        let (mut parser, events) = parser_with(&[]);
        let input = concat!(
            "<action id=\"bad\">this is not json</action>",
            "<response final=\"true\">still here</response>",
        );
        parser.feed(input, true).await;

        let events = events.lock().unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, TokenEvent::Error { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            TokenEvent::Response { content, .. } if content == "still here"
        )));
    }

    #[tokio::test]
    async fn test_inline_context_feed_registered() {
        let (mut parser, events) = parser_with(&[]);
        let input = concat!(
            "<context_feed id=\"notes\" type=\"static\">remember me</context_feed>",
            "<response final=\"true\">note: $notes</response>",
        );
        parser.feed(input, true).await;

        let events = events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            TokenEvent::ContextFeed { feed_id, content }
                if feed_id == "notes" && content == "remember me"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            TokenEvent::Response { content, .. } if content == "note: remember me"
        )));
    }

    #[tokio::test]
    async fn test_non_final_response_detected() {
        let (mut parser, events) = parser_with(&[]);
        parser
            .feed("<response final=\"false\">partial</response>", true)
            .await;
        let events = events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            TokenEvent::Response { content, is_final: false, .. } if content == "partial"
        )));
    }

    #[tokio::test]
    async fn test_unterminated_response_flushed() {
        let (mut parser, events) = parser_with(&[]);
        parser
            .feed("<response final=\"true\">cut off mid", true)
            .await;
        let events = events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            TokenEvent::Response { content, is_final: true, fallback: false } if content == "cut off mid"
        )));
    }

    #[tokio::test]
    async fn test_unterminated_action_dropped() {
        let (mut parser, events) = parser_with(&[]);
        parser.feed("<action id=\"a\">{\"name\":\"t\"", true).await;
        let events = events.lock().unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, TokenEvent::Error { context, .. } if context == "action")));
        assert!(!events
            .iter()
            .any(|e| matches!(e, TokenEvent::ActionStart { .. })));
    }

    #[tokio::test]
    async fn test_thought_reconstruction_across_chunks() {
        let text = "line one\nline two with more than ten bytes\nend";
        let input = format!("<thought>{}</thought>", text);
        let (mut parser, events) = parser_with(&[]);
        for chunk in input.as_bytes().chunks(3) {
            parser.feed(std::str::from_utf8(chunk).unwrap(), false).await;
        }
        parser.feed("", true).await;

        let events = events.lock().unwrap();
        assert_eq!(thoughts_concatenated(&events), text);
    }

    #[tokio::test]
    async fn test_angle_bracket_inside_thought() {
        let (mut parser, events) = parser_with(&[]);
        parser
            .feed("<thought>a < b and 2 > 1</thought>", true)
            .await;
        let events = events.lock().unwrap();
        assert_eq!(thoughts_concatenated(&events), "a < b and 2 > 1");
    }

    #[tokio::test]
    async fn test_reset_clears_results_keeps_feeds() {
        let (mut parser, _) = parser_with(&[("add", json!(1))]);
        parser
            .feed(
                "<action mode=\"sync\" id=\"a1\">{\"name\":\"add\"}</action><context_feed id=\"f\">kept</context_feed>",
                true,
            )
            .await;
        assert!(parser.store().lock().await.get("a1").is_some());

        parser.reset().await;
        let store = parser.store();
        let store = store.lock().await;
        assert!(store.get("a1").is_none());
        assert_eq!(store.resolve_str("$f"), "kept");
    }

    #[tokio::test]
    async fn test_single_quoted_final_attr() {
        let (mut parser, events) = parser_with(&[]);
        parser
            .feed("<response final='false'>keep going</response>", true)
            .await;
        let events = events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            TokenEvent::Response { is_final: false, .. }
        )));
    }
}
