//! Action scheduling and dispatch
//!
//! The scheduler tracks completion state, holds back actions whose
//! `depends_on` set is not yet satisfied, and dispatches runnable actions to
//! the external executor according to their execution mode:
//!
//! - `sync` blocks the current parse pass until the executor returns
//! - `async` runs on a background task while parsing continues
//! - `fire_and_forget` is marked completed immediately with a synthetic
//!   result and never awaited
//!
//! After any completion the pending list is re-scanned in insertion order,
//! restarting from the front, which keeps dependency release deterministic
//! even though async completion order is not.
//!
//! Internal actions (`type = internal`) never reach the executor; they
//! mutate the variable store and the context-feed registry in-process.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::CortexError;
use crate::exec::ActionExecutor;
use crate::feeds::ContextFeedManager;

use super::events::{EventSink, TokenEvent};
use super::types::{Action, ActionType, ContextFeed, ExecutionMode, FeedKind};
use super::variables::VariableStore;

#[derive(Default)]
struct SchedulerState {
    /// Completion flags. `false` means "finished but failed hard": the id is
    /// known, dependents must never run.
    completed: HashMap<String, bool>,
    /// Actions waiting for their dependency set, in declaration order.
    pending: Vec<Action>,
    /// Every id ever submitted in this parser lifetime.
    known: HashSet<String>,
    /// Join handles for in-flight async executions.
    inflight: Vec<JoinHandle<()>>,
    /// First programmer error encountered (e.g. no executor configured);
    /// surfaced to the caller of `prompt` after the stream completes.
    fatal: Option<String>,
}

/// Dependency-aware dispatcher between the stream parser and the executor.
///
/// Cheap to clone; all state lives behind shared mutexes.
#[derive(Clone)]
pub struct ActionScheduler {
    state: Arc<Mutex<SchedulerState>>,
    store: Arc<Mutex<VariableStore>>,
    feeds: Arc<ContextFeedManager>,
    executor: Option<Arc<dyn ActionExecutor>>,
    sink: EventSink,
}

impl ActionScheduler {
    /// Create a scheduler wired to the shared store, feed registry and sink.
    pub fn new(
        executor: Option<Arc<dyn ActionExecutor>>,
        store: Arc<Mutex<VariableStore>>,
        feeds: Arc<ContextFeedManager>,
        sink: EventSink,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(SchedulerState::default())),
            store,
            feeds,
            executor,
            sink,
        }
    }

    /// Submit a freshly parsed action.
    ///
    /// Runnable actions are released immediately (blocking this call for
    /// `sync` mode); actions with unsatisfied dependencies are queued.
    /// Duplicate ids are rejected with a warning.
    pub async fn submit(&self, action: Action) {
        enum Verdict {
            Duplicate(String),
            Queued,
            Run(Action),
        }
        let verdict = {
            let mut state = self.state.lock().await;
            if !state.known.insert(action.id.clone()) {
                Verdict::Duplicate(action.id)
            } else if runnable(&state, &action) {
                Verdict::Run(action)
            } else {
                debug!(id = %action.id, deps = ?action.depends_on, "action queued on dependencies");
                state.pending.push(action);
                Verdict::Queued
            }
        };
        match verdict {
            Verdict::Duplicate(id) => {
                warn!(id = %id, "duplicate action id; rejecting");
                self.sink
                    .error(format!("duplicate action id '{}'", id), id);
            }
            Verdict::Run(action) => self.release(action).await,
            Verdict::Queued => {}
        }
    }

    /// Whether the given id has completed successfully (or failed with
    /// `skip_on_error`).
    pub async fn is_completed(&self, id: &str) -> bool {
        self.state
            .lock()
            .await
            .completed
            .get(id)
            .copied()
            .unwrap_or(false)
    }

    /// Number of actions still waiting on dependencies.
    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Wait for every tracked in-flight execution to finish.
    ///
    /// Called before a response resolves its variables and at the end of an
    /// iteration, so substitution always reads a settled store.
    /// Fire-and-forget executions are not tracked and are not awaited.
    pub async fn quiesce(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut state = self.state.lock().await;
                state.inflight.drain(..).collect()
            };
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    error!(error = %e, "action task panicked");
                }
            }
        }
    }

    /// Emit an error for every still-pending action and drop them.
    ///
    /// Called at end of iteration: anything left in the queue has a
    /// dependency that never completed, and intentionally never runs.
    pub async fn drain_orphans(&self) {
        let orphans: Vec<Action> = {
            let mut state = self.state.lock().await;
            state.pending.drain(..).collect()
        };
        for action in orphans {
            warn!(id = %action.id, deps = ?action.depends_on, "abandoning action; dependencies never satisfied");
            self.sink.error(
                format!(
                    "action '{}' abandoned: dependencies never satisfied",
                    action.id
                ),
                action.id,
            );
        }
    }

    /// Clear completion tracking between prompts. In-flight work must have
    /// been quiesced first.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.completed.clear();
        state.pending.clear();
        state.known.clear();
        state.fatal = None;
    }

    /// Take the first fatal (programmer/configuration) error, if any.
    pub async fn take_fatal(&self) -> Option<CortexError> {
        self.state.lock().await.fatal.take().map(CortexError::Config)
    }

    /// Release one runnable action: emit `ActionStart` and dispatch per mode.
    async fn release(&self, action: Action) {
        self.sink.emit(TokenEvent::ActionStart {
            action: Box::new(action.clone()),
        });

        if action.kind == ActionType::Internal {
            let success = self.run_internal(&action).await;
            self.finish(&action, true).await;
            self.sink.emit(TokenEvent::ActionComplete {
                id: action.id.clone(),
                output_key: action.output_key.clone(),
                success,
            });
            self.release_ready().await;
            return;
        }

        match action.mode {
            ExecutionMode::Sync => {
                self.run_to_completion(action).await;
                self.release_ready().await;
            }
            ExecutionMode::Async => {
                let sched = self.clone();
                let handle = tokio::spawn(async move {
                    sched.run_to_completion(action).await;
                    sched.release_ready().await;
                });
                self.state.lock().await.inflight.push(handle);
            }
            ExecutionMode::FireAndForget => {
                let synthetic = json!({"status": "dispatched"});
                {
                    let mut store = self.store.lock().await;
                    store.put(&action.output_key, synthetic.clone());
                    store.put(&action.id, synthetic);
                }
                self.state
                    .lock()
                    .await
                    .completed
                    .insert(action.id.clone(), true);
                self.sink.emit(TokenEvent::ActionComplete {
                    id: action.id.clone(),
                    output_key: action.output_key.clone(),
                    success: true,
                });

                if let Some(executor) = self.executor.clone() {
                    let sched = self.clone();
                    tokio::spawn(async move {
                        match invoke(&executor, &action).await {
                            Ok(value) => {
                                // A real result that does arrive overwrites
                                // the synthetic marker.
                                let mut store = sched.store.lock().await;
                                store.put(&action.output_key, value.clone());
                                store.put(&action.id, value);
                            }
                            Err(e) => {
                                warn!(id = %action.id, error = %e, "fire-and-forget action failed");
                            }
                        }
                    });
                } else {
                    warn!(id = %action.id, "no executor for fire-and-forget action");
                }
                self.release_ready().await;
            }
        }
    }

    /// Scan `pending` in insertion order; dispatch the first runnable action
    /// and restart the scan until nothing is runnable.
    ///
    /// Boxed so the release → spawn → release-ready cycle does not produce an
    /// infinitely recursive future type.
    fn release_ready(&self) -> BoxFuture<'static, ()> {
        let sched = self.clone();
        Box::pin(async move {
            loop {
                let next = {
                    let mut state = sched.state.lock().await;
                    match state.pending.iter().position(|a| runnable(&state, a)) {
                        Some(idx) => Some(state.pending.remove(idx)),
                        None => None,
                    }
                };
                match next {
                    Some(action) => sched.release(action).await,
                    None => break,
                }
            }
        })
    }

    /// Execute one action through the executor, with timeout and retries,
    /// then record the result and completion flag.
    async fn run_to_completion(&self, action: Action) {
        let Some(executor) = self.executor.clone() else {
            warn!(id = %action.id, "no action executor configured");
            self.state
                .lock()
                .await
                .completed
                .insert(action.id.clone(), false);
            let message = format!(
                "no action executor configured for action '{}'",
                action.id
            );
            self.sink.error(message.clone(), action.id.clone());
            let mut state = self.state.lock().await;
            state.fatal.get_or_insert(message);
            return;
        };

        let mut attempt: u32 = 0;
        let result = loop {
            match invoke(&executor, &action).await {
                Ok(value) => break Ok(value),
                Err(e) if attempt < action.retry_count => {
                    attempt += 1;
                    warn!(
                        id = %action.id,
                        attempt,
                        max = action.retry_count,
                        error = %e,
                        "action failed; retrying"
                    );
                }
                Err(e) => break Err(e),
            }
        };

        match result {
            Ok(value) => {
                {
                    let mut store = self.store.lock().await;
                    store.put(&action.output_key, value.clone());
                    if action.output_key != action.id {
                        store.put(&action.id, value);
                    }
                }
                self.finish(&action, true).await;
                info!(id = %action.id, name = %action.name, "action completed");
                self.sink.emit(TokenEvent::ActionComplete {
                    id: action.id.clone(),
                    output_key: action.output_key.clone(),
                    success: true,
                });
            }
            Err(e) => {
                {
                    let mut store = self.store.lock().await;
                    let err_value = json!({"error": e.to_string()});
                    store.put(&action.output_key, err_value.clone());
                    if action.output_key != action.id {
                        store.put(&action.id, err_value);
                    }
                }
                self.finish(&action, action.skip_on_error).await;
                error!(id = %action.id, name = %action.name, error = %e, "action failed");
                self.sink.emit(TokenEvent::Error {
                    message: format!("action '{}' failed: {}", action.id, e),
                    context: action.id.clone(),
                });
            }
        }
    }

    async fn finish(&self, action: &Action, completed: bool) {
        self.state
            .lock()
            .await
            .completed
            .insert(action.id.clone(), completed);
    }

    /// Handle an internal action in-process. Returns whether it succeeded.
    async fn run_internal(&self, action: &Action) -> bool {
        debug!(name = %action.name, "executing internal action");
        let params = &action.parameters;
        match action.name.as_str() {
            "add_context_feed" => {
                let Some(id) = params.get("id").and_then(Value::as_str) else {
                    warn!("add_context_feed missing 'id' parameter");
                    return false;
                };
                let feed = ContextFeed {
                    id: id.to_string(),
                    kind: params
                        .get("type")
                        .and_then(Value::as_str)
                        .map(FeedKind::parse)
                        .unwrap_or(FeedKind::Static),
                    source: params.get("source").cloned().unwrap_or(Value::Null),
                    content: params
                        .get("content")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    cache_ttl: params.get("cache_ttl").and_then(Value::as_u64).unwrap_or(0),
                    max_tokens: params
                        .get("max_tokens")
                        .and_then(Value::as_u64)
                        .unwrap_or(0) as usize,
                    refreshed_at: None,
                };
                self.feeds.register(feed).await;
                self.sync_feed_contents().await;
                true
            }
            "remove_context_feed" => {
                let Some(id) = params.get("id").and_then(Value::as_str) else {
                    warn!("remove_context_feed missing 'id' parameter");
                    return false;
                };
                let removed = self.feeds.remove(id).await;
                self.sync_feed_contents().await;
                removed
            }
            "set_variable" => {
                let (Some(key), Some(value)) = (
                    params.get("key").and_then(Value::as_str),
                    params.get("value"),
                ) else {
                    warn!("set_variable missing 'key' or 'value'");
                    return false;
                };
                self.store.lock().await.put(key, value.clone());
                true
            }
            "delete_variable" => {
                let Some(key) = params.get("key").and_then(Value::as_str) else {
                    warn!("delete_variable missing 'key' parameter");
                    return false;
                };
                self.store.lock().await.remove(key).is_some()
            }
            "clear_context" => {
                self.store.lock().await.clear_values();
                info!("cleared action results");
                true
            }
            other => {
                warn!(name = %other, "unknown internal action");
                false
            }
        }
    }

    /// Push the feed registry's current contents into the store's feed map.
    async fn sync_feed_contents(&self) {
        let contents = self.feeds.contents_map().await;
        self.store.lock().await.sync_feeds(contents);
    }
}

/// Whether every dependency of `action` is marked completed.
fn runnable(state: &SchedulerState, action: &Action) -> bool {
    action
        .depends_on
        .iter()
        .all(|dep| state.completed.get(dep).copied().unwrap_or(false))
}

/// Invoke the executor once, applying the action's timeout.
async fn invoke(
    executor: &Arc<dyn ActionExecutor>,
    action: &Action,
) -> crate::error::Result<Value> {
    if action.timeout_secs == 0 {
        return executor.execute(action).await;
    }
    match tokio::time::timeout(
        Duration::from_secs(action.timeout_secs),
        executor.execute(action),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(CortexError::Execution(format!(
            "action '{}' timed out after {}s",
            action.id, action.timeout_secs
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ActionExecutor;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Executor that maps action names to canned results and failures.
    struct MockExecutor {
        results: HashMap<String, Value>,
        failures: HashSet<String>,
        calls: AtomicUsize,
    }

    impl MockExecutor {
        fn returning(pairs: &[(&str, Value)]) -> Self {
            Self {
                results: pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
                failures: HashSet::new(),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(names: &[&str]) -> Self {
            Self {
                results: HashMap::new(),
                failures: names.iter().map(|s| s.to_string()).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ActionExecutor for MockExecutor {
        async fn execute(&self, action: &Action) -> crate::error::Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures.contains(&action.name) {
                return Err(CortexError::Execution(format!(
                    "mock failure for {}",
                    action.name
                )));
            }
            Ok(self
                .results
                .get(&action.name)
                .cloned()
                .unwrap_or(Value::Null))
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

    fn scheduler_with(
        executor: Option<Arc<dyn ActionExecutor>>,
    ) -> (
        ActionScheduler,
        Arc<Mutex<VariableStore>>,
        Arc<StdMutex<Vec<TokenEvent>>>,
    ) {
        let store = Arc::new(Mutex::new(VariableStore::default()));
        let feeds = Arc::new(ContextFeedManager::new());
        let (sink, events) = collecting_sink();
        let sched = ActionScheduler::new(executor, Arc::clone(&store), feeds, sink);
        (sched, store, events)
    }

    fn sync_action(id: &str, name: &str) -> Action {
        let mut a = Action::new(id, name);
        a.mode = ExecutionMode::Sync;
        a
    }

    #[tokio::test]
    async fn test_sync_action_stores_result() {
        let exec = Arc::new(MockExecutor::returning(&[("add", json!(7))]));
        let (sched, store, events) = scheduler_with(Some(exec));

        let mut action = sync_action("a1", "add");
        action.output_key = "sum".into();
        sched.submit(action).await;

        assert_eq!(store.lock().await.get("sum"), Some(&json!(7)));
        assert_eq!(store.lock().await.get("a1"), Some(&json!(7)));
        assert!(sched.is_completed("a1").await);

        let events = events.lock().unwrap();
        assert!(matches!(events[0], TokenEvent::ActionStart { .. }));
        assert!(matches!(
            events[1],
            TokenEvent::ActionComplete { success: true, .. }
        ));
    }

    #[tokio::test]
    async fn test_async_action_completes_after_quiesce() {
        let exec = Arc::new(MockExecutor::returning(&[("add", json!(3))]));
        let (sched, store, _) = scheduler_with(Some(exec));

        sched.submit(Action::new("a1", "add")).await;
        sched.quiesce().await;

        assert!(sched.is_completed("a1").await);
        assert_eq!(store.lock().await.get("a1"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn test_dependency_holds_until_upstream_completes() {
        let exec = Arc::new(MockExecutor::returning(&[("one", json!(1)), ("two", json!(2))]));
        let (sched, store, events) = scheduler_with(Some(exec));

        let mut b2 = Action::new("b2", "two");
        b2.depends_on = vec!["b1".into()];
        sched.submit(b2).await;
        assert_eq!(sched.pending_len().await, 1);

        sched.submit(Action::new("b1", "one")).await;
        sched.quiesce().await;

        assert!(sched.is_completed("b1").await);
        assert!(sched.is_completed("b2").await);
        assert_eq!(store.lock().await.get("b2"), Some(&json!(2)));

        // b1 must have started before b2.
        let events = events.lock().unwrap();
        let starts: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                TokenEvent::ActionStart { action } => Some(action.id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(starts, vec!["b1".to_string(), "b2".to_string()]);
    }

    #[tokio::test]
    async fn test_hard_failure_orphans_dependents() {
        let exec = Arc::new(MockExecutor::failing(&["boom"]));
        let (sched, _, events) = scheduler_with(Some(exec));

        sched.submit(Action::new("b1", "boom")).await;
        let mut b2 = Action::new("b2", "two");
        b2.depends_on = vec!["b1".into()];
        sched.submit(b2).await;

        sched.quiesce().await;
        assert!(!sched.is_completed("b1").await);
        assert!(!sched.is_completed("b2").await);
        assert_eq!(sched.pending_len().await, 1);

        sched.drain_orphans().await;
        assert_eq!(sched.pending_len().await, 0);

        let events = events.lock().unwrap();
        // No ActionStart for b2, ever.
        assert!(!events.iter().any(|e| matches!(
            e,
            TokenEvent::ActionStart { action } if action.id == "b2"
        )));
        // One failure error for b1 and one orphan error for b2.
        assert!(events
            .iter()
            .any(|e| matches!(e, TokenEvent::Error { context, .. } if context == "b1")));
        assert!(events
            .iter()
            .any(|e| matches!(e, TokenEvent::Error { context, .. } if context == "b2")));
    }

    #[tokio::test]
    async fn test_skip_on_error_releases_dependents() {
        let exec = Arc::new(MockExecutor::failing(&["boom"]));
        let (sched, store, _) = scheduler_with(Some(exec));

        let mut b1 = Action::new("b1", "boom");
        b1.skip_on_error = true;
        sched.submit(b1).await;
        let mut b2 = Action::new("b2", "missing");
        b2.depends_on = vec!["b1".into()];
        sched.submit(b2).await;

        sched.quiesce().await;
        assert!(sched.is_completed("b1").await);
        assert!(sched.is_completed("b2").await);
        // The failure was still recorded under the output key.
        assert!(store.lock().await.get("b1").unwrap().get("error").is_some());
    }

    #[tokio::test]
    async fn test_fire_and_forget_synthetic_result() {
        let exec = Arc::new(MockExecutor::returning(&[("bg", json!("done"))]));
        let (sched, store, events) = scheduler_with(Some(exec));

        let mut action = Action::new("f1", "bg");
        action.mode = ExecutionMode::FireAndForget;
        sched.submit(action).await;

        // Completed immediately, before the executor has run.
        assert!(sched.is_completed("f1").await);
        assert_eq!(
            store.lock().await.get("f1"),
            Some(&json!({"status": "dispatched"}))
        );
        let has_complete = events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, TokenEvent::ActionComplete { id, .. } if id == "f1"));
        assert!(has_complete);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let exec = Arc::new(MockExecutor::returning(&[("t", json!(1))]));
        let (sched, _, events) = scheduler_with(Some(exec));

        sched.submit(sync_action("a1", "t")).await;
        sched.submit(sync_action("a1", "t")).await;

        let events = events.lock().unwrap();
        let starts = events
            .iter()
            .filter(|e| matches!(e, TokenEvent::ActionStart { .. }))
            .count();
        assert_eq!(starts, 1);
        assert!(events
            .iter()
            .any(|e| matches!(e, TokenEvent::Error { message, .. } if message.contains("duplicate"))));
    }

    #[tokio::test]
    async fn test_retry_count_retries() {
        struct FailOnce {
            calls: AtomicUsize,
        }
        #[async_trait]
        impl ActionExecutor for FailOnce {
            async fn execute(&self, _action: &Action) -> crate::error::Result<Value> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(CortexError::Execution("first attempt fails".into()))
                } else {
                    Ok(json!("second attempt"))
                }
            }
        }

        let exec = Arc::new(FailOnce {
            calls: AtomicUsize::new(0),
        });
        let (sched, store, _) = scheduler_with(Some(exec));

        let mut action = sync_action("r1", "flaky");
        action.retry_count = 1;
        sched.submit(action).await;

        assert!(sched.is_completed("r1").await);
        assert_eq!(store.lock().await.get("r1"), Some(&json!("second attempt")));
    }

    #[tokio::test]
    async fn test_missing_executor_is_fatal() {
        let (sched, _, events) = scheduler_with(None);
        sched.submit(sync_action("a1", "t")).await;

        assert!(!sched.is_completed("a1").await);
        let fatal = sched.take_fatal().await;
        assert!(matches!(fatal, Some(CortexError::Config(_))));
        assert!(events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, TokenEvent::Error { .. })));
    }

    #[tokio::test]
    async fn test_internal_set_and_delete_variable() {
        let (sched, store, _) = scheduler_with(None);

        let mut set = Action::new("i1", "set_variable");
        set.kind = ActionType::Internal;
        set.parameters = json!({"key": "greeting", "value": "hello"});
        sched.submit(set).await;
        assert_eq!(store.lock().await.get("greeting"), Some(&json!("hello")));

        let mut del = Action::new("i2", "delete_variable");
        del.kind = ActionType::Internal;
        del.parameters = json!({"key": "greeting"});
        sched.submit(del).await;
        assert!(store.lock().await.get("greeting").is_none());
    }

    #[tokio::test]
    async fn test_internal_clear_context_keeps_feeds() {
        let (sched, store, _) = scheduler_with(None);
        store.lock().await.put("x", json!(1));
        store.lock().await.set_feed("f", "feed content");

        let mut clear = Action::new("i1", "clear_context");
        clear.kind = ActionType::Internal;
        sched.submit(clear).await;

        let store = store.lock().await;
        assert!(store.is_empty());
        assert_eq!(store.resolve_str("$f"), "feed content");
    }

    #[tokio::test]
    async fn test_internal_add_and_remove_context_feed() {
        let (sched, store, _) = scheduler_with(None);

        let mut add = Action::new("i1", "add_context_feed");
        add.kind = ActionType::Internal;
        add.parameters = json!({"id": "notes", "type": "static", "content": "remember this"});
        sched.submit(add).await;
        assert_eq!(
            store.lock().await.resolve_str("$notes"),
            "remember this"
        );

        let mut remove = Action::new("i2", "remove_context_feed");
        remove.kind = ActionType::Internal;
        remove.parameters = json!({"id": "notes"});
        sched.submit(remove).await;
        assert_eq!(store.lock().await.resolve_str("$notes"), "$notes");
    }

    #[tokio::test]
    async fn test_internal_never_reaches_executor() {
        let exec = Arc::new(MockExecutor::returning(&[]));
        let exec_dyn: Arc<dyn ActionExecutor> = Arc::clone(&exec) as Arc<dyn ActionExecutor>;
        let (sched, _, _) = scheduler_with(Some(exec_dyn));

        let mut internal = Action::new("i1", "clear_context");
        internal.kind = ActionType::Internal;
        sched.submit(internal).await;

        assert_eq!(exec.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_internal_action_fails() {
        let (sched, _, events) = scheduler_with(None);
        let mut action = Action::new("i1", "do_magic");
        action.kind = ActionType::Internal;
        sched.submit(action).await;

        // Internal actions always count as completed for dependency purposes.
        assert!(sched.is_completed("i1").await);
        let events = events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            TokenEvent::ActionComplete { success: false, .. }
        )));
    }

    #[tokio::test]
    async fn test_reset_clears_tracking() {
        let exec = Arc::new(MockExecutor::returning(&[("t", json!(1))]));
        let (sched, _, _) = scheduler_with(Some(exec));
        sched.submit(sync_action("a1", "t")).await;
        assert!(sched.is_completed("a1").await);

        sched.reset().await;
        assert!(!sched.is_completed("a1").await);
        // The id is free again after a reset.
        sched.submit(sync_action("a1", "t")).await;
        assert!(sched.is_completed("a1").await);
    }
}
