//! Typed token events and the emission sink
//!
//! The parser communicates with the outside world through a stream of typed
//! events delivered to a caller-supplied callback. Internally everything is a
//! [`TokenEvent`]; the callback is simply the sink at the end of the pipe.
//!
//! Events may be produced both by the parse pass and by background completion
//! tasks, so emission goes through a single gate to keep the callback's view
//! totally ordered.

use std::sync::{Arc, Mutex};

use super::types::Action;

/// An event emitted to the UI callback while the model streams.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenEvent {
    /// Incremental reasoning text from inside a `<thought>` block.
    Thought {
        /// The chunk of thought text since the last emission.
        content: String,
    },
    /// An action has been released for dispatch; executor invocation is
    /// imminent or in flight.
    ActionStart {
        /// The fully parsed action.
        action: Box<Action>,
    },
    /// The executor returned (or the action was synthetically completed);
    /// the result is stored.
    ActionComplete {
        /// Action identifier.
        id: String,
        /// Key under which the result was registered.
        output_key: String,
        /// Whether execution succeeded.
        success: bool,
    },
    /// A `<response>` body, variables already substituted.
    Response {
        /// The resolved response content.
        content: String,
        /// Whether this response terminates the iteration loop.
        is_final: bool,
        /// True for the synthetic plain-text fallback emitted when the model
        /// ignored the protocol entirely.
        fallback: bool,
    },
    /// A dynamic context feed received inline in the stream.
    ContextFeed {
        /// Feed identifier.
        feed_id: String,
        /// Feed content.
        content: String,
    },
    /// A recoverable parse or execution failure.
    Error {
        /// Human-readable description.
        message: String,
        /// What the error relates to (an action id, a tag name, ...).
        context: String,
    },
}

/// The caller-supplied event callback.
pub type TokenCallback = Arc<dyn Fn(&TokenEvent) + Send + Sync>;

/// Serializing wrapper around the token callback.
///
/// Cloneable and cheap to share; every emitter (the parse pass, async
/// completion tasks) goes through the same gate so the callback never sees
/// interleaved invocations.
#[derive(Clone)]
pub struct EventSink {
    callback: TokenCallback,
    gate: Arc<Mutex<()>>,
}

impl EventSink {
    /// Wrap a callback in a serializing sink.
    pub fn new(callback: TokenCallback) -> Self {
        Self {
            callback,
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// A sink that drops every event. Useful for tests and headless runs.
    pub fn discard() -> Self {
        Self::new(Arc::new(|_| {}))
    }

    /// Emit one event through the gate.
    pub fn emit(&self, event: TokenEvent) {
        let _serialized = self.gate.lock().ok();
        (self.callback)(&event);
    }

    /// Emit an [`TokenEvent::Error`].
    pub fn error(&self, message: impl Into<String>, context: impl Into<String>) {
        self.emit(TokenEvent::Error {
            message: message.into(),
            context: context.into(),
        });
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}
