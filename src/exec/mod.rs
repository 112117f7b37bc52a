//! External collaborator seams
//!
//! The core has exactly two interfaces to the outside world: an
//! [`ActionExecutor`] that performs side effects on behalf of parsed
//! actions, and a [`TokenSource`] that streams model output for a prompt.
//! Model clients, tool runtimes and service lifecycles all live behind
//! these traits.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::error::Result;
use crate::protocol::Action;

/// One chunk of model output.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenChunk {
    /// Raw text of the chunk.
    pub text: String,
    /// True on the last chunk of the stream.
    pub is_final: bool,
}

impl TokenChunk {
    /// An intermediate chunk.
    pub fn part(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    /// The final chunk of a stream.
    pub fn last(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Ordered stream of token chunks, ending at the first `is_final` chunk.
pub type TokenStream = BoxStream<'static, Result<TokenChunk>>;

/// Streams model output for a prompt.
///
/// Implementations wrap a model provider (HTTP + SSE, a local model, a test
/// script). Chunks must be delivered in order; the stream ends after the
/// chunk marked `is_final`.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Start generating for `prompt` and return the chunk stream.
    async fn stream(&self, prompt: &str) -> Result<TokenStream>;
}

/// Executes an action and returns its JSON result.
///
/// This is the core's sole interface for side effects: tool invocations,
/// sub-agent calls, persistent-service endpoints. Errors are surfaced as
/// `Error` events and fed into the scheduler's retry/skip policy; they never
/// abort the stream.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
/// use cortex::exec::ActionExecutor;
/// use cortex::protocol::Action;
/// use cortex::error::Result;
///
/// struct Adder;
///
/// #[async_trait]
/// impl ActionExecutor for Adder {
///     async fn execute(&self, action: &Action) -> Result<Value> {
///         let x = action.parameters["x"].as_i64().unwrap_or(0);
///         let y = action.parameters["y"].as_i64().unwrap_or(0);
///         Ok(json!(x + y))
///     }
/// }
/// ```
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Execute `action` and return its result.
    async fn execute(&self, action: &Action) -> Result<Value>;
}
