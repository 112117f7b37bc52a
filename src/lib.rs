//! Cortex - streaming agent runtime core
//!
//! An agentic runtime built around a streaming execution protocol: model
//! output is parsed token by token, actions embedded in the stream are
//! scheduled and executed while the model is still generating, and `$name`
//! references in responses resolve against the results. A non-final response
//! hands control back to the agent loop for another iteration.
//!
//! The crate deliberately stops at two seams: a [`exec::TokenSource`]
//! yielding model output chunks, and an [`exec::ActionExecutor`] performing
//! side effects. Providers, tool runtimes and service lifecycles live
//! outside.

pub mod agent;
pub mod config;
pub mod error;
pub mod exec;
pub mod feeds;
pub mod protocol;

pub use agent::{AgentLoop, History, PromptOutcome};
pub use config::AgentConfig;
pub use error::{CortexError, Result};
pub use exec::{ActionExecutor, TokenChunk, TokenSource, TokenStream};
pub use feeds::ContextFeedManager;
pub use protocol::{
    Action, ActionType, ContextFeed, EventSink, ExecutionMode, FeedKind, StreamParser,
    TokenCallback, TokenEvent, VariableStore,
};
