//! Streaming execution protocol
//!
//! The protocol parses model output token by token, interleaving reasoning
//! with side-effectful action execution while the model is still generating:
//!
//! - [`scanner`] detects tags and attributes in the growing buffer
//! - [`action`] parses the lenient JSON inside `<action>` tags
//! - [`variables`] stores action results and substitutes `$name` references
//! - [`scheduler`] releases actions when their dependencies complete and
//!   dispatches them per execution mode
//! - [`parser`] is the state machine tying it all together, emitting typed
//!   [`TokenEvent`]s to the caller's sink

pub mod action;
pub mod events;
pub mod parser;
pub mod scanner;
pub mod scheduler;
pub mod types;
pub mod variables;

pub use events::{EventSink, TokenCallback, TokenEvent};
pub use parser::{ParserState, StreamParser};
pub use scheduler::ActionScheduler;
pub use types::{Action, ActionType, ContextFeed, ExecutionMode, FeedKind, ParsedResponse};
pub use variables::VariableStore;
