//! Agent module - the multi-iteration loop around the streaming parser
//!
//! The agent loop wires the pieces together for one conversation:
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐
//! │ TokenSource │────▶│ StreamParser│────▶│ActionSchedulr│
//! │  (model)    │     │   (C5)      │     │    (C4)      │
//! └─────────────┘     └─────────────┘     └──────────────┘
//!        ▲                   │                    │
//!        │                   ▼                    ▼
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐
//! │PromptBuilder│◀────│  AgentLoop  │     │ActionExecutor│
//! │ + feeds     │     │   (C6)      │     │  (external)  │
//! └─────────────┘     └─────────────┘     └──────────────┘
//! ```
//!
//! Each user prompt may span several model iterations: a
//! `<response final="false">` hands control back to the loop, which appends
//! the iteration's action results to the history and asks the model to
//! continue.

pub mod history;
mod r#loop;
mod prompt;

pub use history::{History, HistoryRecord};
pub use prompt::PromptBuilder;
pub use r#loop::{AgentLoop, PromptOutcome};
