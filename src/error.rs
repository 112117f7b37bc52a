//! Error types for Cortex
//!
//! This module defines the error type used throughout the crate. Uses
//! `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.
//!
//! Most faults in the streaming protocol are recoverable by design: malformed
//! action JSON, executor failures, and protocol violations are surfaced as
//! [`TokenEvent::Error`](crate::protocol::TokenEvent) on the event stream and
//! never abort parsing. The variants below cover the remaining cases that do
//! propagate to callers: configuration mistakes, token-source I/O failures,
//! and serialization errors.

use thiserror::Error;

/// The primary error type for Cortex operations.
#[derive(Error, Debug)]
pub enum CortexError {
    /// Configuration errors (invalid config, missing executor for a
    /// non-internal action, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Protocol parse errors (malformed action body, bad attribute syntax).
    /// These are normally reported as events; the variant exists for the
    /// parsing helpers that return `Result` internally.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Action execution errors (executor failure, timeout).
    #[error("Execution error: {0}")]
    Execution(String),

    /// Token source errors (the model stream failed or was interrupted).
    #[error("Token source error: {0}")]
    Source(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for Cortex operations.
pub type Result<T> = std::result::Result<T, CortexError>;
