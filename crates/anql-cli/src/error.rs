//! Error types for anql operations.
//!
//! Errors are grouped by where they come from so that callers can decide how
//! to report them:
//!
//! - **Transport**: `Transport`, `Io`
//! - **Service**: `Service`, `Http`
//! - **Query lifecycle**: `QueryFailed`, `Timeout`, `MissingResultUrl`
//! - **Local input**: `TimeWindow`, `Parse`, `Config`, `TableNotFound`
//! - **Authentication**: `Auth`
//!
//! A user pressing Escape is not an error; see
//! [`QueryOutcome::Cancelled`](crate::query::QueryOutcome::Cancelled).

use thiserror::Error;

use crate::timewindow::TimeWindowError;

/// Convenience alias used by every fallible library function.
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    /// Connection, DNS or timeout failure from the HTTP client. Never retried.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Structured `{code, message}` error returned by the service.
    #[error("API error [{code}]: {message}")]
    Service { code: String, message: String },

    /// HTTP error status without a structured error body.
    #[error("HTTP {status} error: {body}")]
    Http { status: u16, body: String },

    /// The service reported the query as FAILED. Carries the raw status body.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// The poll loop ran out of attempts before the query completed.
    #[error("query did not complete within timeout, final status: {last_status}")]
    Timeout { last_status: String },

    #[error("query completed but the service returned no result URL")]
    MissingResultUrl,

    #[error("failed to parse {what}: {source}")]
    Parse {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    TimeWindow(#[from] TimeWindowError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("table '{0}' not found")]
    TableNotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication failed: {0}")]
    Auth(String),
}

impl CliError {
    /// Build a parse error for the named payload.
    pub fn parse(what: &'static str, source: serde_json::Error) -> Self {
        CliError::Parse { what, source }
    }
}
