//! Query execution: submit, wait, poll, download, decode.
//!
//! One [`QueryRunner::execute`] call drives a query through its whole
//! lifecycle:
//!
//! ```text
//! Submitted -> InitialWait -> Polling -> Downloading -> Decompressing -> Decoding -> Done
//!                   |            |
//!                   +------------+--> Cancelled (Escape)
//! ```
//!
//! Only the initial wait and the sleeps between polls can be cancelled.
//! Once the status is `COMPLETED` the download runs to completion.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use crate::api::{AnalysisClient, StatusResponse};
use crate::config::PollConfig;
use crate::decoder::{self, ResultTable};
use crate::error::{CliError, Result};
use crate::progress::{CancelSignal, WaitScope};
use crate::rest_client::Transport;
use crate::scratch::{decompress_file, scratch_paths};
use crate::timewindow::{format_timestamp, TimeWindow};

/// A SQL statement plus the time window it runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub sql: String,
    pub window: TimeWindow,
}

impl Query {
    pub fn new(sql: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            sql: sql.into(),
            window,
        }
    }
}

/// Server-side query status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus {
    Submitted,
    Running,
    Exporting,
    Completed,
    Failed,
    Unknown(String),
}

impl QueryStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "SUBMITTED" => QueryStatus::Submitted,
            "RUNNING" => QueryStatus::Running,
            "EXPORTING" => QueryStatus::Exporting,
            "COMPLETED" => QueryStatus::Completed,
            "FAILED" => QueryStatus::Failed,
            other => QueryStatus::Unknown(other.to_string()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            QueryStatus::Submitted | QueryStatus::Unknown(_) => 0,
            QueryStatus::Running => 1,
            QueryStatus::Exporting => 2,
            QueryStatus::Completed | QueryStatus::Failed => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QueryStatus::Completed | QueryStatus::Failed)
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryStatus::Submitted => f.write_str("SUBMITTED"),
            QueryStatus::Running => f.write_str("RUNNING"),
            QueryStatus::Exporting => f.write_str("EXPORTING"),
            QueryStatus::Completed => f.write_str("COMPLETED"),
            QueryStatus::Failed => f.write_str("FAILED"),
            QueryStatus::Unknown(raw) => f.write_str(raw),
        }
    }
}

/// Client-side view of a submitted query.
///
/// The tracked status only moves forward; a stale report from the server
/// never takes it back. The raw last-seen status is kept separately for
/// timeout reporting.
#[derive(Debug, Clone)]
pub struct QueryHandle {
    pub id: String,
    status: QueryStatus,
    last_seen: String,
}

impl QueryHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: QueryStatus::Submitted,
            last_seen: "SUBMITTED".to_string(),
        }
    }

    pub fn status(&self) -> &QueryStatus {
        &self.status
    }

    pub fn last_seen(&self) -> &str {
        &self.last_seen
    }

    /// Record a status report, returning the parsed status.
    pub fn observe(&mut self, raw: &str) -> QueryStatus {
        let reported = QueryStatus::parse(raw);
        self.last_seen = raw.to_string();
        if !self.status.is_terminal() && reported.rank() >= self.status.rank() {
            self.status = reported.clone();
        }
        reported
    }
}

/// Lifecycle phases, used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPhase {
    Submitted,
    InitialWait,
    Polling,
    Downloading,
    Decompressing,
    Decoding,
    Done,
    Cancelled,
}

/// Timing of the wait and poll phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    pub initial_delay: Duration,
    /// Sleep after a RUNNING or EXPORTING report.
    pub busy_interval: Duration,
    /// Sleep after any other non-terminal report.
    pub retry_interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&PollConfig::default())
    }
}

impl From<&PollConfig> for PollPolicy {
    fn from(config: &PollConfig) -> Self {
        Self {
            initial_delay: Duration::from_secs(config.initial_delay_secs),
            busy_interval: Duration::from_secs(config.busy_interval_secs),
            retry_interval: Duration::from_secs(config.retry_interval_secs),
            max_attempts: config.max_attempts,
        }
    }
}

/// Rows plus everything needed to report on them.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub table: ResultTable,
    /// Lines of the result file that were not JSON objects.
    pub passthrough: Vec<String>,
    /// Decompressed result file on disk.
    pub result_path: PathBuf,
}

#[derive(Debug, Clone)]
pub enum QueryOutcome {
    Completed(QueryResult),
    Cancelled,
}

enum Wait {
    Ready(StatusResponse),
    Cancelled,
}

/// Drives queries against the analysis API.
pub struct QueryRunner<T> {
    api: AnalysisClient<T>,
    policy: PollPolicy,
    scratch_dir: PathBuf,
    interactive: bool,
}

impl<T: Transport> QueryRunner<T> {
    pub fn new(api: AnalysisClient<T>, policy: PollPolicy, scratch_dir: PathBuf) -> Self {
        Self {
            api,
            policy,
            scratch_dir,
            interactive: false,
        }
    }

    /// Show the spinner and listen for Escape while waiting.
    pub fn set_interactive(&mut self, interactive: bool) {
        self.interactive = interactive;
    }

    pub fn api(&self) -> &AnalysisClient<T> {
        &self.api
    }

    /// Run a query to completion, showing wait feedback when interactive.
    pub async fn execute(&self, query: &Query) -> Result<QueryOutcome> {
        let handle = self.submit(query).await?;

        let (scope, cancel) = WaitScope::begin(self.interactive);
        let waited = self.await_completion(handle, cancel).await;
        let cancelled = matches!(waited, Ok(Wait::Cancelled));
        scope.end(cancelled).await;

        self.finish(waited?).await
    }

    /// Run a query with an externally supplied cancel signal and no terminal feedback.
    pub async fn execute_with_cancel(&self, query: &Query, cancel: CancelSignal) -> Result<QueryOutcome> {
        let handle = self.submit(query).await?;
        let waited = self.await_completion(handle, cancel).await?;
        self.finish(waited).await
    }

    async fn submit(&self, query: &Query) -> Result<QueryHandle> {
        debug!(sql = %query.sql, "executing query");
        if let Some(from) = query.window.from {
            debug!(from, from_time = %format_timestamp(from), "window start");
        }
        if let Some(to) = query.window.to {
            debug!(to, to_time = %format_timestamp(to), "window end");
        }

        let id = self
            .api
            .submit_query(&query.sql, query.window.from, query.window.to)
            .await?;
        debug!(query_id = %id, phase = ?QueryPhase::Submitted, "query accepted");
        Ok(QueryHandle::new(id))
    }

    async fn await_completion(&self, mut handle: QueryHandle, mut cancel: CancelSignal) -> Result<Wait> {
        debug!(phase = ?QueryPhase::InitialWait, delay = ?self.policy.initial_delay);
        tokio::select! {
            _ = tokio::time::sleep(self.policy.initial_delay) => {}
            _ = cancel.cancelled() => {
                debug!(phase = ?QueryPhase::Cancelled, "cancelled during initial wait");
                return Ok(Wait::Cancelled);
            }
        }

        debug!(phase = ?QueryPhase::Polling, query_id = %handle.id);
        for attempt in 1..=self.policy.max_attempts {
            let (status, raw) = self.api.query_status(&handle.id).await?;
            let pause = match handle.observe(&status.status) {
                QueryStatus::Completed => {
                    debug!(attempt, "query completed");
                    return Ok(Wait::Ready(status));
                }
                QueryStatus::Failed => return Err(CliError::QueryFailed(raw)),
                QueryStatus::Running | QueryStatus::Exporting => self.policy.busy_interval,
                QueryStatus::Submitted | QueryStatus::Unknown(_) => self.policy.retry_interval,
            };
            debug!(
                attempt,
                status = %status.status,
                tracked = %handle.status(),
                "status check"
            );

            if attempt == self.policy.max_attempts {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = cancel.cancelled() => {
                    debug!(phase = ?QueryPhase::Cancelled, attempt, "cancelled while polling");
                    return Ok(Wait::Cancelled);
                }
            }
        }

        Err(CliError::Timeout {
            last_status: handle.last_seen().to_string(),
        })
    }

    async fn finish(&self, waited: Wait) -> Result<QueryOutcome> {
        let status = match waited {
            Wait::Ready(status) => status,
            Wait::Cancelled => return Ok(QueryOutcome::Cancelled),
        };

        let url = status
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or(CliError::MissingResultUrl)?;
        let paths = scratch_paths(url, &self.scratch_dir);

        debug!(phase = ?QueryPhase::Downloading, path = %paths.compressed.display());
        let bytes = self.api.transport().download(url, &paths.compressed).await?;
        debug!(bytes, "downloaded result");

        debug!(phase = ?QueryPhase::Decompressing, path = %paths.decompressed.display());
        decompress_file(&paths.compressed, &paths.decompressed)?;

        debug!(phase = ?QueryPhase::Decoding);
        let reader = BufReader::new(File::open(&paths.decompressed)?);
        let decoded = decoder::decode(reader, &status.column_info)?;

        debug!(phase = ?QueryPhase::Done, rows = decoded.table.row_count());
        Ok(QueryOutcome::Completed(QueryResult {
            table: decoded.table,
            passthrough: decoded.passthrough,
            result_path: paths.decompressed,
        }))
    }
}
