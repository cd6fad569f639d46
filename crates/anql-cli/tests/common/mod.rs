//! Scripted in-memory transport shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};

use anql_cli::api::AnalysisClient;
use anql_cli::error::{CliError, Result};
use anql_cli::query::{PollPolicy, QueryRunner};
use anql_cli::rest_client::{ApiRequest, Transport};

pub const RESULT_URL: &str = "https://results.example.com/exports/q-1.jsonl.gz";

/// Replies to API calls from a script and serves `result` as a gzip download.
pub struct ScriptedTransport {
    statuses: Mutex<VecDeque<Value>>,
    pub result: String,
    pub schema: Value,
    pub assistant: Value,
    pub reject_submit: bool,
    pub requests: Mutex<Vec<ApiRequest>>,
    pub status_calls: AtomicUsize,
    pub downloads: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(statuses: Vec<Value>, result: &str) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            result: result.to_string(),
            schema: json!({}),
            assistant: json!({}),
            reject_submit: false,
            requests: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
        }
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn submitted_sql(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == "/v1/analysis/queries")
            .filter_map(|r| r.body.as_ref()?.get("sql")?.as_str().map(str::to_string))
            .collect()
    }

    /// The next scripted status; the last one repeats forever.
    fn next_status(&self) -> Value {
        let mut statuses = self.statuses.lock().unwrap();
        if statuses.len() > 1 {
            statuses.pop_front().unwrap()
        } else {
            statuses.front().cloned().unwrap_or_else(|| status("RUNNING"))
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<Vec<u8>> {
        let path = request.path.clone();
        self.requests.lock().unwrap().push(request);

        let reply = if path == "/v1/analysis/queries" {
            if self.reject_submit {
                return Err(CliError::Service {
                    code: "SEM0001".to_string(),
                    message: "Invalid SQL".to_string(),
                });
            }
            json!({ "queryId": "q-1" })
        } else if path.starts_with("/v1/analysis/queries/") {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            self.next_status()
        } else if path == "/v1/analysis/schemas" {
            self.schema.clone()
        } else if path == "/v1/analysis/sql_assistant" {
            self.assistant.clone()
        } else {
            return Err(CliError::Http {
                status: 404,
                body: format!("no route for {}", path),
            });
        };

        Ok(serde_json::to_vec(&reply).unwrap())
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        assert_eq!(url, RESULT_URL);
        self.downloads.fetch_add(1, Ordering::SeqCst);

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(self.result.as_bytes())?;
        let bytes = encoder.finish()?;
        std::fs::write(dest, &bytes)?;
        Ok(bytes.len() as u64)
    }
}

pub fn status(name: &str) -> Value {
    json!({ "status": name })
}

pub fn completed() -> Value {
    json!({ "status": "COMPLETED", "url": RESULT_URL })
}

pub fn runner(transport: ScriptedTransport, scratch: &Path) -> QueryRunner<ScriptedTransport> {
    QueryRunner::new(
        AnalysisClient::new(transport),
        PollPolicy::default(),
        scratch.to_path_buf(),
    )
}
