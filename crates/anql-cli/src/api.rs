//! Typed calls against the analysis API.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::decoder::ColumnInfo;
use crate::error::{CliError, Result};
use crate::rest_client::{ApiRequest, Transport};
use crate::schema;

const QUERIES_PATH: &str = "/v1/analysis/queries";
const SCHEMAS_PATH: &str = "/v1/analysis/schemas";
const ASSISTANT_PATH: &str = "/v1/analysis/sql_assistant";

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    sql: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    query_id: String,
}

/// Body of `GET /v1/analysis/queries/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub column_info: Vec<ColumnInfo>,
}

/// Reply from the SQL assistant.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssistantReply {
    #[serde(default)]
    pub sql_query: String,
    #[serde(default)]
    pub context: String,
}

/// Client for the analysis endpoints, generic over the transport.
pub struct AnalysisClient<T> {
    transport: T,
}

impl<T: Transport> AnalysisClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Submit a query, returning its id.
    pub async fn submit_query(&self, sql: &str, from: Option<i64>, to: Option<i64>) -> Result<String> {
        let body = serde_json::to_value(SubmitRequest { sql, from, to })
            .map_err(|e| CliError::parse("submit request", e))?;
        let raw = self.transport.send(ApiRequest::post(QUERIES_PATH, body)).await?;
        let reply: SubmitResponse =
            serde_json::from_slice(&raw).map_err(|e| CliError::parse("submit response", e))?;
        debug!(query_id = %reply.query_id, "query submitted");
        Ok(reply.query_id)
    }

    /// Fetch the status of a submitted query, with the raw body alongside.
    pub async fn query_status(&self, query_id: &str) -> Result<(StatusResponse, String)> {
        let path = format!("{}/{}?exportFormat=jsonl", QUERIES_PATH, query_id);
        let raw = self.transport.send(ApiRequest::get(path)).await?;
        let body = String::from_utf8_lossy(&raw).into_owned();
        debug!(body = %body, "status response");
        let status =
            serde_json::from_slice(&raw).map_err(|e| CliError::parse("status response", e))?;
        Ok((status, body))
    }

    /// Raw schema document.
    pub async fn schemas(&self) -> Result<Value> {
        let raw = self.transport.send(ApiRequest::get(SCHEMAS_PATH)).await?;
        serde_json::from_slice(&raw).map_err(|e| CliError::parse("schema response", e))
    }

    /// Sorted table names known to the service.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(schema::table_names(&self.schemas().await?))
    }

    /// Ask the SQL assistant to draft a query.
    pub async fn ask(&self, question: &str, existing_query: &str) -> Result<AssistantReply> {
        let body = json!({
            "messages": [{
                "role": "user",
                "context": question,
                "agentMode": false,
            }],
            "timeRange": { "hours": 2 },
            "existing_query": existing_query,
        });
        let request = ApiRequest::post(ASSISTANT_PATH, body)
            .with_header("x-soracom-dynamicroutes", "add-sql-helper");
        let raw = self.transport.send(request).await?;
        serde_json::from_slice(&raw).map_err(|e| CliError::parse("assistant response", e))
    }
}
