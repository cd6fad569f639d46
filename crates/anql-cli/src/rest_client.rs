//! REST API client for the analysis service
//!
//! Provides the HTTP plumbing shared by every API call:
//! - base URL and per-request timeout
//! - authentication and profile-defined headers
//! - mapping of error bodies to [`CliError`]
//! - unauthenticated streaming download of pre-signed result URLs

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{CliError, Result};

/// A single API call, relative to the client's base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    /// Extra headers for this request only.
    pub headers: Vec<(&'static str, String)>,
    /// The body carries credentials and is never logged.
    pub sensitive: bool,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
            headers: Vec::new(),
            sensitive: false,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
            headers: Vec::new(),
            sensitive: false,
        }
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// The HTTP surface the query runner depends on.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send an API request and return the raw response body.
    async fn send(&self, request: ApiRequest) -> Result<Vec<u8>>;

    /// Download `url` to `dest`, returning the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Session credentials returned by the auth endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCredentials {
    pub api_key: String,
    pub token: String,
}

/// REST API client
pub struct RestClient {
    base_url: String,
    client: Client,
    credentials: Option<ApiCredentials>,
    headers: BTreeMap<String, String>,
}

impl RestClient {
    /// Create a new REST client
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            credentials: None,
            headers: BTreeMap::new(),
        })
    }

    /// Headers sent with every API request (profile-defined).
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn set_credentials(&mut self, credentials: ApiCredentials) {
        self.credentials = Some(credentials);
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Transport for RestClient {
    async fn send(&self, request: ApiRequest) -> Result<Vec<u8>> {
        let url = self.url(&request.path);
        debug!(method = %request.method, url = %url, "sending API request");
        match &request.body {
            Some(_) if request.sensitive => debug!("request body redacted"),
            Some(body) => debug!(body = %body, "request body"),
            None => {}
        }

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");

        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(creds) = &self.credentials {
            builder = builder
                .header("x-soracom-api-key", creds.api_key.as_str())
                .header("x-soracom-token", creds.token.as_str());
        }
        for (name, value) in &request.headers {
            builder = builder.header(*name, value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        check_status(status, &body)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        debug!(url = %url, dest = %dest.display(), "downloading result");

        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(CliError::Http {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}

/// Any status outside 2xx is an error.
fn check_status(status: StatusCode, body: &[u8]) -> Result<Vec<u8>> {
    if !status.is_success() {
        return Err(error_from_response(status.as_u16(), body));
    }
    Ok(body.to_vec())
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Map an HTTP error response to a [`CliError`].
///
/// A JSON body with a non-empty `code` becomes [`CliError::Service`];
/// anything else keeps the raw body.
pub fn error_from_response(status: u16, body: &[u8]) -> CliError {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(err) if !err.code.is_empty() => CliError::Service {
            code: err.code,
            message: err.message,
        },
        _ => CliError::Http {
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{authenticate, Profile};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_client_creation() {
        let client = RestClient::new("https://jp.api.soracom.io/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "https://jp.api.soracom.io");
        assert_eq!(
            client.url("/v1/analysis/schemas"),
            "https://jp.api.soracom.io/v1/analysis/schemas"
        );
    }

    #[test]
    fn test_structured_error_body() {
        let err = error_from_response(400, br#"{"code":"SEM0001","message":"Invalid SQL"}"#);
        assert_eq!(err.to_string(), "API error [SEM0001]: Invalid SQL");
    }

    #[test]
    fn test_unstructured_error_body() {
        let err = error_from_response(502, b"Bad Gateway");
        assert_eq!(err.to_string(), "HTTP 502 error: Bad Gateway");

        let err = error_from_response(500, br#"{"message":"no code"}"#);
        assert!(matches!(err, CliError::Http { status: 500, .. }));
    }

    #[test]
    fn test_request_builders() {
        let req = ApiRequest::post("/v1/auth", serde_json::json!({"a": 1}))
            .with_header("x-soracom-dynamicroutes", "add-sql-helper");
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.headers.len(), 1);
        assert!(ApiRequest::get("/x").body.is_none());
        assert!(!req.sensitive);
        assert!(ApiRequest::get("/x").sensitive().sensitive);
    }

    #[test]
    fn test_any_non_2xx_status_is_an_error() {
        let err = check_status(StatusCode::FOUND, b"moved").unwrap_err();
        assert!(matches!(err, CliError::Http { status: 302, .. }));

        let err = check_status(StatusCode::from_u16(101).unwrap(), b"").unwrap_err();
        assert!(matches!(err, CliError::Http { status: 101, .. }));

        assert_eq!(check_status(StatusCode::ACCEPTED, b"{}").unwrap(), b"{}");
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_auth_credentials_never_logged() {
        let logs = CapturedLogs::default();
        let sink = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || sink.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let profile = Profile {
            email: "a@b.c".to_string(),
            password: "hunter2-secret".to_string(),
            auth_key: "keysecret-42".to_string(),
            ..Profile::default()
        };
        // nothing listens there; the request body is logged before sending
        let client = RestClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let _ = authenticate(&client, &profile).await;

        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("request body redacted"), "{text}");
        assert!(!text.contains("hunter2-secret"), "{text}");
        assert!(!text.contains("keysecret-42"), "{text}");
    }
}
