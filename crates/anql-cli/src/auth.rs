//! Profile-based authentication
//!
//! Profiles live at `<profile_dir>/<name>.json` and carry either an
//! email/password pair or an auth key pair, plus optional endpoint and
//! header overrides. Authenticating exchanges them for an API key and
//! token that every later request carries.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{CliError, Result};
use crate::rest_client::{ApiCredentials, ApiRequest, Transport};

const GLOBAL_ENDPOINT: &str = "https://g.api.soracom.io";
const JAPAN_ENDPOINT: &str = "https://jp.api.soracom.io";
const AUTH_PATH: &str = "/v1/auth";

/// Credentials and endpoint settings for one named profile.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub email: String,
    pub password: String,
    pub auth_key_id: String,
    pub auth_key: String,
    pub coverage_type: String,
    pub endpoint: String,
    pub headers: BTreeMap<String, String>,
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("email", &self.email)
            .field("auth_key_id", &self.auth_key_id)
            .field("coverage_type", &self.coverage_type)
            .field("endpoint", &self.endpoint)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Profile {
    /// Path of the profile file for `name` inside `dir`.
    pub fn path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}.json", name))
    }

    /// Load the named profile from `dir`.
    pub fn load(dir: &Path, name: &str) -> Result<Self> {
        let path = Self::path(dir, name);
        debug!(profile = %name, path = %path.display(), "loading profile");

        let data = std::fs::read_to_string(&path).map_err(|e| {
            CliError::Auth(format!("config file '{}' not found: {}", path.display(), e))
        })?;
        serde_json::from_str(&data)
            .map_err(|e| CliError::Auth(format!("failed to parse config file: {}", e)))
    }

    /// API base URL: the explicit endpoint when set, else the coverage default.
    pub fn base_url(&self) -> String {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return match self.coverage_type.as_str() {
                "g" => GLOBAL_ENDPOINT.to_string(),
                _ => JAPAN_ENDPOINT.to_string(),
            };
        }

        if endpoint.starts_with("https://") || endpoint.starts_with("http://") {
            endpoint.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", endpoint.trim_end_matches('/'))
        }
    }

    /// Body for `POST /v1/auth`. Email login wins when both parts are present.
    fn auth_payload(&self) -> serde_json::Value {
        if !self.email.is_empty() && !self.password.is_empty() {
            json!({ "email": self.email, "password": self.password })
        } else {
            json!({ "authKeyId": self.auth_key_id, "authKey": self.auth_key })
        }
    }
}

/// Exchange profile credentials for an API key and token.
pub async fn authenticate<T: Transport + ?Sized>(
    transport: &T,
    profile: &Profile,
) -> Result<ApiCredentials> {
    debug!(
        coverage = %profile.coverage_type,
        endpoint = %profile.endpoint,
        custom_headers = profile.headers.len(),
        "authenticating"
    );

    let raw = transport
        .send(ApiRequest::post(AUTH_PATH, profile.auth_payload()).sensitive())
        .await?;
    let creds: ApiCredentials = serde_json::from_slice(&raw)
        .map_err(|e| CliError::Auth(format!("failed to parse auth response: {}", e)))?;

    if creds.api_key.is_empty() || creds.token.is_empty() {
        return Err(CliError::Auth("auth response did not contain credentials".to_string()));
    }

    Ok(creds)
}
