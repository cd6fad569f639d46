//! Configuration management for anql

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CliError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default output format
    pub output_format: OutputFormat,

    /// Enable colored output
    pub colored: bool,

    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: u64,

    /// Where downloaded result files are written (defaults to the system temp dir)
    pub scratch_dir: Option<PathBuf>,

    /// Interactive history file (defaults to ~/.anql_history)
    pub history_file: Option<PathBuf>,

    /// Directory holding `<profile>.json` credential files (defaults to ~/.soracom)
    pub profile_dir: Option<PathBuf>,

    pub poll: PollConfig,
}

/// Timing of the status poll loop, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollConfig {
    pub initial_delay_secs: u64,
    pub busy_interval_secs: u64,
    pub retry_interval_secs: u64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Csv,
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Table => "table",
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => Err(CliError::Config(format!(
                "Invalid format '{}'. Supported formats: table, csv, json",
                other
            ))),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: 5,
            busy_interval_secs: 10,
            retry_interval_secs: 5,
            max_attempts: 30,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Table,
            colored: true,
            request_timeout_secs: 60,
            scratch_dir: None,
            history_file: None,
            profile_dir: None,
            poll: PollConfig::default(),
        }
    }
}

impl Config {
    /// Load config from the default file or fall back to defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a specific file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| CliError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn history_file(&self) -> PathBuf {
        self.history_file
            .clone()
            .unwrap_or_else(|| home_dir().join(".anql_history"))
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.profile_dir
            .clone()
            .unwrap_or_else(|| home_dir().join(".soracom"))
    }

    /// Get config file path (~/.anql/config.toml)
    pub fn config_path() -> PathBuf {
        home_dir().join(".anql").join("config.toml")
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}
