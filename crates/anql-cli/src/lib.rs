//! anql: command-line client for the asynchronous analysis SQL service.
//!
//! Queries are submitted, polled until the service has exported their
//! result, and the gzip-compressed NDJSON result is downloaded, decoded and
//! rendered as a table, CSV or JSON.
//!
//! ## Modules
//!
//! - [`query`]: submit / wait / poll / download lifecycle with cancellation
//! - [`decoder`]: NDJSON result decoding with stable column order
//! - [`format`]: table, CSV and JSON renderers
//! - [`timewindow`]: `--from` / `--to` parsing
//! - [`session`] and [`repl`]: meta-commands, piped mode and the interactive shell
//! - [`rest_client`], [`api`], [`auth`]: HTTP transport and typed endpoints

pub mod api;
pub mod auth;
pub mod completer;
pub mod config;
pub mod decoder;
pub mod error;
pub mod format;
pub mod history;
pub mod logging;
pub mod progress;
pub mod query;
pub mod repl;
pub mod rest_client;
pub mod schema;
pub mod scratch;
pub mod session;
pub mod timewindow;

pub use error::{CliError, Result};
