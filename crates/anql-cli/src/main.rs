//! anql CLI
//!
//! Command-line tool for running SQL against the asynchronous analysis service.
//!
//! ## Quick Start
//!
//! ```bash
//! # Interactive shell with the default profile (~/.soracom/default.json)
//! anql
//!
//! # Single query over the last day, as CSV
//! anql --sql "SELECT COUNT(*) FROM sim_snapshots" --from -24h --to now --format csv
//!
//! # One statement per line from stdin
//! cat queries.sql | anql --profile prod
//!
//! # Raw schema document
//! anql --schema
//! ```
//!
//! ## Modes
//!
//! - `--schema`: print the schema document and exit
//! - `--sql`: run one statement and exit (exit code 1 on failure)
//! - piped stdin: one statement or meta-command per line
//! - otherwise: the interactive shell
//!
//! Spinners and Escape-to-cancel are only active in the interactive shell.

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;

use anql_cli::api::AnalysisClient;
use anql_cli::auth::{authenticate, Profile};
use anql_cli::config::{Config, OutputFormat};
use anql_cli::history::History;
use anql_cli::logging::LogControl;
use anql_cli::query::{PollPolicy, QueryRunner};
use anql_cli::repl::Repl;
use anql_cli::rest_client::RestClient;
use anql_cli::session::{Session, SessionState};
use anql_cli::timewindow::parse_time_window;

#[derive(Parser)]
#[command(name = "anql")]
#[command(about = "Run SQL against the analysis service", long_about = None)]
struct Cli {
    /// Profile name (reads <profile dir>/<name>.json)
    #[arg(long, env = "ANQL_PROFILE", default_value = "default")]
    profile: String,

    /// Run a single SQL statement and exit
    #[arg(long)]
    sql: Option<String>,

    /// Print the schema document and exit
    #[arg(long)]
    schema: bool,

    /// Enable debug output
    #[arg(long)]
    debug: bool,

    /// Open each result file in an editor
    #[arg(long)]
    open: bool,

    /// Window start: epoch seconds, RFC3339, or relative (-1h, -30m, -7d)
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    from: String,

    /// Window end: epoch seconds, RFC3339, relative, or "now"
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    to: String,

    /// Output format
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Suppress spinners and key watching
    #[arg(short, long)]
    silent: bool,

    /// Settings file (default: ~/.anql/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load config")?;

    let log = LogControl::init(cli.debug);

    let window = parse_time_window(&cli.from, &cli.to).context("Time parsing error")?;

    let piped = !io::stdin().is_terminal();
    let silent = cli.silent || piped || cli.sql.is_some();
    let profile_name = if cli.profile.is_empty() {
        "default"
    } else {
        cli.profile.as_str()
    };

    let client = connect(&config, profile_name)
        .await
        .context("Authentication failed")?;
    let api = AnalysisClient::new(client);

    if cli.schema {
        let doc = api.schemas().await.context("Failed to get schemas")?;
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    let interactive = cli.sql.is_none() && !piped;
    let history = if interactive {
        History::load(config.history_file())
    } else {
        History::in_memory()
    };

    let state = SessionState {
        history,
        format: cli.format.unwrap_or(config.output_format),
        debug: cli.debug,
        window,
        silent,
        open_results: cli.open,
    };
    let runner = QueryRunner::new(api, PollPolicy::from(&config.poll), config.scratch_dir());
    let mut session = Session::new(runner, state, log, config.colored, io::stdout());

    if let Some(sql) = &cli.sql {
        session
            .run_statement(sql)
            .await
            .context("Failed to execute query")?;
    } else if piped {
        session.run_piped(io::stdin().lock()).await?;
    } else {
        Repl::new(session, profile_name, config.colored).run().await?;
    }

    Ok(())
}

async fn connect(config: &Config, profile_name: &str) -> anql_cli::Result<RestClient> {
    let profile = Profile::load(&config.profile_dir(), profile_name)?;
    let base_url = profile.base_url();
    debug!(profile = %profile_name, base_url = %base_url, "connecting");

    let mut client = RestClient::new(base_url, config.request_timeout())?
        .with_headers(profile.headers.clone());
    let credentials = authenticate(&client, &profile).await?;
    client.set_credentials(credentials);
    Ok(client)
}
