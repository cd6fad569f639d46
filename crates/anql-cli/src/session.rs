//! Session driver shared by the interactive shell and piped mode.
//!
//! A [`Session`] owns all mutable session state (history, output format,
//! debug flag, time window) and is the only place that changes it.

use std::io::{self, BufRead, Write};

use tracing::debug;

use crate::config::OutputFormat;
use crate::error::Result;
use crate::format::{render_table_list, Formatter};
use crate::history::{is_exit_command, History};
use crate::logging::LogControl;
use crate::progress::assistant_spinner;
use crate::query::{Query, QueryOutcome, QueryResult, QueryRunner};
use crate::rest_client::Transport;
use crate::schema;
use crate::scratch::open_in_editor;
use crate::timewindow::{parse_time_window, TimeWindow};

const WINDOW_USAGE: &str = "\
Usage: .window [show|clear|<from> <to>]
Examples:
  .window show          # Show current time window
  .window clear         # Clear time window
  .window -24h now      # Set window from 24 hours ago to now
  .window 1640995200 1641081600  # Set specific timestamps";

const DEBUG_USAGE: &str = "\
Usage: .debug [on|off|show]
Examples:
  .debug        # Toggle debug mode
  .debug on     # Enable debug mode
  .debug off    # Disable debug mode
  .debug show   # Show current debug status";

const FORMAT_USAGE: &str = "\
Usage: .format [table|csv|json|show]
Examples:
  .format           # Show current format
  .format table     # Set format to table
  .format csv       # Set format to CSV
  .format json      # Set format to JSON
  .format show      # Show current format";

const ASK_USAGE: &str = "Usage: .ask <your question about SQL or data>";

const SHELL_HELP: &str = "\
Special commands:
  .tables                             Show all available tables
  .schema [TABLE_NAME]                Show table schema (all if no name)
  .window [show|clear|<from> <to>]    Manage time window for queries
  .debug [on|off|show]                Toggle debug output
  .format [table|csv|json|show]       Set output format
  .ask <question>                     Ask the SQL assistant and run its query
  .help                               Show this help

SQL statements end with ';' and may span several lines.
Press ESC while a query runs to cancel it.
Exit commands: exit, quit, \\q, .exit, .quit";

/// Mutable state carried across statements in one session.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub history: History,
    pub format: OutputFormat,
    pub debug: bool,
    pub window: TimeWindow,
    /// Suppress spinners and key watching.
    pub silent: bool,
    /// Open each result file in an editor before printing it.
    pub open_results: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            history: History::in_memory(),
            format: OutputFormat::Table,
            debug: false,
            window: TimeWindow::default(),
            silent: false,
            open_results: false,
        }
    }
}

/// One line of user input, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Empty,
    Exit,
    Meta(MetaCommand),
    Sql(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaCommand {
    Tables,
    Schema(Option<String>),
    Window(WindowCommand),
    Debug(DebugCommand),
    Format(FormatCommand),
    Ask(String),
    Help,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowCommand {
    Show,
    Clear,
    Set { from: String, to: String },
    Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugCommand {
    Toggle,
    Set(bool),
    Show,
    Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatCommand {
    Show,
    Set(OutputFormat),
    Usage,
}

/// Classify a trimmed input line.
pub fn classify(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        Input::Empty
    } else if is_exit_command(line) {
        Input::Exit
    } else if line.starts_with('.') {
        Input::Meta(parse_meta(line))
    } else {
        Input::Sql(line.to_string())
    }
}

/// Parse a line starting with `.` into a meta-command.
pub fn parse_meta(line: &str) -> MetaCommand {
    let line = line.trim();
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some(head) = parts.first() else {
        return MetaCommand::Unknown(String::new());
    };
    let args = &parts[1..];

    match head.to_lowercase().trim_end_matches(';') {
        ".tables" => MetaCommand::Tables,
        ".schema" => MetaCommand::Schema(
            args.first()
                .map(|t| t.trim_end_matches(';').to_string())
                .filter(|t| !t.is_empty()),
        ),
        ".window" => MetaCommand::Window(match args {
            [] => WindowCommand::Show,
            [arg] if arg.eq_ignore_ascii_case("show") => WindowCommand::Show,
            [arg] if arg.eq_ignore_ascii_case("clear") => WindowCommand::Clear,
            [from, to] => WindowCommand::Set {
                from: from.to_string(),
                to: to.to_string(),
            },
            _ => WindowCommand::Usage,
        }),
        ".debug" => MetaCommand::Debug(match args {
            [] => DebugCommand::Toggle,
            [arg] => match arg.to_lowercase().as_str() {
                "on" | "true" | "1" => DebugCommand::Set(true),
                "off" | "false" | "0" => DebugCommand::Set(false),
                "show" | "status" => DebugCommand::Show,
                _ => DebugCommand::Usage,
            },
            _ => DebugCommand::Usage,
        }),
        ".format" => MetaCommand::Format(match args {
            [] => FormatCommand::Show,
            [arg] => match arg.to_lowercase().as_str() {
                "show" | "status" => FormatCommand::Show,
                other => other
                    .parse()
                    .map(FormatCommand::Set)
                    .unwrap_or(FormatCommand::Usage),
            },
            _ => FormatCommand::Usage,
        }),
        ".ask" => MetaCommand::Ask(line[head.len()..].trim().to_string()),
        ".help" => MetaCommand::Help,
        _ => MetaCommand::Unknown(head.to_string()),
    }
}

/// Whether processing should go on after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct Session<T, W> {
    runner: QueryRunner<T>,
    state: SessionState,
    log: LogControl,
    colored: bool,
    out: W,
}

impl<T: Transport, W: Write> Session<T, W> {
    pub fn new(runner: QueryRunner<T>, state: SessionState, log: LogControl, colored: bool, out: W) -> Self {
        let mut session = Self {
            runner,
            state,
            log,
            colored,
            out,
        };
        session.sync_feedback();
        session
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    pub fn runner(&self) -> &QueryRunner<T> {
        &self.runner
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    fn sync_feedback(&mut self) {
        self.runner
            .set_interactive(!self.state.debug && !self.state.silent);
        self.log.set_debug(self.state.debug);
    }

    fn formatter(&self) -> Formatter {
        Formatter::new(self.state.format, self.colored)
    }

    fn report(&self, prefix: &str, message: impl std::fmt::Display) {
        self.formatter().print_error(&format!("{}: {}", prefix, message));
    }

    /// Run a statement under the current window.
    pub async fn execute_query(&self, sql: &str) -> Result<QueryOutcome> {
        let query = Query::new(sql, self.state.window);
        self.runner.execute(&query).await
    }

    /// Run a statement and print its result.
    pub async fn run_statement(&mut self, sql: &str) -> Result<()> {
        let outcome = self.execute_query(sql).await?;
        if let QueryOutcome::Completed(result) = outcome {
            self.present(&result)?;
        }
        Ok(())
    }

    fn present(&mut self, result: &QueryResult) -> Result<()> {
        for line in &result.passthrough {
            writeln!(self.out, "{}", line)?;
        }
        if self.state.open_results {
            open_in_editor(&result.result_path);
        }
        let formatter = self.formatter();
        formatter.write_result(&result.table, &mut self.out)?;
        self.out.flush()?;
        Ok(())
    }

    /// Sorted table names.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        self.runner.api().list_tables().await
    }

    /// Print the schema of one table, or of all tables.
    pub async fn describe_schema(&mut self, table: Option<&str>) -> Result<()> {
        let doc = self.runner.api().schemas().await?;
        debug!(schema = %doc, "raw schema response");
        schema::write_schema(&doc, table, &mut self.out)
    }

    /// Execute a meta-command, printing any failure.
    pub async fn handle_meta(&mut self, command: MetaCommand) -> Result<()> {
        match command {
            MetaCommand::Tables => match self.list_tables().await {
                Ok(names) => render_table_list(&names, &mut self.out)?,
                Err(e) => self.report("Error", e),
            },
            MetaCommand::Schema(table) => {
                if let Err(e) = self.describe_schema(table.as_deref()).await {
                    self.report("Error", e);
                }
            }
            MetaCommand::Window(cmd) => self.handle_window(cmd)?,
            MetaCommand::Debug(cmd) => self.handle_debug(cmd)?,
            MetaCommand::Format(cmd) => self.handle_format(cmd)?,
            MetaCommand::Ask(question) => self.handle_ask(&question).await?,
            MetaCommand::Help => writeln!(self.out, "{}", SHELL_HELP)?,
            MetaCommand::Unknown(name) => {
                self.report("Error", format!("unknown command '{}'. Type .help for help", name))
            }
        }
        self.out.flush()?;
        Ok(())
    }

    fn handle_window(&mut self, cmd: WindowCommand) -> io::Result<()> {
        match cmd {
            WindowCommand::Show => writeln!(self.out, "{}", self.state.window.describe()),
            WindowCommand::Clear => {
                self.state.window = TimeWindow::default();
                writeln!(self.out, "Time window cleared.")
            }
            WindowCommand::Set { from, to } => match parse_time_window(&from, &to) {
                Ok(window) => {
                    self.state.window = window;
                    writeln!(self.out, "Time window set: from {} to {}", from, to)?;
                    writeln!(self.out, "{}", window.describe())
                }
                Err(e) => {
                    self.report("Error setting window", e);
                    Ok(())
                }
            },
            WindowCommand::Usage => writeln!(self.out, "{}", WINDOW_USAGE),
        }
    }

    fn handle_debug(&mut self, cmd: DebugCommand) -> io::Result<()> {
        let enabled = match cmd {
            DebugCommand::Toggle => !self.state.debug,
            DebugCommand::Set(on) => on,
            DebugCommand::Show => {
                let state = if self.state.debug { "enabled" } else { "disabled" };
                return writeln!(self.out, "Debug mode is currently {}.", state);
            }
            DebugCommand::Usage => return writeln!(self.out, "{}", DEBUG_USAGE),
        };

        self.state.debug = enabled;
        self.sync_feedback();
        if enabled {
            writeln!(self.out, "Debug mode enabled.")
        } else {
            writeln!(self.out, "Debug mode disabled.")
        }
    }

    fn handle_format(&mut self, cmd: FormatCommand) -> io::Result<()> {
        match cmd {
            FormatCommand::Show => writeln!(self.out, "Current output format: {}", self.state.format),
            FormatCommand::Set(format) => {
                self.state.format = format;
                writeln!(self.out, "Output format set to: {}", format)
            }
            FormatCommand::Usage => writeln!(self.out, "{}", FORMAT_USAGE),
        }
    }

    async fn handle_ask(&mut self, question: &str) -> Result<()> {
        if question.is_empty() {
            writeln!(self.out, "{}", ASK_USAGE)?;
            return Ok(());
        }

        let existing = self.state.history.last_statement().unwrap_or("").to_string();
        let spinner = assistant_spinner(!self.state.silent && !self.state.debug);
        let reply = self.runner.api().ask(question, &existing).await;
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                self.report("Error", e);
                return Ok(());
            }
        };

        if !reply.context.is_empty() {
            writeln!(self.out, "\n{}", reply.context)?;
        }
        if !reply.sql_query.is_empty() {
            writeln!(self.out, "\nSuggested SQL:\n{}", reply.sql_query)?;
            writeln!(self.out, "\n🚀 Executing query automatically...")?;
            self.out.flush()?;
            // suggested queries are not added to history
            if let Err(e) = self.run_statement(&reply.sql_query).await {
                self.report("Error executing query", e);
            }
        }
        writeln!(self.out)?;
        Ok(())
    }

    /// Handle one line in piped mode: every line is a complete statement.
    pub async fn dispatch_line(&mut self, line: &str) -> Result<Flow> {
        match classify(line) {
            Input::Empty => {}
            Input::Exit => return Ok(Flow::Exit),
            Input::Meta(cmd) => self.handle_meta(cmd).await?,
            Input::Sql(sql) => {
                let sql = sql.trim_end_matches(';').trim();
                if !sql.is_empty() {
                    if let Err(e) = self.run_statement(sql).await {
                        self.report("Error", e);
                    }
                }
            }
        }
        Ok(Flow::Continue)
    }

    /// Process statements from a non-interactive reader until EOF or an exit command.
    pub async fn run_piped<R: BufRead>(&mut self, reader: R) -> Result<()> {
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    self.report("Error reading input", e);
                    break;
                }
            };
            if self.dispatch_line(&line).await? == Flow::Exit {
                break;
            }
        }
        Ok(())
    }
}
