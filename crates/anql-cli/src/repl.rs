//! Interactive shell for anql
//!
//! Provides a rustyline-based interactive shell with:
//! - Statement history with Up/Down navigation
//! - TAB completion for meta-commands, SQL keywords and table names
//! - Multi-line statements terminated by `;`
//! - Escape to cancel a running query

use std::borrow::Cow;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use colored::*;
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, CompletionType, ConditionalEventHandler, Config, EditMode, Editor, Event, EventContext,
    EventHandler, Helper, KeyCode, KeyEvent, Modifiers, Movement, RepeatCount,
};
use tracing::{debug, warn};

use crate::completer::AutoCompleter;
use crate::history::{is_exit_command, HistoryCursor};
use crate::rest_client::Transport;
use crate::session::{parse_meta, MetaCommand, Session};

/// What to do with one line of shell input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Nothing to run yet (blank line or an unfinished statement).
    Wait,
    Exit,
    Meta(MetaCommand),
    /// A complete statement, ready to run and record.
    Execute(String),
}

/// Accumulates lines until a statement ends with `;`.
#[derive(Debug, Default)]
pub struct StatementBuffer {
    pending: Option<String>,
}

impl StatementBuffer {
    pub fn is_continuing(&self) -> bool {
        self.pending.is_some()
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }

    pub fn feed(&mut self, line: &str) -> Step {
        let line = line.trim();
        if line.is_empty() {
            return Step::Wait;
        }
        if is_exit_command(line) {
            return Step::Exit;
        }

        if let Some(mut pending) = self.pending.take() {
            pending.push(' ');
            pending.push_str(line);
            if pending.ends_with(';') {
                return Step::Execute(pending);
            }
            self.pending = Some(pending);
            return Step::Wait;
        }

        if line.starts_with('.') {
            return Step::Meta(parse_meta(line));
        }
        if !line.ends_with(';') {
            self.pending = Some(line.to_string());
            return Step::Wait;
        }
        Step::Execute(line.to_string())
    }
}

const CONTINUATION_PROMPT: &str = "   ...> ";

/// `<profile>> ` for a new statement, a fixed marker while one is pending.
fn prompt(profile: &str, continuing: bool) -> String {
    if continuing {
        CONTINUATION_PROMPT.to_string()
    } else {
        format!("{}> ", profile)
    }
}

/// Up/Down state shared with the key handlers.
#[derive(Debug, Default)]
struct Navigation {
    cursor: HistoryCursor,
    entries: Vec<String>,
}

type SharedNavigation = Arc<Mutex<Navigation>>;

struct HistoryKey {
    nav: SharedNavigation,
    older: bool,
}

impl ConditionalEventHandler for HistoryKey {
    fn handle(&self, _evt: &Event, _n: RepeatCount, _positive: bool, ctx: &EventContext) -> Option<Cmd> {
        let mut nav = self.nav.lock().ok()?;
        let Navigation { cursor, entries } = &mut *nav;
        let text = if self.older {
            cursor.up(entries, ctx.line())
        } else {
            cursor.down(entries)
        };
        text.map(|text| Cmd::Replace(Movement::WholeBuffer, Some(text)))
    }
}

/// Rustyline helper with completion and inline hints
struct ShellHelper {
    completer: AutoCompleter,
    color: bool,
}

impl Completer for ShellHelper {
    type Candidate = <AutoCompleter as Completer>::Candidate;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Self::Candidate>)> {
        self.completer.complete(line, pos, ctx)
    }
}

impl Hinter for ShellHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() {
            return None;
        }
        let word = line.rsplit(char::is_whitespace).next().unwrap_or("");
        match self.completer.suggest(word).as_slice() {
            [only] => only
                .text
                .get(word.len()..)
                .filter(|rest| !rest.is_empty())
                .map(str::to_string),
            _ => None,
        }
    }
}

impl Highlighter for ShellHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        if self.color {
            Cow::Owned(hint.dimmed().to_string())
        } else {
            Cow::Borrowed(hint)
        }
    }
}

impl Validator for ShellHelper {}

impl Helper for ShellHelper {}

/// Interactive shell around a [`Session`].
pub struct Repl<T> {
    session: Session<T, std::io::Stdout>,
    profile: String,
    color: bool,
}

impl<T: Transport> Repl<T> {
    pub fn new(session: Session<T, std::io::Stdout>, profile: impl Into<String>, color: bool) -> Self {
        Self {
            session,
            profile: profile.into(),
            color,
        }
    }

    fn print_banner(&self) {
        println!("{}", "anql interactive shell".bold());
        println!("Type .help for available commands, 'exit' or Ctrl+D to quit");
        println!("End statements with ';' (they may span several lines)");
        println!();
    }

    async fn completer(&self) -> AutoCompleter {
        let mut completer = AutoCompleter::new(self.color);
        match self.session.list_tables().await {
            Ok(tables) => {
                debug!(count = tables.len(), "loaded table names for completion");
                completer.set_tables(tables);
            }
            Err(e) => warn!(error = %e, "could not load table names for completion"),
        }
        completer
    }

    /// Run the interactive loop until exit or end of input.
    pub async fn run(&mut self) -> Result<()> {
        self.print_banner();

        let helper = ShellHelper {
            completer: self.completer().await,
            color: self.color,
        };

        let config = Config::builder()
            .completion_type(CompletionType::List)
            .edit_mode(EditMode::Emacs)
            .auto_add_history(false)
            .build();
        let mut rl = Editor::<ShellHelper, DefaultHistory>::with_config(config)?;
        rl.set_helper(Some(helper));
        rl.bind_sequence(KeyEvent::from('\t'), Cmd::Complete);

        let nav = SharedNavigation::default();
        for (code, older) in [(KeyCode::Up, true), (KeyCode::Down, false)] {
            rl.bind_sequence(
                KeyEvent(code, Modifiers::NONE),
                EventHandler::Conditional(Box::new(HistoryKey {
                    nav: Arc::clone(&nav),
                    older,
                })),
            );
        }

        let mut buffer = StatementBuffer::default();
        loop {
            if let Ok(mut nav) = nav.lock() {
                nav.cursor.reset();
                nav.entries = self.session.state().history.entries().to_vec();
            }

            let line = match rl.readline(&prompt(&self.profile, buffer.is_continuing())) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => {
                    buffer.clear();
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("Error reading line: {}", err);
                    break;
                }
            };

            match buffer.feed(&line) {
                Step::Wait => {}
                Step::Exit => break,
                Step::Meta(command) => {
                    if let Err(e) = self.session.handle_meta(command).await {
                        eprintln!("Error: {}", e);
                    }
                }
                Step::Execute(sql) => {
                    self.record(&sql);
                    if let Err(e) = self.session.run_statement(&sql).await {
                        eprintln!("Error: {}", e);
                    }
                }
            }
        }

        self.save_history();
        println!("Goodbye!");
        Ok(())
    }

    fn record(&mut self, sql: &str) {
        self.session.state_mut().history.add(sql);
        self.save_history();
    }

    fn save_history(&self) {
        if let Err(e) = self.session.state().history.save() {
            warn!(error = %e, "failed to save history");
        }
    }
}
