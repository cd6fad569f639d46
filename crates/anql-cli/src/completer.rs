//! TAB completion for meta-commands, SQL keywords and table names.

use colored::*;
use rustyline::completion::{Completer, Pair};

/// Meta-commands offered for completion, with a short description.
pub(crate) const META_COMMANDS: &[(&str, &str)] = &[
    (".tables", "Show all available tables"),
    (".schema", "Show table schema (.schema TABLE_NAME)"),
    (".ask", "Ask SQL assistant for help (.ask your question)"),
    (".window", "Set time window (.window show|clear|<from> <to>)"),
    (".debug", "Toggle debug mode (.debug on|off|show)"),
    (".format", "Set output format (.format table|csv|json|show)"),
    (".help", "Show help"),
];

pub(crate) const SQL_KEYWORDS: &[(&str, &str)] = &[
    ("SELECT", "Select data from table"),
    ("FROM", "Specify table source"),
    ("WHERE", "Filter condition"),
    ("ORDER BY", "Sort results"),
    ("GROUP BY", "Group results"),
    ("HAVING", "Filter grouped results"),
    ("LIMIT", "Limit number of results"),
    ("COUNT", "Count rows"),
    ("SUM", "Sum values"),
    ("AVG", "Average values"),
    ("MIN", "Minimum value"),
    ("MAX", "Maximum value"),
    ("DISTINCT", "Unique values only"),
    ("AS", "Alias for column/table"),
    ("AND", "Logical AND"),
    ("OR", "Logical OR"),
    ("NOT", "Logical NOT"),
    ("DESC", "Descending order"),
    ("ASC", "Ascending order"),
];

/// A completion candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub text: String,
    pub description: String,
}

impl Suggestion {
    fn new(text: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            description: description.into(),
        }
    }
}

/// Auto-completer for SQL and meta-commands
#[derive(Debug, Clone)]
pub struct AutoCompleter {
    builtin: Vec<Suggestion>,
    tables: Vec<Suggestion>,
    color: bool,
}

impl AutoCompleter {
    pub fn new(color: bool) -> Self {
        let builtin = META_COMMANDS
            .iter()
            .chain(SQL_KEYWORDS)
            .map(|(text, desc)| Suggestion::new(*text, *desc))
            .collect();
        Self {
            builtin,
            tables: Vec::new(),
            color,
        }
    }

    /// Replace the table names fetched from the service.
    pub fn set_tables(&mut self, tables: Vec<String>) {
        self.tables = tables
            .into_iter()
            .map(|t| Suggestion::new(t, "table"))
            .collect();
    }

    /// Suggestions whose text starts with `word`, ignoring case. An empty word yields nothing.
    pub fn suggest(&self, word: &str) -> Vec<&Suggestion> {
        if word.is_empty() {
            return Vec::new();
        }
        let word = word.to_lowercase();
        self.builtin
            .iter()
            .chain(&self.tables)
            .filter(|s| s.text.to_lowercase().starts_with(&word))
            .collect()
    }

    fn display(&self, suggestion: &Suggestion) -> String {
        if self.color {
            format!("{}  {}", suggestion.text.cyan(), suggestion.description.dimmed())
        } else {
            format!("{}  {}", suggestion.text, suggestion.description)
        }
    }
}

/// Byte offset where the word ending at `pos` starts.
fn word_start(line: &str, pos: usize) -> usize {
    line[..pos]
        .rfind(|c: char| c.is_whitespace() || c == '(' || c == ',')
        .map(|i| i + 1)
        .unwrap_or(0)
}

impl Completer for AutoCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = word_start(line, pos);
        let pairs = self
            .suggest(&line[start..pos])
            .into_iter()
            .map(|s| Pair {
                display: self.display(s),
                replacement: s.text.clone(),
            })
            .collect();

        Ok((start, pairs))
    }
}
