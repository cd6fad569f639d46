//! Statement history and Up/Down navigation over it.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::Result;

/// Executed statements, oldest first, backed by a plain text file.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<String>,
    path: Option<PathBuf>,
}

impl History {
    /// In-memory history that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load history from `path`. A missing or unreadable file starts empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(data) => data
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "could not read history");
                }
                Vec::new()
            }
        };

        Self {
            entries,
            path: Some(path),
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a statement; blank input is ignored.
    pub fn add(&mut self, statement: &str) {
        let statement = statement.trim();
        if !statement.is_empty() {
            self.entries.push(statement.to_string());
        }
    }

    /// Most recent entry that is a SQL statement (not a meta or exit command).
    pub fn last_statement(&self) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .map(|e| e.trim())
            .find(|e| !e.starts_with('.') && !is_exit_command(e))
    }

    /// Write all entries to the backing file, one per line.
    pub fn save(&self) -> Result<()> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, self.entries.join("\n"))?;
        }
        Ok(())
    }
}

/// `exit`, `quit`, `\q`, `.exit` or `.quit`, in any case.
pub fn is_exit_command(input: &str) -> bool {
    matches!(
        input.trim().to_lowercase().as_str(),
        "exit" | "quit" | "\\q" | ".exit" | ".quit"
    )
}

/// Position while stepping through history with Up/Down.
///
/// The line being typed is kept as the draft on the first step up and
/// given back when stepping down past the newest entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HistoryCursor {
    #[default]
    Editing,
    /// `offset` 1 is the newest entry.
    Browsing { offset: usize, draft: String },
}

impl HistoryCursor {
    /// Step to an older entry. Returns the text to show, if it changes.
    pub fn up(&mut self, entries: &[String], current: &str) -> Option<String> {
        if entries.is_empty() {
            return None;
        }

        let (offset, draft) = match std::mem::take(self) {
            HistoryCursor::Editing => (1, current.to_string()),
            HistoryCursor::Browsing { offset, draft } => ((offset + 1).min(entries.len()), draft),
        };

        let text = entries[entries.len() - offset].clone();
        *self = HistoryCursor::Browsing { offset, draft };
        Some(text)
    }

    /// Step to a newer entry, ending at the saved draft.
    pub fn down(&mut self, entries: &[String]) -> Option<String> {
        match std::mem::take(self) {
            HistoryCursor::Editing => None,
            HistoryCursor::Browsing { offset, draft } if offset <= 1 || entries.is_empty() => {
                Some(draft)
            }
            HistoryCursor::Browsing { offset, draft } => {
                let offset = (offset - 1).min(entries.len());
                let text = entries[entries.len() - offset].clone();
                *self = HistoryCursor::Browsing { offset, draft };
                Some(text)
            }
        }
    }

    pub fn reset(&mut self) {
        *self = HistoryCursor::Editing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_load_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history");
        std::fs::write(&path, "SELECT 1;\n\n   \n  SELECT 2;  \n").unwrap();

        let history = History::load(&path);
        assert_eq!(history.entries(), &["SELECT 1;", "SELECT 2;"]);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history");

        let mut history = History::load(&path);
        assert!(history.is_empty());
        history.add("SELECT 1;");
        history.add("   ");
        history.add("SELECT 2;");
        history.save().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "SELECT 1;\nSELECT 2;");
        assert_eq!(History::load(&path).len(), 2);
    }

    #[test]
    fn test_last_statement_skips_commands() {
        let mut history = History::in_memory();
        assert_eq!(history.last_statement(), None);
        history.add("SELECT * FROM a;");
        history.add(".tables");
        history.add("EXIT");
        assert_eq!(history.last_statement(), Some("SELECT * FROM a;"));
    }

    #[test]
    fn test_exit_commands() {
        for cmd in ["exit", "QUIT", "\\q", ".exit", " .Quit "] {
            assert!(is_exit_command(cmd), "{cmd}");
        }
        assert!(!is_exit_command("exit now"));
        assert!(!is_exit_command("SELECT 1"));
    }

    #[test]
    fn test_cursor_walks_and_restores_draft() {
        let list = entries(&["one", "two", "three"]);
        let mut cursor = HistoryCursor::default();

        assert_eq!(cursor.up(&list, "draft"), Some("three".to_string()));
        assert_eq!(cursor.up(&list, "ignored"), Some("two".to_string()));
        assert_eq!(cursor.up(&list, ""), Some("one".to_string()));
        // clamps at the oldest entry
        assert_eq!(cursor.up(&list, ""), Some("one".to_string()));

        assert_eq!(cursor.down(&list), Some("two".to_string()));
        assert_eq!(cursor.down(&list), Some("three".to_string()));
        assert_eq!(cursor.down(&list), Some("draft".to_string()));
        assert_eq!(cursor, HistoryCursor::Editing);
        assert_eq!(cursor.down(&list), None);
    }

    #[test]
    fn test_cursor_on_empty_history() {
        let mut cursor = HistoryCursor::default();
        assert_eq!(cursor.up(&[], "x"), None);
        assert_eq!(cursor, HistoryCursor::Editing);
    }

    #[test]
    fn test_reset() {
        let list = entries(&["one"]);
        let mut cursor = HistoryCursor::default();
        cursor.up(&list, "");
        cursor.reset();
        assert_eq!(cursor, HistoryCursor::Editing);
    }
}
