//! Wait-phase feedback: spinner, Escape watcher and the cancel signal.
//!
//! [`WaitScope`] owns everything that runs in the background while a query
//! is being waited on. It is created right after submission and torn down
//! through [`WaitScope::end`] before the result is downloaded, so no
//! background activity outlives the wait phase.

use std::future::pending;
use std::time::Duration;

use colored::*;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::debug;

const TICK_STRINGS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const TICK_INTERVAL: Duration = Duration::from_millis(100);
const KEY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Receiving half of a one-shot user cancellation.
///
/// Once fired it stays fired. A signal whose sender is dropped without
/// firing never completes.
#[derive(Debug)]
pub struct CancelSignal {
    rx: Option<oneshot::Receiver<()>>,
    fired: bool,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self {
            rx: None,
            fired: false,
        }
    }

    /// A connected sender and signal.
    pub fn pair() -> (oneshot::Sender<()>, Self) {
        let (tx, rx) = oneshot::channel();
        (
            tx,
            Self {
                rx: Some(rx),
                fired: false,
            },
        )
    }

    /// Resolves once the user has asked to cancel.
    pub async fn cancelled(&mut self) {
        if self.fired {
            return;
        }

        if let Some(rx) = self.rx.as_mut() {
            let fired = rx.await.is_ok();
            self.rx = None;
            if fired {
                self.fired = true;
                return;
            }
        }

        pending::<()>().await
    }
}

/// Spinner and Escape watcher for the duration of one wait phase.
pub struct WaitScope {
    spinner: Option<ProgressBar>,
    stop_tx: Option<oneshot::Sender<()>>,
    watcher: Option<JoinHandle<()>>,
}

impl WaitScope {
    /// A scope with nothing running (silent or debug mode).
    pub fn inactive() -> (Self, CancelSignal) {
        (
            Self {
                spinner: None,
                stop_tx: None,
                watcher: None,
            },
            CancelSignal::never(),
        )
    }

    /// Start the spinner and Escape watcher when `interactive` is set.
    pub fn begin(interactive: bool) -> (Self, CancelSignal) {
        if !interactive {
            return Self::inactive();
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .tick_strings(TICK_STRINGS)
                .template("{spinner:.cyan} Executing query... {elapsed} (press ESC to cancel)")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(TICK_INTERVAL);

        let (cancel_tx, signal) = CancelSignal::pair();
        let (stop_tx, stop_rx) = oneshot::channel();
        let watcher = tokio::task::spawn_blocking(move || watch_for_escape(stop_rx, cancel_tx));

        (
            Self {
                spinner: Some(spinner),
                stop_tx: Some(stop_tx),
                watcher: Some(watcher),
            },
            signal,
        )
    }

    /// Stop every background activity and wait for it to finish.
    pub async fn end(mut self, cancelled: bool) {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        if let Some(watcher) = self.watcher.take() {
            if let Err(e) = watcher.await {
                debug!(error = %e, "escape watcher ended abnormally");
            }
        }
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
        if cancelled {
            eprintln!("{}", "Query cancelled".red());
        }
    }
}

impl Drop for WaitScope {
    fn drop(&mut self) {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

/// Poll the terminal for Escape until told to stop. Runs on a blocking thread.
fn watch_for_escape(mut stop_rx: oneshot::Receiver<()>, cancel_tx: oneshot::Sender<()>) {
    if let Err(e) = terminal::enable_raw_mode() {
        debug!(error = %e, "raw mode unavailable, escape cancel disabled");
        return;
    }

    let mut cancel_tx = Some(cancel_tx);
    loop {
        match stop_rx.try_recv() {
            Err(TryRecvError::Empty) => {}
            _ => break,
        }

        match event::poll(KEY_POLL_INTERVAL) {
            Ok(true) => {
                if let Ok(Event::Key(key)) = event::read() {
                    if key.code == KeyCode::Esc && key.kind == KeyEventKind::Press {
                        if let Some(tx) = cancel_tx.take() {
                            let _ = tx.send(());
                        }
                        break;
                    }
                }
            }
            Ok(false) => {}
            Err(_) => break,
        }
    }

    let _ = terminal::disable_raw_mode();
}

/// Spinner shown while the SQL assistant is thinking.
pub fn assistant_spinner(visible: bool) -> Option<ProgressBar> {
    if !visible {
        return None;
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(TICK_STRINGS)
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Asking SQL assistant...");
    spinner.enable_steady_tick(TICK_INTERVAL);
    Some(spinner)
}
