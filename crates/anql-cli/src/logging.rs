//! Diagnostic logging setup.
//!
//! Events go to stderr through a reloadable level filter so `.debug on`
//! can raise verbosity for the rest of the session.

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, Registry};

/// Handle for changing the log level at runtime.
#[derive(Clone)]
pub struct LogControl {
    handle: Option<reload::Handle<LevelFilter, Registry>>,
    base: LevelFilter,
}

impl LogControl {
    /// Install the global subscriber. The base level comes from `RUST_LOG`
    /// (a bare level name), defaulting to WARN; `debug` raises it to DEBUG.
    pub fn init(debug: bool) -> Self {
        let base = std::env::var("RUST_LOG")
            .ok()
            .and_then(|v| v.parse::<Level>().ok())
            .map(LevelFilter::from_level)
            .unwrap_or(LevelFilter::WARN);

        let (filter, handle) = reload::Layer::new(Self::level_for(base, debug));
        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()
            .is_ok();

        Self {
            handle: installed.then_some(handle),
            base,
        }
    }

    /// A control that changes nothing (tests, or when a subscriber already exists).
    pub fn noop() -> Self {
        Self {
            handle: None,
            base: LevelFilter::WARN,
        }
    }

    pub fn set_debug(&self, debug: bool) {
        if let Some(handle) = &self.handle {
            if let Err(e) = handle.reload(Self::level_for(self.base, debug)) {
                eprintln!("Warning: failed to change log level: {}", e);
            }
        }
    }

    fn level_for(base: LevelFilter, debug: bool) -> LevelFilter {
        if debug {
            base.max(LevelFilter::DEBUG)
        } else {
            base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_never_lowers_verbosity() {
        assert_eq!(LogControl::level_for(LevelFilter::WARN, true), LevelFilter::DEBUG);
        assert_eq!(LogControl::level_for(LevelFilter::TRACE, true), LevelFilter::TRACE);
        assert_eq!(LogControl::level_for(LevelFilter::INFO, false), LevelFilter::INFO);
    }

    #[test]
    fn test_noop_control() {
        LogControl::noop().set_debug(true);
    }
}
