//! Diagnostics for the guard.
//!
//! Logs always go to stderr: `ghostblock filter` writes forwarded touches to
//! stdout, and a log line there would reach the consumer as a bogus touch.
//!
//! Levels as used across the crate:
//! - `info`: session start and finish, settings changes, guard startup
//! - `warn`: unreadable persisted data, failed promotion, stale recording
//!   markers
//! - `debug`: reloads, timer replacement, lease bookkeeping
//! - `trace`: one line per touch decision and per timer, so only enable it
//!   when chasing a specific misfire

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Verbosity level for logging output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Suppress all output except errors.
    Quiet,
    /// Normal output level (info and above).
    #[default]
    Normal,
    /// Verbose output (debug and above).
    Verbose,
    /// Very verbose output (trace level, includes per-touch decisions).
    Trace,
}

impl Verbosity {
    /// Convert verbosity to tracing level filter.
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }
}

/// Install the stderr subscriber for the `ghostblock` target.
///
/// `verbosity` comes from `-q`/`-v`/`-vv`. `RUST_LOG` wins when set, e.g.
/// `RUST_LOG=ghostblock::filter=trace` to watch decisions without the timer
/// noise. Later calls are ignored.
///
/// # Examples
///
/// ```no_run
/// use ghostblock::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::Verbose);
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let default_filter = format!("ghostblock={}", verbosity.to_level_filter());

    // Allow RUST_LOG to override
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    );

    // Install the subscriber (ignore error if already set)
    let _ = subscriber.try_init();
}

/// Initialize logging for tests.
///
/// Only warnings and errors are shown to keep test output clean.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
