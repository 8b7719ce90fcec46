//! Tracing setup for hosts embedding the engine, plus the spans it opens.
//!
//! The library crates only emit `tracing` events; installing a subscriber is
//! left to the host process. Every event emitted while a node handles a
//! batch or a snapshot import sits inside one of the spans below, so the
//! node's `origin` is attached to each of them.

use tracing_subscriber::EnvFilter;

use crate::constants::{DEFAULT_LOG_FILTER, LOG_ENV_VAR, LOG_FORMAT_ENV_VAR};

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event, for log shippers.
    #[default]
    Json,
    /// Single-line human-readable output.
    Compact,
}

impl LogFormat {
    /// Read `MERIDIAN_LOG_FORMAT`. Unset or unrecognised values mean JSON.
    pub fn from_env() -> Self {
        match std::env::var(LOG_FORMAT_ENV_VAR) {
            Ok(raw) if raw.eq_ignore_ascii_case("compact") => LogFormat::Compact,
            _ => LogFormat::Json,
        }
    }
}

/// Install the subscriber configured by the environment.
///
/// `MERIDIAN_LOG` is the filter (default `info`), `MERIDIAN_LOG_FORMAT`
/// picks the format. Only the first installation in a process takes effect.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    install(filter, LogFormat::from_env());
}

/// JSON output with an explicit filter string (for tests or embedding).
pub fn init_tracing_with_filter(filter: &str) {
    install(EnvFilter::new(filter), LogFormat::Json);
}

/// Returns `false` when a global subscriber was already installed.
pub fn install(filter: EnvFilter, format: LogFormat) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);
    match format {
        LogFormat::Json => builder
            .with_file(true)
            .with_line_number(true)
            .json()
            .try_init()
            .is_ok(),
        LogFormat::Compact => builder.compact().try_init().is_ok(),
    }
}

/// Span around one received batch.
#[macro_export]
macro_rules! sync_batch_span {
    ($origin:expr, $batch_len:expr) => {
        tracing::info_span!("meridian.sync_batch", origin = %$origin, batch_len = $batch_len)
    };
}

/// Span around one snapshot import.
#[macro_export]
macro_rules! snapshot_import_span {
    ($origin:expr, $version:expr) => {
        tracing::info_span!("meridian.snapshot_import", origin = %$origin, version = $version)
    };
}

/// Span around one local mutation.
#[macro_export]
macro_rules! local_write_span {
    ($origin:expr, $kind:expr, $path:expr) => {
        tracing::debug_span!("meridian.local_write", origin = %$origin, kind = %$kind, path = %$path)
    };
}
