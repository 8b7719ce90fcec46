/// Meridian engine version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Separator between key path segments.
pub const PATH_SEPARATOR: char = '.';

/// Environment variable consulted by [`crate::tracing_setup::init_tracing`].
pub const LOG_ENV_VAR: &str = "MERIDIAN_LOG";

/// Selects `json` (default) or `compact` subscriber output.
pub const LOG_FORMAT_ENV_VAR: &str = "MERIDIAN_LOG_FORMAT";

/// Filter used when `MERIDIAN_LOG` is unset or invalid.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Prefix for configuration environment overrides.
pub const CONFIG_ENV_PREFIX: &str = "MERIDIAN_";
