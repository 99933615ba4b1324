//! Default configuration values
//!
//! Single source of truth for defaults, shared by the serde defaults, the
//! CLI help text and the tests.

/// Environment variable prefix for all configuration options
///
/// `TCP_DEMUX_PORT=8000`, `TCP_DEMUX_DESTINATIONS__SSH=127.0.0.1:22`, ...
pub const ENV_PREFIX: &str = "TCP_DEMUX";

/// Separator between nested keys in environment variable names
pub const ENV_SEPARATOR: &str = "__";

/// Default listen host
pub const HOST_STR: &str = "0.0.0.0";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Default listen host
pub fn host() -> String {
    HOST_STR.to_string()
}

/// Default listen port; zero means "not configured"
pub fn port() -> u16 {
    0
}

/// Transparent proxying is on by default, where the platform supports it
pub fn transparent() -> bool {
    true
}

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}

/// Default detection timeout in seconds; zero disables it
pub fn detect_timeout() -> u64 {
    0
}
