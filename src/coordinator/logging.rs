//! Opt-in diagnostic logging
//!
//! Coordinators emit `tracing` events only on cold paths (construction, stop
//! publication, resets, worker membership). Nothing is printed unless the
//! embedding application installs a subscriber, or calls `init_logging` and
//! sets `RINGCOND_LOG`.

use tracing::Level;

/// Environment variable holding the log level
pub const LOG_ENV: &str = "RINGCOND_LOG";

/// Install a stderr subscriber at the level named by `RINGCOND_LOG`
///
/// Returns true if a subscriber was installed. Does nothing when the variable
/// is unset or unparsable, or when a global subscriber already exists.
pub fn init_logging() -> bool {
    match std::env::var(LOG_ENV).ok().as_deref().and_then(parse_level) {
        Some(level) => init_logging_at(level),
        None => false,
    }
}

/// Install a stderr subscriber at `level`
pub fn init_logging_at(level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}

/// Accepts the usual level names in any case, plus "1"/"true" for debug
pub fn parse_level(value: &str) -> Option<Level> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Some(Level::DEBUG),
        "" | "0" | "false" | "off" => None,
        other => other.parse().ok(),
    }
}
