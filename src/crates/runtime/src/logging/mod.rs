//! Logging helpers
//!
//! The runtime only emits `tracing` events; installing a subscriber is left
//! to the host binary, which picks its level with [`log_level`].

use crate::config::{EnvSource, EnvironmentConfig};
use std::time::Duration;
use tracing::Level;

/// Maximum log level for a run
///
/// Debug wins over verbose; with neither set only warnings and errors are
/// shown.
///
/// # Example
///
/// ```rust
/// use mage_runtime::config::{EnvironmentConfig, MapEnv, VERBOSE_ENV};
/// use mage_runtime::logging::log_level;
/// use tracing::Level;
///
/// let config = EnvironmentConfig::new(MapEnv::new().with(VERBOSE_ENV, "1"));
/// assert_eq!(log_level(&config), Level::INFO);
/// ```
pub fn log_level<S: EnvSource>(config: &EnvironmentConfig<S>) -> Level {
    if config.is_debug() {
        Level::DEBUG
    } else if config.is_verbose() {
        Level::INFO
    } else {
        Level::WARN
    }
}

/// Format duration in human-readable form
///
/// # Example
///
/// ```rust
/// use mage_runtime::logging::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
/// assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
/// assert_eq!(format_duration(Duration::from_secs(7320)), "2h2m0s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let micros = duration.as_micros();

    if micros < 1000 {
        format!("{}μs", micros)
    } else if micros < 1_000_000 {
        format!("{}ms", micros / 1000)
    } else if micros < 60_000_000 {
        format!("{:.2}s", micros as f64 / 1_000_000.0)
    } else {
        let seconds = micros / 1_000_000;
        let hours = seconds / 3600;
        let minutes = (seconds % 3600) / 60;
        let secs = seconds % 60;
        if hours > 0 {
            format!("{}h{}m{}s", hours, minutes, secs)
        } else {
            format!("{}m{}s", minutes, secs)
        }
    }
}
