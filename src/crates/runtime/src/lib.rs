//! Runtime settings and the shared execution context for mage runs
//!
//! Task execution, binary caching and verbose reporting all consult this
//! crate before doing real work.
//!
//! # Modules
//!
//! - `config` - Environment sources and the typed settings read from them
//! - `cache` - Where compiled binaries are cached
//! - `duration` - Human-readable duration strings such as `30s` or `1h15m`
//! - `context` - The single cancellable, optionally deadline-bound context
//! - `logging` - Log level selection and duration formatting
//!
//! # Example
//!
//! ```rust,no_run
//! fn main() {
//!     let (ctx, cancel) = match mage_runtime::context() {
//!         Ok(pair) => pair,
//!         Err(e) => {
//!             eprintln!("timeout error: {}", e);
//!             std::process::exit(1);
//!         }
//!     };
//!     let _guard = cancel.guard();
//!
//!     println!("caching in {}", mage_runtime::cache_dir().display());
//!     assert!(!ctx.is_done());
//! }
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod duration;
pub mod logging;

use config::{EnvironmentConfig, TIMEOUT_ENV};
use context::{CancelHandle, DoneReason, ExecutionContext};
use duration::DurationParseError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The run timeout could not be parsed; fatal for the run
    #[error("invalid {} value {value:?}", TIMEOUT_ENV)]
    InvalidTimeout {
        value: String,
        #[source]
        source: DurationParseError,
    },

    /// The execution context finished before the work did
    #[error("{0}")]
    Done(DoneReason),
}

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Whether the current run was started in verbose mode
pub fn verbose() -> bool {
    EnvironmentConfig::from_process().is_verbose()
}

/// Where compiled binaries are cached for the current process environment
///
/// Defaults to `$HOME/.magefile`, overridable with `MAGEFILE_CACHE`.
pub fn cache_dir() -> PathBuf {
    EnvironmentConfig::from_process().cache_dir()
}

/// The process-wide execution context
///
/// See [`context::ContextManager::get_context`].
pub fn context() -> Result<(ExecutionContext, CancelHandle)> {
    context::global().get_context()
}

/// Get version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_invalid_timeout_message() {
        let err = RuntimeError::InvalidTimeout {
            value: "soon".to_string(),
            source: DurationParseError::Invalid("soon".to_string()),
        };

        assert_eq!(err.to_string(), "invalid MAGEFILE_TIMEOUT value \"soon\"");
        assert_eq!(
            err.source().map(|s| s.to_string()),
            Some("invalid duration \"soon\"".to_string())
        );
    }

    #[test]
    fn test_done_message() {
        let err = RuntimeError::Done(DoneReason::DeadlineExceeded);
        assert_eq!(err.to_string(), "context deadline exceeded");
    }

    #[test]
    fn test_version() {
        let v = version();
        assert!(!v.is_empty());
    }
}
