//! Runtime configuration read from the environment
//!
//! This module owns every environment lookup the runtime performs:
//!
//! - [`EnvSource`] abstracts "get variable X" so tests can inject a
//!   synthetic environment instead of mutating the process one
//! - [`EnvironmentConfig`] exposes the typed, defaulted settings
//!   (verbose flag, cache override, timeout string)
//!
//! # Example
//!
//! ```rust
//! use mage_runtime::config::{EnvironmentConfig, MapEnv, CACHE_ENV};
//!
//! let config = EnvironmentConfig::new(MapEnv::new().with(CACHE_ENV, "/tmp/cache"));
//! assert_eq!(config.cache_dir_override().as_deref(), Some("/tmp/cache"));
//! assert!(!config.is_verbose());
//! ```

mod env;
mod settings;

pub use env::{EnvSource, MapEnv, ProcessEnv};
pub use settings::{
    EnvironmentConfig, RuntimeSettings, CACHE_ENV, DEBUG_ENV, TIMEOUT_ENV, VERBOSE_ENV,
};
