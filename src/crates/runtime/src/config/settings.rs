//! Typed runtime settings read from the environment

use super::env::{EnvSource, ProcessEnv};
use crate::cache::{CacheLocator, HostConvention};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable that overrides where compiled binaries are cached
pub const CACHE_ENV: &str = "MAGEFILE_CACHE";

/// Environment variable that turns on verbose output for a run
pub const VERBOSE_ENV: &str = "MAGEFILE_VERBOSE";

/// Environment variable that bounds the whole run, e.g. `30s` or `2m`
pub const TIMEOUT_ENV: &str = "MAGEFILE_TIMEOUT";

/// Environment variable that turns on debug-level logging
pub const DEBUG_ENV: &str = "MAGEFILE_DEBUG";

/// Read-only view of the runtime settings carried by an environment
///
/// Values are read from the source on every call; nothing is cached.
///
/// # Example
///
/// ```rust
/// use mage_runtime::config::{EnvironmentConfig, MapEnv};
///
/// let config = EnvironmentConfig::new(MapEnv::new().with("MAGEFILE_VERBOSE", "1"));
/// assert!(config.is_verbose());
/// assert!(config.timeout_spec().is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct EnvironmentConfig<S = ProcessEnv> {
    source: S,
}

impl EnvironmentConfig<ProcessEnv> {
    /// Settings from the real process environment
    pub fn from_process() -> Self {
        Self::new(ProcessEnv)
    }
}

impl<S: EnvSource> EnvironmentConfig<S> {
    /// Wrap an environment source
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// The underlying source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Whether verbose mode was requested
    ///
    /// Any non-empty value counts; the content is not interpreted, so
    /// `MAGEFILE_VERBOSE=false` still enables it.
    pub fn is_verbose(&self) -> bool {
        self.source.non_empty(VERBOSE_ENV).is_some()
    }

    /// Whether debug logging was requested, with the same rule as verbose
    pub fn is_debug(&self) -> bool {
        self.source.non_empty(DEBUG_ENV).is_some()
    }

    /// User-supplied cache directory, if any
    pub fn cache_dir_override(&self) -> Option<String> {
        self.source.non_empty(CACHE_ENV)
    }

    /// Raw timeout string, unparsed
    pub fn timeout_spec(&self) -> Option<String> {
        self.source.non_empty(TIMEOUT_ENV)
    }

    /// Raw value of any other variable, used for host-specific lookups
    pub(crate) fn var_or_empty(&self, key: &str) -> String {
        self.source.var_or_empty(key)
    }

    /// Cache directory for this environment on the current host
    pub fn cache_dir(&self) -> PathBuf {
        CacheLocator::new(HostConvention::current()).resolve(self)
    }

    /// Snapshot every setting at once
    pub fn settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            verbose: self.is_verbose(),
            debug: self.is_debug(),
            cache_dir: self.cache_dir(),
            timeout: self.timeout_spec(),
        }
    }
}

/// Resolved runtime settings at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Verbose mode requested
    pub verbose: bool,
    /// Debug logging requested
    pub debug: bool,
    /// Where compiled binaries are cached
    pub cache_dir: PathBuf,
    /// Raw timeout string, if one was set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}
