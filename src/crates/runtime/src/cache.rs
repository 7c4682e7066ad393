//! Cache directory resolution
//!
//! Computes where compiled binaries live. Nothing here touches the
//! filesystem: the directory is neither created nor checked.

use crate::config::{EnvSource, EnvironmentConfig};
use std::path::PathBuf;

/// Subdirectory of `$HOME` used on unix-style hosts
pub const CACHE_DIR_NAME: &str = ".magefile";

/// Subdirectory of `%HOMEDRIVE%%HOMEPATH%` used on Windows hosts
pub const WINDOWS_CACHE_DIR_NAME: &str = "magefile";

/// How a host describes the user's home location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostConvention {
    /// `HOMEDRIVE` + `HOMEPATH`
    Windows,
    /// `HOME`
    Unix,
}

impl HostConvention {
    /// Convention of the host this binary was built for
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Unix
        }
    }
}

/// Resolves the cache directory for an environment
#[derive(Debug, Clone, Copy)]
pub struct CacheLocator {
    convention: HostConvention,
}

impl Default for CacheLocator {
    fn default() -> Self {
        Self::new(HostConvention::current())
    }
}

impl CacheLocator {
    /// Create a locator for the given host convention
    pub fn new(convention: HostConvention) -> Self {
        Self { convention }
    }

    /// Host convention used for the default path
    pub fn convention(&self) -> HostConvention {
        self.convention
    }

    /// Cache directory for `config`
    ///
    /// An override is returned verbatim. Otherwise the home variables are
    /// joined with the cache subdirectory; unset home variables contribute
    /// empty segments and the result is returned as-is, even if relative.
    pub fn resolve<S: EnvSource>(&self, config: &EnvironmentConfig<S>) -> PathBuf {
        if let Some(dir) = config.cache_dir_override() {
            tracing::debug!("Using cache directory override: {}", dir);
            return PathBuf::from(dir);
        }

        match self.convention {
            HostConvention::Windows => PathBuf::from(config.var_or_empty("HOMEDRIVE"))
                .join(config.var_or_empty("HOMEPATH"))
                .join(WINDOWS_CACHE_DIR_NAME),
            HostConvention::Unix => {
                PathBuf::from(config.var_or_empty("HOME")).join(CACHE_DIR_NAME)
            }
        }
    }
}
