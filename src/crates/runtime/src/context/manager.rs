//! Process-wide owner of the shared execution context

use super::{CancelHandle, ExecutionContext};
use crate::config::{EnvSource, EnvironmentConfig, ProcessEnv, TIMEOUT_ENV};
use crate::duration::parse_duration;
use crate::logging::format_duration;
use crate::{Result, RuntimeError};
use parking_lot::Mutex;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Builds the execution context on first request and hands the same pair
/// to every later caller
///
/// Construction reads the timeout once; later calls never look at the
/// environment again. A malformed timeout yields
/// [`RuntimeError::InvalidTimeout`] and leaves the manager empty, so no
/// usable context is ever produced from it.
///
/// # Example
///
/// ```rust
/// use mage_runtime::config::MapEnv;
/// use mage_runtime::context::{ContextManager, ExecutionContext};
///
/// let manager = ContextManager::new(MapEnv::new().with("MAGEFILE_TIMEOUT", "10s"));
/// let (first, _) = manager.get_context().unwrap();
/// let (second, _) = manager.get_context().unwrap();
/// assert!(ExecutionContext::ptr_eq(&first, &second));
/// ```
pub struct ContextManager<S = ProcessEnv> {
    config: EnvironmentConfig<S>,
    slot: OnceLock<(ExecutionContext, CancelHandle)>,
    init_lock: Mutex<()>,
}

impl<S> std::fmt::Debug for ContextManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextManager")
            .field("initialized", &self.slot.get().is_some())
            .finish()
    }
}

impl<S: EnvSource> ContextManager<S> {
    /// Create a manager reading from `source`
    pub fn new(source: S) -> Self {
        Self::with_config(EnvironmentConfig::new(source))
    }

    /// Create a manager over an existing config
    pub fn with_config(config: EnvironmentConfig<S>) -> Self {
        Self {
            config,
            slot: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    /// The settings this manager reads from
    pub fn config(&self) -> &EnvironmentConfig<S> {
        &self.config
    }

    /// Whether the context has been built
    pub fn is_initialized(&self) -> bool {
        self.slot.get().is_some()
    }

    /// The shared context and its cancel handle
    ///
    /// Callers should hold the cancel handle's [`guard`](CancelHandle::guard)
    /// for the duration of their work.
    pub fn get_context(&self) -> Result<(ExecutionContext, CancelHandle)> {
        if let Some((ctx, cancel)) = self.slot.get() {
            return Ok((ctx.clone(), cancel.clone()));
        }

        let _init = self.init_lock.lock();
        if let Some((ctx, cancel)) = self.slot.get() {
            return Ok((ctx.clone(), cancel.clone()));
        }

        let built = self.build()?;
        let (ctx, cancel) = self.slot.get_or_init(|| built);
        Ok((ctx.clone(), cancel.clone()))
    }

    fn build(&self) -> Result<(ExecutionContext, CancelHandle)> {
        let Some(spec) = self.config.timeout_spec() else {
            debug!("{} not set, execution context has no deadline", TIMEOUT_ENV);
            return Ok(ExecutionContext::background());
        };

        let timeout = parse_duration(&spec).map_err(|source| RuntimeError::InvalidTimeout {
            value: spec.clone(),
            source,
        })?;

        info!("Run bounded by {}={} ({})", TIMEOUT_ENV, spec, format_duration(timeout));
        Ok(ExecutionContext::with_timeout(timeout))
    }
}

/// The manager for this process, reading the real environment
pub fn global() -> &'static ContextManager {
    static GLOBAL: OnceLock<ContextManager> = OnceLock::new();
    GLOBAL.get_or_init(|| ContextManager::new(ProcessEnv))
}
