//! Environment sources
//!
//! Every read of the process environment goes through [`EnvSource`], so the
//! rest of the crate can be driven by a synthetic environment in tests.

use std::collections::HashMap;
use std::env;

/// Something that can answer "what is the value of variable X"
pub trait EnvSource: Send + Sync {
    /// Raw value of `key`, or `None` if it is not set
    fn var(&self, key: &str) -> Option<String>;

    /// Value of `key` if it is set to a non-empty string
    ///
    /// An empty value is indistinguishable from an unset one everywhere in
    /// this crate.
    fn non_empty(&self, key: &str) -> Option<String> {
        self.var(key).filter(|val| !val.is_empty())
    }

    /// Value of `key`, or an empty string if it is not set
    fn var_or_empty(&self, key: &str) -> String {
        self.var(key).unwrap_or_default()
    }
}

impl<T: EnvSource + ?Sized> EnvSource for &T {
    fn var(&self, key: &str) -> Option<String> {
        (**self).var(key)
    }
}

impl<T: EnvSource + ?Sized> EnvSource for std::sync::Arc<T> {
    fn var(&self, key: &str) -> Option<String> {
        (**self).var(key)
    }
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    /// Values that are not valid UTF-8 are reported as unset.
    fn var(&self, key: &str) -> Option<String> {
        match env::var(key) {
            Ok(val) => Some(val),
            Err(env::VarError::NotPresent) => None,
            Err(env::VarError::NotUnicode(_)) => {
                tracing::debug!("Ignoring environment variable {} with invalid UTF-8", key);
                None
            }
        }
    }
}

/// In-memory environment
///
/// # Example
///
/// ```rust
/// use mage_runtime::config::{EnvSource, MapEnv};
///
/// let env = MapEnv::new().with("HOME", "/home/u");
/// assert_eq!(env.var("HOME").as_deref(), Some("/home/u"));
/// assert!(env.var("MAGEFILE_CACHE").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    /// Create an empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Set a variable in place
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Remove a variable
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.vars.remove(key)
    }
}

impl<K, V> FromIterator<(K, V)> for MapEnv
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl EnvSource for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_env_missing() {
        assert!(ProcessEnv.var("MAGE_RUNTIME_TEST_MISSING_VAR_12345").is_none());
        assert!(ProcessEnv
            .non_empty("MAGE_RUNTIME_TEST_MISSING_VAR_12345")
            .is_none());
    }

    #[test]
    fn test_process_env_present() {
        // PATH is set in every environment the tests run in
        let path = ProcessEnv.var("PATH");
        assert!(path.is_some());
    }

    #[test]
    fn test_map_env_non_empty() {
        let env = MapEnv::new().with("SET", "value").with("EMPTY", "");

        assert_eq!(env.non_empty("SET"), Some("value".to_string()));
        assert_eq!(env.var("EMPTY"), Some(String::new()));
        assert!(env.non_empty("EMPTY").is_none());
        assert!(env.non_empty("UNSET").is_none());
    }

    #[test]
    fn test_map_env_var_or_empty() {
        let env = MapEnv::new().with("HOME", "/home/u");
        assert_eq!(env.var_or_empty("HOME"), "/home/u");
        assert_eq!(env.var_or_empty("HOMEDRIVE"), "");
    }

    #[test]
    fn test_map_env_set_and_remove() {
        let mut env = MapEnv::new();
        env.set("KEY", "one");
        env.set("KEY", "two");
        assert_eq!(env.var("KEY").as_deref(), Some("two"));

        assert_eq!(env.remove("KEY").as_deref(), Some("two"));
        assert!(env.var("KEY").is_none());
    }

    #[test]
    fn test_map_env_from_iter() {
        let env: MapEnv = [("A", "1"), ("B", "2")].into_iter().collect();
        assert_eq!(env.var("A").as_deref(), Some("1"));
        assert_eq!(env.var("B").as_deref(), Some("2"));
    }

    #[test]
    fn test_borrowed_source() {
        fn read<S: EnvSource>(source: S) -> Option<String> {
            source.non_empty("KEY")
        }

        let env = MapEnv::new().with("KEY", "value");
        assert_eq!(read(&env).as_deref(), Some("value"));
        assert_eq!(read(std::sync::Arc::new(env)).as_deref(), Some("value"));
    }
}
