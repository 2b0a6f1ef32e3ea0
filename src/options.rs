//! Injector configuration.

use std::env;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default recursion limit for a single resolution
pub const MAX_DEPTH: usize = 1024;

const ENV_PREFIX: &str = "ANVIL_DI";

/// Tunables for an [`Injector`](crate::Injector).
///
/// # Examples
///
/// ```rust
/// use anvil_di::InjectorOptions;
///
/// let options = InjectorOptions::from_lookup(|key| match key {
///     "ANVIL_DI_MAX_DEPTH" => Some("64".to_string()),
///     "ANVIL_DI_PREWARM" => Some("false".to_string()),
///     _ => None,
/// });
/// assert_eq!(options.max_depth, 64);
/// assert!(!options.prewarm_singletons);
/// assert_eq!(options.cache_namespace, "anvil-di");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectorOptions {
    /// Deepest dependency chain one resolution may walk
    pub max_depth: usize,
    /// Rebuild snapshot singletons when a compiled graph is loaded
    pub prewarm_singletons: bool,
    /// Prefix of every compiled graph cache key
    pub cache_namespace: String,
}

impl Default for InjectorOptions {
    fn default() -> Self {
        Self {
            max_depth: MAX_DEPTH,
            prewarm_singletons: true,
            cache_namespace: "anvil-di".to_string(),
        }
    }
}

impl InjectorOptions {
    /// Reads `ANVIL_DI_MAX_DEPTH`, `ANVIL_DI_PREWARM` and `ANVIL_DI_CACHE_NAMESPACE`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();
        let var = |name: &str| {
            let key = format!("{}_{}", ENV_PREFIX, name);
            lookup(&key).map(|value| (key, value))
        };

        if let Some((key, value)) = var("MAX_DEPTH") {
            match value.trim().parse::<usize>() {
                Ok(depth) if depth > 0 => options.max_depth = depth,
                _ => warn!(%key, %value, "ignoring invalid max depth"),
            }
        }
        if let Some((key, value)) = var("PREWARM") {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => options.prewarm_singletons = true,
                "0" | "false" | "no" | "off" => options.prewarm_singletons = false,
                _ => warn!(%key, %value, "ignoring invalid prewarm flag"),
            }
        }
        if let Some((key, value)) = var("CACHE_NAMESPACE") {
            if value.trim().is_empty() {
                warn!(%key, "ignoring empty cache namespace");
            } else {
                options.cache_namespace = value.trim().to_string();
            }
        }
        options
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_prewarm(mut self, prewarm: bool) -> Self {
        self.prewarm_singletons = prewarm;
        self
    }

    pub fn with_cache_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.cache_namespace = namespace.into();
        self
    }
}
