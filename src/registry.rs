//! Process-wide provider factory registry with environment auto-detection.
//!
//! Providers register a [`ProviderFactory`] once at program start (normally
//! via [`crate::providers::register_builtins`]); the registry is read-only
//! thereafter. Runtime re-registration is not supported; the store is
//! guarded by a read-write lock sized for many readers and init-time writers
//! only.
//!
//! Auto-detection asks each factory for `(priority, available)` over the
//! process environment (no network) and picks the highest-priority available
//! factory, breaking ties by name ascending so repeated runs are
//! deterministic.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use crate::client::AiClient;
use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Result of probing the process environment for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    /// Preference weight; higher wins during auto-detection.
    pub priority: i32,
    /// Whether the environment carries enough to construct a working client.
    pub available: bool,
}

/// Constructor and environment probe for one provider family.
///
/// `detect_environment` must be a pure function over the process environment
/// and `create` must not perform network calls; both are invoked on caller
/// threads during client construction.
pub trait ProviderFactory: Send + Sync {
    /// Unique registry key, e.g. `openai`.
    fn name(&self) -> &str;

    /// Human-readable description for diagnostics.
    fn description(&self) -> &str;

    /// Probe the process environment, no network.
    fn detect_environment(&self) -> Detection;

    /// Build a client from a resolved configuration, no network.
    fn create(&self, config: &ClientConfig) -> Result<Arc<dyn AiClient>>;
}

/// One row of [`info`] output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub name: String,
    pub description: String,
    pub available: bool,
    pub priority: i32,
}

static REGISTRY: LazyLock<RwLock<HashMap<String, Arc<dyn ProviderFactory>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Register a factory under its name.
///
/// Fails with a configuration error when the name is empty or already taken.
pub fn register(factory: Arc<dyn ProviderFactory>) -> Result<()> {
    let name = factory.name().to_string();
    if name.is_empty() {
        return Err(Error::config("provider factory name cannot be empty"));
    }

    let mut registry = REGISTRY.write().expect("provider registry poisoned");
    if registry.contains_key(&name) {
        return Err(Error::config(format!(
            "provider '{name}' is already registered"
        )));
    }
    registry.insert(name, factory);
    Ok(())
}

/// Look up a factory by name.
pub fn get(name: &str) -> Option<Arc<dyn ProviderFactory>> {
    REGISTRY
        .read()
        .expect("provider registry poisoned")
        .get(name)
        .cloned()
}

/// Registered names, lexicographically sorted for deterministic logs and
/// tests.
pub fn list() -> Vec<String> {
    let mut names: Vec<String> = REGISTRY
        .read()
        .expect("provider registry poisoned")
        .keys()
        .cloned()
        .collect();
    names.sort();
    names
}

/// Diagnostic rows for every registered factory, sorted by priority
/// descending then name ascending.
pub fn info() -> Vec<ProviderInfo> {
    let registry = REGISTRY.read().expect("provider registry poisoned");
    let mut rows: Vec<ProviderInfo> = registry
        .values()
        .map(|factory| {
            let detection = factory.detect_environment();
            ProviderInfo {
                name: factory.name().to_string(),
                description: factory.description().to_string(),
                available: detection.available,
                priority: detection.priority,
            }
        })
        .collect();
    rows.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.name.cmp(&b.name)));
    rows
}

/// Pick the best available provider from the registered factories.
pub fn detect() -> Result<String> {
    let factories: Vec<Arc<dyn ProviderFactory>> = REGISTRY
        .read()
        .expect("provider registry poisoned")
        .values()
        .cloned()
        .collect();
    detect_among(&factories)
}

/// Pure selection over an explicit factory set: highest priority wins, ties
/// break by name ascending, unavailable factories are ignored.
pub fn detect_among(factories: &[Arc<dyn ProviderFactory>]) -> Result<String> {
    let mut best: Option<(i32, String)> = None;
    for factory in factories {
        let detection = factory.detect_environment();
        if !detection.available {
            continue;
        }
        let candidate = (detection.priority, factory.name().to_string());
        best = match best {
            None => Some(candidate),
            Some((priority, name)) => {
                if candidate.0 > priority || (candidate.0 == priority && candidate.1 < name) {
                    Some(candidate)
                } else {
                    Some((priority, name))
                }
            }
        };
    }
    best.map(|(_, name)| name).ok_or_else(|| {
        Error::NoProviderAvailable(
            "no provider credentials found in the environment; set an API key (e.g. \
             OPENAI_API_KEY) or configure a provider explicitly"
                .to_string(),
        )
    })
}
