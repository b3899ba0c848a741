//! # Client configuration and construction
//!
//! [`ClientConfig`] collects everything a provider adapter needs: which
//! provider (by name or dotted alias, or `"auto"`), credentials, endpoint,
//! generation defaults, retry/timeout budgets, extra headers, cloud-SDK
//! settings, and the telemetry sink. [`new_client`] turns a configuration
//! into a working [`AiClient`](crate::client::AiClient).
//!
//! ## Provider selection order
//!
//! 1. `provider == "auto"` runs registry auto-detection over the process
//!    environment.
//! 2. A dotted name (`openai.deepseek`) is a provider alias: the catalog
//!    fills in the wire family, default base URL, and the env var names for
//!    the API key and base-URL override.
//! 3. Credentials resolve with precedence: explicit option, then the
//!    alias-specific env var, then the wire family's env var, then (for
//!    cloud SDKs) ambient credentials.
//! 4. The wire family's factory is looked up in the registry; a missing
//!    factory is a configuration error that names the fix.
//!
//! ## Merging
//!
//! The builder is order-insensitive: last write wins for scalar fields, and
//! the `headers` / `extra` maps merge with later keys overwriting earlier
//! ones.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog;
use crate::client::AiClient;
use crate::error::{Error, Result};
use crate::registry;
use crate::telemetry::TelemetryHandle;

/// Explicit AWS credentials for the Bedrock adapter.
///
/// When absent, the adapter falls back to the ambient AWS credential chain
/// (env vars, profile, instance role).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

/// Resolved configuration handed to a provider factory.
///
/// Built via [`ClientConfig::builder`]; retained inside the resulting client
/// for its lifetime.
#[derive(Clone)]
pub struct ClientConfig {
    /// Provider name or alias; `"auto"` selects by environment detection.
    pub provider: String,
    /// API key; resolved from the environment when unset.
    pub api_key: Option<String>,
    /// Endpoint override; resolved from alias/env when unset.
    pub base_url: Option<String>,
    /// Default model for requests that leave the model unset.
    pub model: Option<String>,
    /// Default sampling temperature.
    pub temperature: f32,
    /// Default output token budget.
    pub max_tokens: u32,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Additional attempts after the first request.
    pub max_retries: u32,
    /// Default system prompt.
    pub system_prompt: Option<String>,
    /// Extra HTTP headers attached to every request.
    pub headers: HashMap<String, String>,
    /// Opaque provider-specific settings.
    pub extra: HashMap<String, serde_json::Value>,
    /// Cloud region (Bedrock).
    pub region: Option<String>,
    /// Explicit cloud credentials (Bedrock).
    pub aws_credentials: Option<AwsCredentials>,
    /// Telemetry sink; no-op when unset.
    pub telemetry: Option<TelemetryHandle>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            provider: "auto".to_string(),
            api_key: None,
            base_url: None,
            model: None,
            temperature: 0.7,
            max_tokens: 1000,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            system_prompt: None,
            headers: HashMap::new(),
            extra: HashMap::new(),
            region: None,
            aws_credentials: None,
            telemetry: None,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("headers", &self.headers.keys())
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl ClientConfig {
    /// Start collecting options.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Order-insensitive builder for [`ClientConfig`].
///
/// # Example
///
/// ```
/// use llm_relay::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::builder()
///     .provider("openai.deepseek")
///     .temperature(0.2)
///     .timeout(Duration::from_secs(10))
///     .header("x-request-source", "relay-tests")
///     .build()
///     .unwrap();
/// assert_eq!(config.provider, "openai.deepseek");
/// ```
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Provider name or alias (default `"auto"`).
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.config.provider = provider.into();
        self
    }

    /// Explicit API key, taking precedence over every env var.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    /// Explicit endpoint, taking precedence over alias defaults and env.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Default model for requests that leave the model unset.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    /// Default sampling temperature (validated to `[0.0, 1.0]` at build).
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Default output token budget.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_tokens = max_tokens;
        self
    }

    /// Per-request HTTP timeout (default 30 s).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Additional attempts after the first request (default 3).
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Default system prompt.
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Add one HTTP header; later keys overwrite earlier ones.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(name.into(), value.into());
        self
    }

    /// Merge a header map; later keys overwrite earlier ones.
    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.config.headers.extend(headers);
        self
    }

    /// Add one provider-specific setting; later keys overwrite earlier ones.
    pub fn extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.extra.insert(key.into(), value);
        self
    }

    /// Cloud region (Bedrock).
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = Some(region.into());
        self
    }

    /// Explicit cloud credentials (Bedrock).
    pub fn aws_credentials(mut self, credentials: AwsCredentials) -> Self {
        self.config.aws_credentials = Some(credentials);
        self
    }

    /// Telemetry sink.
    pub fn telemetry(mut self, telemetry: TelemetryHandle) -> Self {
        self.config.telemetry = Some(telemetry);
        self
    }

    /// Validate and produce the configuration.
    pub fn build(self) -> Result<ClientConfig> {
        let config = self.config;
        if config.provider.trim().is_empty() {
            return Err(Error::config("provider cannot be empty"));
        }
        if !(0.0..=1.0).contains(&config.temperature) {
            return Err(Error::config(format!(
                "temperature must be between 0.0 and 1.0, got {}",
                config.temperature
            )));
        }
        if config.timeout.is_zero() {
            return Err(Error::config("timeout must be greater than zero"));
        }
        Ok(config)
    }
}

/// Build a client from a configuration.
///
/// Runs auto-detection when the provider is `"auto"`, resolves provider
/// aliases and credentials, and hands the resolved configuration to the wire
/// family's registered factory.
pub fn new_client(config: ClientConfig) -> Result<Arc<dyn AiClient>> {
    let resolved = resolve(config, |name| env::var(name).ok())?;
    let alias = catalog::lookup_alias(&resolved.provider);
    let family = alias.map(|a| a.base_provider).unwrap_or(&resolved.provider);

    let factory = registry::get(family).ok_or_else(|| {
        Error::config(format!(
            "provider '{family}' is not registered; call llm_relay::providers::register_builtins() \
             at startup or register a custom factory"
        ))
    })?;
    factory.create(&resolved)
}

/// Resolve `"auto"`, aliases, endpoints, and credentials.
///
/// `env` abstracts `std::env::var` so resolution stays testable without
/// mutating process state.
fn resolve(mut config: ClientConfig, env: impl Fn(&str) -> Option<String>) -> Result<ClientConfig> {
    if config.provider == "auto" {
        config.provider = registry::detect()?;
    }

    let Some(alias) = catalog::lookup_alias(&config.provider) else {
        if config.provider.contains('.') {
            return Err(Error::config(format!(
                "unknown provider alias '{}'",
                config.provider
            )));
        }
        // A bare name outside the catalog may still be a custom registered
        // factory; leave it for the registry lookup.
        return Ok(config);
    };

    if config.api_key.is_none() {
        config.api_key = alias.api_key_env.and_then(|name| env(name));
    }
    if config.api_key.is_none() && alias.alias != alias.base_provider {
        // Dotted aliases fall back to the wire family's key.
        config.api_key = catalog::lookup_alias(alias.base_provider)
            .and_then(|base| base.api_key_env)
            .and_then(|name| env(name));
    }

    if config.base_url.is_none() {
        let from_env = if alias.base_url_env.is_empty() {
            None
        } else {
            env(alias.base_url_env)
        };
        config.base_url = from_env.or_else(|| {
            if alias.base_url.is_empty() {
                None
            } else {
                Some(alias.base_url.to_string())
            }
        });
    }

    if config.model.is_none() {
        config.model = Some(alias.default_model.to_string());
    }

    Ok(config)
}
