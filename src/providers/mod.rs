//! Provider adapters: one module per wire protocol.
//!
//! Every adapter implements [`AiClient`](crate::client::AiClient) by
//! translating the uniform request into its provider's wire format and
//! parsing the wire response back into the uniform [`Completion`]. All share
//! the same request shape:
//!
//! 1. Clone the caller's options and fill defaults (model alias resolution
//!    included; see [`GenerationDefaults::apply`]).
//! 2. Build the wire request; place the system prompt where the wire family
//!    expects it.
//! 3. Execute through the shared transport (or the cloud SDK, for Bedrock).
//! 4. Parse the response; classify failures; emit logs, spans, and metrics.
//!
//! Adapters never decide *across* providers; retrying a different provider
//! is the chain's job.
//!
//! [`register_builtins`] wires the four shipped factories into the process
//! registry; call it once at startup. Third-party providers implement
//! [`ProviderFactory`](crate::registry::ProviderFactory) and register
//! themselves the same way.

pub mod anthropic;
pub mod bedrock;
pub mod gemini;
pub mod openai;

use std::env;
use std::sync::Arc;

use crate::catalog;
use crate::client::AiClient;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::registry::{self, Detection, ProviderFactory};
use crate::types::RequestOptions;

pub use anthropic::AnthropicClient;
pub use bedrock::BedrockClient;
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

/// Adapter-side defaults applied to every request before translation.
#[derive(Debug, Clone)]
pub(crate) struct GenerationDefaults {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: Option<String>,
}

impl GenerationDefaults {
    /// Capture defaults from a resolved configuration, falling back to
    /// `fallback_model` when neither the config nor the catalog named one.
    pub fn from_config(config: &ClientConfig, fallback_model: &str) -> Self {
        Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| fallback_model.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_prompt: config.system_prompt.clone(),
        }
    }

    /// Fill unset fields on a working copy of the caller's options.
    ///
    /// Model alias resolution lives here so that each chain attempt resolves
    /// `fast`/`smart`/`code`/`vision` against *its own* provider: the chain
    /// resets the model to the caller's original value before every attempt,
    /// and this method maps it per provider.
    pub fn apply(&self, provider_alias: &str, options: &mut RequestOptions) {
        if options.model.is_empty() {
            options.model = self.model.clone();
        } else if catalog::is_model_alias(&options.model) {
            options.model = catalog::resolve_model_alias(provider_alias, &options.model)
                .map(str::to_string)
                .unwrap_or_else(|| self.model.clone());
        }
        if options.temperature.is_none() {
            options.temperature = Some(self.temperature);
        }
        if options.effective_max_tokens().is_none() {
            options.max_tokens = Some(self.max_tokens);
        }
        if options.system_prompt.is_none() {
            options.system_prompt = self.system_prompt.clone();
        }
    }
}

/// Keyed services fail construction without a key so a chain can skip the
/// member up front instead of burning a request on a guaranteed 401. Keyless
/// aliases (`openai.ollama`) and custom endpoints pass through.
pub(crate) fn require_key_if_needed(config: &ClientConfig) -> crate::error::Result<()> {
    if config.api_key.is_some() {
        return Ok(());
    }
    if let Some(entry) = catalog::lookup_alias(&config.provider) {
        if let Some(env_name) = entry.api_key_env {
            return Err(crate::error::Error::config(format!(
                "no API key configured for '{}'; set {env_name} or pass api_key",
                config.provider
            )));
        }
    }
    Ok(())
}

fn env_set(name: &str) -> bool {
    env::var(name).map(|v| !v.is_empty()).unwrap_or(false)
}

struct OpenAiFactory;

impl ProviderFactory for OpenAiFactory {
    fn name(&self) -> &str {
        "openai"
    }

    fn description(&self) -> &str {
        "OpenAI and OpenAI-compatible chat-completions endpoints"
    }

    fn detect_environment(&self) -> Detection {
        Detection {
            priority: 100,
            available: env_set("OPENAI_API_KEY"),
        }
    }

    fn create(&self, config: &ClientConfig) -> Result<Arc<dyn AiClient>> {
        Ok(Arc::new(OpenAiClient::from_config(config)?))
    }
}

struct AnthropicFactory;

impl ProviderFactory for AnthropicFactory {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn description(&self) -> &str {
        "Anthropic Messages API"
    }

    fn detect_environment(&self) -> Detection {
        Detection {
            priority: 90,
            available: env_set("ANTHROPIC_API_KEY"),
        }
    }

    fn create(&self, config: &ClientConfig) -> Result<Arc<dyn AiClient>> {
        Ok(Arc::new(AnthropicClient::from_config(config)?))
    }
}

struct GeminiFactory;

impl ProviderFactory for GeminiFactory {
    fn name(&self) -> &str {
        "gemini"
    }

    fn description(&self) -> &str {
        "Google Gemini Generative Language API"
    }

    fn detect_environment(&self) -> Detection {
        Detection {
            priority: 80,
            available: env_set("GEMINI_API_KEY"),
        }
    }

    fn create(&self, config: &ClientConfig) -> Result<Arc<dyn AiClient>> {
        Ok(Arc::new(GeminiClient::from_config(config)?))
    }
}

struct BedrockFactory;

impl ProviderFactory for BedrockFactory {
    fn name(&self) -> &str {
        "bedrock"
    }

    fn description(&self) -> &str {
        "AWS Bedrock Converse API"
    }

    fn detect_environment(&self) -> Detection {
        Detection {
            priority: 70,
            available: env_set("AWS_ACCESS_KEY_ID") || env_set("AWS_PROFILE"),
        }
    }

    fn create(&self, config: &ClientConfig) -> Result<Arc<dyn AiClient>> {
        Ok(Arc::new(BedrockClient::from_config(config)?))
    }
}

/// Register the four shipped provider factories.
///
/// Call once at program start, before [`crate::new_client`]. Idempotent: a
/// second call leaves the registry unchanged rather than erroring on the
/// duplicate names.
pub fn register_builtins() {
    let factories: [Arc<dyn ProviderFactory>; 4] = [
        Arc::new(OpenAiFactory),
        Arc::new(AnthropicFactory),
        Arc::new(GeminiFactory),
        Arc::new(BedrockFactory),
    ];
    for factory in factories {
        if registry::get(factory.name()).is_none() {
            let _ = registry::register(factory);
        }
    }
}
