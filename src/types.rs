//! Core type definitions for the LLM Relay SDK.
//!
//! This module contains the uniform request/response model every provider
//! adapter translates to and from. The types are organized into two
//! categories:
//!
//! # Request Side
//!
//! - [`RequestOptions`]: per-request knobs (model, temperature, token budget,
//!   system prompt). A value type: callers hand a reference in, the SDK
//!   clones its own working copy and never mutates the caller's value.
//!
//! # Response Side
//!
//! - [`Completion`]: the uniform unary result (content, serving model, usage)
//! - [`TokenUsage`]: provider-reported token accounting
//! - [`StreamChunk`]: one unit of streamed output, either an incremental
//!   content delta or the final completion marker
//!
//! Provider wire formats (OpenAI chat-completions JSON, Anthropic messages,
//! Gemini generateContent, Bedrock Converse) live with their adapters under
//! `providers/`; nothing wire-specific leaks into this module.

use serde::{Deserialize, Serialize};

/// Per-request generation options.
///
/// All fields are optional in the sense that an adapter fills anything unset
/// from its own configured defaults during `apply_defaults`:
///
/// - an empty `model` resolves to the adapter's default model; the well-known
///   aliases `fast`, `smart`, `code`, and `vision` resolve per provider, so a
///   chain using `"smart"` gets each provider's own "smart" model at each
///   attempt
/// - `temperature` of `None` takes the configured default
/// - `max_tokens` of `None` or `Some(0)` takes the configured default
///
/// # Cloning
///
/// `RequestOptions` is deliberately a plain value struct. The chain client
/// clones it once per provider attempt so one provider's resolved model never
/// bleeds into the next attempt, and so the caller's value is never observed
/// mid-flight. If this struct ever grows slice or map fields, `Clone` must
/// keep deep-copying them (a shared-state clone would break the per-attempt
/// isolation the chain relies on).
///
/// # Example
///
/// ```
/// use llm_relay::RequestOptions;
///
/// let options = RequestOptions::new()
///     .with_model("smart")
///     .with_temperature(0.2)
///     .with_max_tokens(512);
/// assert_eq!(options.model, "smart");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// Model identifier or alias. Empty means "use the provider default".
    pub model: String,

    /// Sampling temperature in `[0.0, 1.0]`. `None` means "use the default".
    pub temperature: Option<f32>,

    /// Output token budget. `None` or `Some(0)` means "use the default".
    pub max_tokens: Option<u32>,

    /// System prompt prepended (or attached, per wire family) to the request.
    pub system_prompt: Option<String>,
}

impl RequestOptions {
    /// Create empty options; every field defers to the adapter's defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the model identifier or alias.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the output token budget.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Token budget treating `Some(0)` the same as unset.
    pub fn effective_max_tokens(&self) -> Option<u32> {
        match self.max_tokens {
            Some(0) | None => None,
            other => other,
        }
    }
}

/// Provider-reported token accounting for one request.
///
/// Counts mirror what the provider billed; all zeroes when the provider did
/// not report usage (some local servers omit it).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt/input tokens billed by the provider.
    pub prompt_tokens: u32,
    /// Generated/output tokens billed by the provider.
    pub completion_tokens: u32,
    /// Convenience total, `prompt_tokens + completion_tokens` unless the
    /// provider reported its own total.
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Usage with a computed total.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// True when the provider reported nothing.
    pub fn is_empty(&self) -> bool {
        self.total_tokens == 0 && self.prompt_tokens == 0 && self.completion_tokens == 0
    }
}

/// Uniform unary result produced by every adapter on success.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Generated text.
    pub content: String,
    /// Concrete model that served the request (post alias resolution).
    pub model: String,
    /// Provider-reported usage; zeroes when unreported.
    pub usage: TokenUsage,
}

impl Completion {
    /// Build a completion with empty usage.
    pub fn new(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            usage: TokenUsage::default(),
        }
    }

    /// Attach usage to a completion.
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// One unit of streamed output.
///
/// Chunks with `delta == true` carry incremental content; indices are
/// strictly increasing within one provider's stream. A final chunk with
/// `delta == false` signals completion and carries the finish reason.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamChunk {
    /// Incremental content for delta chunks; empty for the final marker.
    pub content: String,
    /// True for incremental content chunks, false for the completion marker.
    pub delta: bool,
    /// Zero-based position within the serving provider's stream.
    pub index: usize,
    /// Concrete model serving the stream.
    pub model: String,
    /// Provider finish reason, set on the final chunk (e.g. `"stop"`).
    pub finish_reason: Option<String>,
}

impl StreamChunk {
    /// An incremental content chunk.
    pub fn content_delta(content: impl Into<String>, index: usize, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            delta: true,
            index,
            model: model.into(),
            finish_reason: None,
        }
    }

    /// The final completion marker.
    pub fn finished(index: usize, model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            delta: false,
            index,
            model: model.into(),
            finish_reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_builder_chain() {
        let options = RequestOptions::new()
            .with_model("fast")
            .with_temperature(0.3)
            .with_max_tokens(256)
            .with_system_prompt("You are terse.");

        assert_eq!(options.model, "fast");
        assert_eq!(options.temperature, Some(0.3));
        assert_eq!(options.max_tokens, Some(256));
        assert_eq!(options.system_prompt.as_deref(), Some("You are terse."));
    }

    #[test]
    fn test_options_clone_is_independent() {
        let original = RequestOptions::new().with_model("smart");
        let mut working = original.clone();
        working.model = "gpt-4o".to_string();
        working.temperature = Some(0.0);

        assert_eq!(original.model, "smart");
        assert_eq!(original.temperature, None);
    }

    #[test]
    fn test_zero_max_tokens_means_default() {
        let options = RequestOptions::new().with_max_tokens(0);
        assert_eq!(options.effective_max_tokens(), None);

        let options = RequestOptions::new().with_max_tokens(100);
        assert_eq!(options.effective_max_tokens(), Some(100));
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage::new(10, 5);
        assert_eq!(usage.total_tokens, 15);
        assert!(!usage.is_empty());
        assert!(TokenUsage::default().is_empty());
    }

    #[test]
    fn test_stream_chunk_constructors() {
        let delta = StreamChunk::content_delta("Hel", 0, "gpt-4o-mini");
        assert!(delta.delta);
        assert_eq!(delta.index, 0);
        assert_eq!(delta.finish_reason, None);

        let done = StreamChunk::finished(3, "gpt-4o-mini", "stop");
        assert!(!done.delta);
        assert_eq!(done.finish_reason.as_deref(), Some("stop"));
        assert!(done.content.is_empty());
    }
}
