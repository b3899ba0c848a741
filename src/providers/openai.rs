//! OpenAI-compatible chat-completions adapter.
//!
//! This is the one adapter that is deliberately reusable for *any*
//! OpenAI-compatible endpoint: the hosted OpenAI API, DeepSeek, Groq, xAI,
//! Qwen (Dashscope), Together, and local servers such as Ollama, LM Studio,
//! llama.cpp, and vLLM. The dotted provider aliases (`openai.deepseek`, …)
//! all route here with their own base URL and credential env vars; the
//! adapter reports the full alias in logs and metrics so parallel services
//! stay distinguishable.
//!
//! Anthropic, Gemini, and Bedrock ship as separate adapters because their
//! wire shapes differ; no other wire family is funneled through this one.
//!
//! # Example
//!
//! ```rust,no_run
//! use llm_relay::{ClientConfig, RequestOptions};
//! use llm_relay::providers::OpenAiClient;
//! use llm_relay::client::AiClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .provider("openai.ollama")
//!         .base_url("http://localhost:11434/v1")
//!         .model("llama3.2")
//!         .build()?;
//!     let client = OpenAiClient::from_config(&config)?;
//!
//!     let reply = client.generate("Why is the sky blue?", &RequestOptions::new()).await?;
//!     println!("{}", reply.content);
//!     Ok(())
//! }
//! ```

use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::catalog;
use crate::client::{AiClient, ChunkHandler};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::providers::{GenerationDefaults, require_key_if_needed};
use crate::telemetry::TelemetryHandle;
use crate::transport::{HttpTransport, PreparedRequest};
use crate::types::{Completion, RequestOptions, StreamChunk, TokenUsage};
use crate::utils::sse_data_stream;

/// Client for OpenAI-compatible chat-completions endpoints.
#[derive(Debug)]
pub struct OpenAiClient {
    transport: HttpTransport,
    alias: String,
    base_url: String,
    api_key: Option<String>,
    extra_headers: Vec<(String, String)>,
    defaults: GenerationDefaults,
}

impl OpenAiClient {
    /// Build from a resolved configuration.
    ///
    /// `config.provider` may be the bare family (`openai`) or any dotted
    /// alias; the base URL must already be resolved (the catalog fills it for
    /// known aliases).
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let fallback = catalog::lookup_alias("openai")
            .map(|a| a.default_model)
            .unwrap_or("gpt-4o-mini");
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        require_key_if_needed(config)?;

        Ok(Self {
            transport: HttpTransport::new(
                config.provider.clone(),
                config.timeout,
                config.max_retries,
                config.telemetry.clone(),
            )?,
            alias: config.provider.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            extra_headers: config
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            defaults: GenerationDefaults::from_config(config, fallback),
        })
    }

    fn headers(&self) -> Vec<(String, String)> {
        let mut headers = self.extra_headers.clone();
        if let Some(key) = &self.api_key {
            headers.push(("authorization".to_string(), format!("Bearer {key}")));
        }
        headers
    }

    fn prepare(&self, prompt: &str, options: &RequestOptions, stream: bool) -> Result<PreparedRequest> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = options.system_prompt.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let payload = ChatRequest {
            model: &options.model,
            messages,
            temperature: options.temperature,
            max_tokens: options.effective_max_tokens(),
            stream,
        };
        PreparedRequest::post_json(
            format!("{}/chat/completions", self.base_url),
            self.headers(),
            &payload,
        )
    }
}

#[async_trait]
impl AiClient for OpenAiClient {
    async fn generate(&self, prompt: &str, options: &RequestOptions) -> Result<Completion> {
        let mut options = options.clone();
        self.defaults.apply(&self.alias, &mut options);

        let started = Instant::now();
        self.transport.log_request(&options.model, prompt.len());
        let mut span = self.transport.telemetry().start_span("ai.request");
        span.set_attribute("provider", &self.alias);
        span.set_attribute("model", &options.model);

        let request = self.prepare(prompt, &options, false)?;
        let result = async {
            let body = self.transport.execute_with_retry(&request).await?;
            parse_completion(&self.alias, &options.model, &body)
        }
        .await;

        match result {
            Ok(completion) => {
                self.transport
                    .observe_success(&completion.model, completion.usage, started);
                span.end();
                Ok(completion)
            }
            Err(err) => {
                self.transport.observe_error(&options.model, &err);
                span.record_error(&err);
                span.end();
                Err(err)
            }
        }
    }

    fn provider_name(&self) -> &str {
        &self.alias
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        options: &RequestOptions,
        on_chunk: &mut ChunkHandler<'_>,
    ) -> Result<()> {
        let mut options = options.clone();
        self.defaults.apply(&self.alias, &mut options);

        self.transport.log_request(&options.model, prompt.len());
        let request = self.prepare(prompt, &options, true)?;
        let response = self.transport.execute_streaming(&request).await?;
        let mut events = sse_data_stream(response);

        let mut index = 0usize;
        let mut delivered = String::new();
        let mut finish_reason: Option<String> = None;

        while let Some(event) = events.next().await {
            let data = match event {
                Ok(data) => data,
                Err(err) => {
                    return Err(interrupted(&self.alias, index, delivered, err));
                }
            };
            let chunk: ChatChunk = match serde_json::from_str(&data) {
                Ok(chunk) => chunk,
                Err(err) => {
                    let parse_err = Error::parse(&self.alias, format!("bad stream chunk: {err}"));
                    if index == 0 {
                        return Err(parse_err);
                    }
                    return Err(interrupted(&self.alias, index, delivered, parse_err));
                }
            };

            for choice in chunk.choices {
                if let Some(content) = choice.delta.content {
                    if !content.is_empty() {
                        delivered.push_str(&content);
                        on_chunk(StreamChunk::content_delta(content, index, &options.model))?;
                        index += 1;
                    }
                }
                if choice.finish_reason.is_some() {
                    finish_reason = choice.finish_reason;
                }
            }
        }

        on_chunk(StreamChunk::finished(
            index,
            &options.model,
            finish_reason.unwrap_or_else(|| "stop".to_string()),
        ))?;
        Ok(())
    }

    fn set_telemetry(&self, telemetry: TelemetryHandle) {
        self.transport.set_telemetry(telemetry);
    }
}

/// Wrap a mid-stream failure as the partial-completion sentinel once chunks
/// have been delivered; pre-chunk failures propagate unchanged.
fn interrupted(provider: &str, chunks: usize, partial: String, err: Error) -> Error {
    if chunks == 0 {
        return err;
    }
    Error::StreamInterrupted {
        provider: provider.to_string(),
        chunks,
        partial,
        message: err.to_string(),
    }
}

fn parse_completion(provider: &str, requested_model: &str, body: &str) -> Result<Completion> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| Error::parse(provider, e.to_string()))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::parse(provider, "response contained no choices"))?;
    let usage = response
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: if u.total_tokens > 0 {
                u.total_tokens
            } else {
                u.prompt_tokens + u.completion_tokens
            },
        })
        .unwrap_or_default();

    Ok(Completion {
        content: choice.message.content.unwrap_or_default(),
        model: response
            .model
            .unwrap_or_else(|| requested_model.to_string()),
        usage,
    })
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(provider: &str) -> OpenAiClient {
        let config = ClientConfig::builder()
            .provider(provider)
            .api_key("sk-test")
            .base_url("https://api.openai.com/v1")
            .model("gpt-4o-mini")
            .build()
            .unwrap();
        OpenAiClient::from_config(&config).unwrap()
    }

    #[test]
    fn test_prepare_places_system_prompt_first() {
        let client = client_for("openai");
        let options = RequestOptions::new()
            .with_model("gpt-4o")
            .with_system_prompt("Be brief.");
        let request = client.prepare("hi", &options, false).unwrap();

        let payload: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(payload["model"], "gpt-4o");
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][0]["content"], "Be brief.");
        assert_eq!(payload["messages"][1]["role"], "user");
        assert_eq!(payload["messages"][1]["content"], "hi");
        assert_eq!(payload["stream"], false);
    }

    #[test]
    fn test_prepare_attaches_bearer_auth() {
        let client = client_for("openai");
        let request = client
            .prepare("hi", &RequestOptions::new().with_model("gpt-4o"), false)
            .unwrap();
        assert!(
            request
                .headers
                .iter()
                .any(|(k, v)| k == "authorization" && v == "Bearer sk-test")
        );
    }

    #[test]
    fn test_keyed_alias_requires_key() {
        let config = ClientConfig::builder()
            .provider("openai.deepseek")
            .base_url("https://api.deepseek.com")
            .build()
            .unwrap();
        let err = OpenAiClient::from_config(&config).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("DEEPSEEK_API_KEY"));
    }

    #[test]
    fn test_keyless_config_sends_no_auth_header() {
        let config = ClientConfig::builder()
            .provider("openai.ollama")
            .base_url("http://localhost:11434/v1")
            .model("llama3.2")
            .build()
            .unwrap();
        let client = OpenAiClient::from_config(&config).unwrap();
        let request = client
            .prepare("hi", &RequestOptions::new().with_model("llama3.2"), false)
            .unwrap();
        assert!(!request.headers.iter().any(|(k, _)| k == "authorization"));
    }

    #[test]
    fn test_parse_completion_with_usage() {
        let body = r#"{
            "model": "gpt-4o-mini",
            "choices": [{"message": {"content": "Hello!"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}
        }"#;
        let completion = parse_completion("openai", "gpt-4o-mini", body).unwrap();
        assert_eq!(completion.content, "Hello!");
        assert_eq!(completion.model, "gpt-4o-mini");
        assert_eq!(completion.usage.total_tokens, 12);
    }

    #[test]
    fn test_parse_completion_without_usage_is_zero() {
        let body = r#"{"choices": [{"message": {"content": "ok"}}]}"#;
        let completion = parse_completion("openai", "llama3.2", body).unwrap();
        assert!(completion.usage.is_empty());
        assert_eq!(completion.model, "llama3.2");
    }

    #[test]
    fn test_parse_completion_no_choices_is_parse_error() {
        let err = parse_completion("openai", "gpt-4o", r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_parse_completion_malformed_body() {
        let err = parse_completion("openai", "gpt-4o", "<html>oops</html>").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(!err.fails_over());
    }

    #[test]
    fn test_interrupted_wraps_only_after_first_chunk() {
        let pre = interrupted("openai", 0, String::new(), Error::timeout());
        assert!(matches!(pre, Error::Timeout));

        let post = interrupted("openai", 2, "Hel".to_string(), Error::timeout());
        match post {
            Error::StreamInterrupted {
                chunks, partial, ..
            } => {
                assert_eq!(chunks, 2);
                assert_eq!(partial, "Hel");
            }
            other => panic!("expected StreamInterrupted, got {other:?}"),
        }
    }

    #[test]
    fn test_alias_model_resolution_in_defaults() {
        let client = client_for("openai.deepseek");
        let mut options = RequestOptions::new().with_model("smart");
        client.defaults.apply(&client.alias, &mut options);
        assert_eq!(options.model, "deepseek-reasoner");
    }

    #[test]
    fn test_stream_chunk_wire_parse() {
        let data = r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#;
        let chunk: ChatChunk = serde_json::from_str(data).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hel"));

        let done = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        let chunk: ChatChunk = serde_json::from_str(done).unwrap();
        assert_eq!(chunk.choices[0].finish_reason.as_deref(), Some("stop"));
    }
}
