//! Anthropic Messages API adapter.
//!
//! Speaks Anthropic's native wire format: `POST {base}/v1/messages` with
//! `x-api-key` auth and a pinned `anthropic-version`. Two shape differences
//! from the OpenAI family matter here: the system prompt travels as a
//! top-level `system` field rather than a message role, and `max_tokens` is
//! mandatory on every request (the adapter's default fills it when the caller
//! leaves the budget unset).
//!
//! Streaming uses Anthropic's typed SSE events; content arrives as
//! `content_block_delta` events and the stop reason on `message_delta`.

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

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client for Anthropic's Messages API.
pub struct AnthropicClient {
    transport: HttpTransport,
    alias: String,
    base_url: String,
    api_key: Option<String>,
    extra_headers: Vec<(String, String)>,
    defaults: GenerationDefaults,
}

impl AnthropicClient {
    /// Build from a resolved configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let fallback = catalog::lookup_alias("anthropic")
            .map(|a| a.default_model)
            .unwrap_or("claude-sonnet-4-0");
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.anthropic.com".to_string());
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
            headers.push(("x-api-key".to_string(), key.clone()));
        }
        headers.push((
            "anthropic-version".to_string(),
            ANTHROPIC_VERSION.to_string(),
        ));
        headers
    }

    fn prepare(&self, prompt: &str, options: &RequestOptions, stream: bool) -> Result<PreparedRequest> {
        // max_tokens is mandatory on this wire; the fallback only fires when
        // prepare() is driven without apply() having filled the budget.
        let payload = MessagesRequest {
            model: &options.model,
            max_tokens: options.effective_max_tokens().unwrap_or(1024),
            messages: vec![WireMessage {
                role: "user",
                content: prompt,
            }],
            system: options.system_prompt.as_deref(),
            temperature: options.temperature,
            stream,
        };
        PreparedRequest::post_json(
            format!("{}/v1/messages", self.base_url),
            self.headers(),
            &payload,
        )
    }
}

#[async_trait]
impl AiClient for AnthropicClient {
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
        let mut stop_reason: Option<String> = None;

        while let Some(event) = events.next().await {
            let data = match event {
                Ok(data) => data,
                Err(err) => return Err(interrupted(&self.alias, index, delivered, err)),
            };
            let event: StreamEvent = match serde_json::from_str(&data) {
                Ok(event) => event,
                Err(err) => {
                    let parse_err = Error::parse(&self.alias, format!("bad stream event: {err}"));
                    if index == 0 {
                        return Err(parse_err);
                    }
                    return Err(interrupted(&self.alias, index, delivered, parse_err));
                }
            };

            match event.kind.as_str() {
                "content_block_delta" => {
                    if let Some(text) = event.delta.and_then(|d| d.text) {
                        if !text.is_empty() {
                            delivered.push_str(&text);
                            on_chunk(StreamChunk::content_delta(text, index, &options.model))?;
                            index += 1;
                        }
                    }
                }
                "message_delta" => {
                    if let Some(reason) = event.delta.and_then(|d| d.stop_reason) {
                        stop_reason = Some(reason);
                    }
                }
                "error" => {
                    let message = event
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "provider sent an error event".to_string());
                    let err = Error::service_unavailable(&self.alias, message);
                    return Err(interrupted(&self.alias, index, delivered, err));
                }
                // message_start, content_block_start/stop, ping, message_stop
                _ => {}
            }
        }

        on_chunk(StreamChunk::finished(
            index,
            &options.model,
            stop_reason.unwrap_or_else(|| "end_turn".to_string()),
        ))?;
        Ok(())
    }

    fn set_telemetry(&self, telemetry: TelemetryHandle) {
        self.transport.set_telemetry(telemetry);
    }
}

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
    let response: MessagesResponse =
        serde_json::from_str(body).map_err(|e| Error::parse(provider, e.to_string()))?;
    let content: String = response
        .content
        .iter()
        .filter_map(|block| {
            if block.kind == "text" {
                block.text.as_deref()
            } else {
                None
            }
        })
        .collect();
    if content.is_empty() && response.content.is_empty() {
        return Err(Error::parse(provider, "response contained no content"));
    }

    let usage = response
        .usage
        .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens))
        .unwrap_or_default();

    Ok(Completion {
        content,
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
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}
