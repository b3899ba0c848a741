//! Google Gemini (Generative Language) adapter.
//!
//! Speaks the native `generateContent` wire format. Gemini differs from the
//! other HTTP families in three ways this adapter absorbs: the model id is
//! part of the URL path rather than the body, the API key rides in a query
//! parameter rather than a header, and the system prompt travels as a
//! `systemInstruction` turn. Streaming uses the sibling
//! `streamGenerateContent` endpoint with `alt=sse`.

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

/// Client for Gemini chat-style endpoints.
pub struct GeminiClient {
    transport: HttpTransport,
    alias: String,
    base_url: String,
    api_key: Option<String>,
    extra_headers: Vec<(String, String)>,
    defaults: GenerationDefaults,
}

impl GeminiClient {
    /// Build from a resolved configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let fallback = catalog::lookup_alias("gemini")
            .map(|a| a.default_model)
            .unwrap_or("gemini-2.0-flash");
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string());
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

    fn endpoint(&self, model: &str, stream: bool) -> String {
        let method = if stream {
            "streamGenerateContent?alt=sse"
        } else {
            "generateContent"
        };
        let mut url = format!("{}/models/{}:{}", self.base_url, model, method);
        if let Some(key) = &self.api_key {
            let separator = if stream { '&' } else { '?' };
            url.push(separator);
            url.push_str("key=");
            url.push_str(key);
        }
        url
    }

    fn prepare(&self, prompt: &str, options: &RequestOptions, stream: bool) -> Result<PreparedRequest> {
        let payload = GenerateRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
            system_instruction: options.system_prompt.as_deref().map(|text| Content {
                role: None,
                parts: vec![Part { text }],
            }),
            generation_config: GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.effective_max_tokens(),
            },
        };
        PreparedRequest::post_json(
            self.endpoint(&options.model, stream),
            self.extra_headers.clone(),
            &payload,
        )
    }
}

#[async_trait]
impl AiClient for GeminiClient {
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
                Err(err) => return Err(interrupted(&self.alias, index, delivered, err)),
            };
            let fragment: GenerateResponse = match serde_json::from_str(&data) {
                Ok(fragment) => fragment,
                Err(err) => {
                    let parse_err = Error::parse(&self.alias, format!("bad stream fragment: {err}"));
                    if index == 0 {
                        return Err(parse_err);
                    }
                    return Err(interrupted(&self.alias, index, delivered, parse_err));
                }
            };

            for candidate in fragment.candidates {
                let text: String = candidate
                    .content
                    .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
                    .unwrap_or_default();
                if !text.is_empty() {
                    delivered.push_str(&text);
                    on_chunk(StreamChunk::content_delta(text, index, &options.model))?;
                    index += 1;
                }
                if candidate.finish_reason.is_some() {
                    finish_reason = candidate.finish_reason;
                }
            }
        }

        on_chunk(StreamChunk::finished(
            index,
            &options.model,
            finish_reason.unwrap_or_else(|| "STOP".to_string()),
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
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| Error::parse(provider, e.to_string()))?;
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| Error::parse(provider, "response contained no candidates"))?;
    let content: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    let usage = response
        .usage_metadata
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: if u.total_token_count > 0 {
                u.total_token_count
            } else {
                u.prompt_token_count + u.candidates_token_count
            },
        })
        .unwrap_or_default();

    Ok(Completion {
        content,
        model: requested_model.to_string(),
        usage,
    })
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: u32,
}
