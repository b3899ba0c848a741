//! AWS Bedrock adapter built on the Converse API.
//!
//! Unlike the HTTP adapters, Bedrock requests are SigV4-signed, so this
//! adapter drives `aws-sdk-bedrockruntime` instead of the shared transport.
//! Retry and timeout budgets from [`ClientConfig`] are handed to the SDK's
//! own retry machinery; explicit credentials from the config take precedence
//! over the ambient AWS credential chain (env vars, profile, instance role).
//!
//! The SDK client is initialized lazily on first request: building it loads
//! the credential chain, and factory `create` must stay network-free.
//!
//! Streaming is not wired for this adapter; a chain skips it when asked to
//! stream.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_bedrockruntime as bedrock;
use bedrock::config::Credentials;
use bedrock::error::SdkError;
use bedrock::operation::converse::ConverseError;
use bedrock::types::{
    ContentBlock, ConversationRole, InferenceConfiguration, Message, SystemContentBlock,
};
use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::catalog;
use crate::client::AiClient;
use crate::config::{AwsCredentials, ClientConfig};
use crate::error::{Error, Result};
use crate::providers::GenerationDefaults;
use crate::telemetry::{NoopTelemetry, TelemetryHandle, metrics};
use crate::types::{Completion, RequestOptions, TokenUsage};

/// Client for AWS Bedrock's Converse API.
pub struct BedrockClient {
    alias: String,
    region: Option<String>,
    credentials: Option<AwsCredentials>,
    timeout: Duration,
    max_retries: u32,
    defaults: GenerationDefaults,
    telemetry: RwLock<TelemetryHandle>,
    sdk: OnceCell<bedrock::Client>,
}

impl BedrockClient {
    /// Build from a resolved configuration. No network happens here; the
    /// SDK client (and with it the credential chain) loads on first request.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let fallback = catalog::lookup_alias("bedrock")
            .map(|a| a.default_model)
            .unwrap_or("anthropic.claude-3-5-sonnet-20241022-v2:0");

        Ok(Self {
            alias: config.provider.clone(),
            region: config.region.clone(),
            credentials: config.aws_credentials.clone(),
            timeout: config.timeout,
            max_retries: config.max_retries,
            defaults: GenerationDefaults::from_config(config, fallback),
            telemetry: RwLock::new(
                config
                    .telemetry
                    .clone()
                    .unwrap_or_else(|| std::sync::Arc::new(NoopTelemetry)),
            ),
            sdk: OnceCell::new(),
        })
    }

    fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
            .read()
            .expect("telemetry handle poisoned")
            .clone()
    }

    async fn sdk_client(&self) -> Result<&bedrock::Client> {
        self.sdk
            .get_or_try_init(|| async {
                let mut loader = aws_config::defaults(BehaviorVersion::latest())
                    .retry_config(
                        aws_config::retry::RetryConfig::standard()
                            .with_max_attempts(self.max_retries + 1),
                    )
                    .timeout_config(
                        aws_config::timeout::TimeoutConfig::builder()
                            .operation_timeout(self.timeout)
                            .build(),
                    );
                if let Some(region) = self.region.clone() {
                    loader = loader.region(aws_config::Region::new(region));
                }
                if let Some(creds) = &self.credentials {
                    loader = loader.credentials_provider(Credentials::new(
                        creds.access_key_id.clone(),
                        creds.secret_access_key.clone(),
                        creds.session_token.clone(),
                        None,
                        "llm-relay-explicit",
                    ));
                }
                let sdk_config = loader.load().await;
                Ok::<_, Error>(bedrock::Client::new(&sdk_config))
            })
            .await
    }
}

#[async_trait]
impl AiClient for BedrockClient {
    async fn generate(&self, prompt: &str, options: &RequestOptions) -> Result<Completion> {
        let mut options = options.clone();
        self.defaults.apply(&self.alias, &mut options);

        let started = Instant::now();
        info!(
            target: "llm_relay::ai",
            provider = %self.alias,
            model = %options.model,
            prompt_len = prompt.len(),
            "sending generate request"
        );
        let mut span = self.telemetry().start_span("ai.request");
        span.set_attribute("provider", &self.alias);
        span.set_attribute("model", &options.model);

        let result = self.converse(prompt, &options).await;
        match result {
            Ok(completion) => {
                self.observe_success(&completion, started);
                span.end();
                Ok(completion)
            }
            Err(err) => {
                error!(
                    target: "llm_relay::ai",
                    provider = %self.alias,
                    model = %options.model,
                    operation = "generate",
                    error = %err,
                    "generate request failed"
                );
                self.telemetry().incr_counter(
                    metrics::REQUEST_ERROR,
                    1,
                    &[("provider", self.alias.as_str()), ("model", &options.model)],
                );
                span.record_error(&err);
                span.end();
                Err(err)
            }
        }
    }

    fn provider_name(&self) -> &str {
        &self.alias
    }

    fn set_telemetry(&self, telemetry: TelemetryHandle) {
        *self.telemetry.write().expect("telemetry handle poisoned") = telemetry;
    }
}

impl BedrockClient {
    async fn converse(&self, prompt: &str, options: &RequestOptions) -> Result<Completion> {
        let client = self.sdk_client().await?;

        let message = Message::builder()
            .role(ConversationRole::User)
            .content(ContentBlock::Text(prompt.to_string()))
            .build()
            .map_err(|e| Error::other(format!("failed to build Bedrock message: {e}")))?;

        let mut inference = InferenceConfiguration::builder();
        if let Some(temperature) = options.temperature {
            inference = inference.temperature(temperature);
        }
        if let Some(max_tokens) = options.effective_max_tokens() {
            inference = inference.max_tokens(max_tokens as i32);
        }

        let mut call = client
            .converse()
            .model_id(&options.model)
            .messages(message)
            .inference_config(inference.build());
        if let Some(system) = &options.system_prompt {
            call = call.system(SystemContentBlock::Text(system.clone()));
        }

        let output = call
            .send()
            .await
            .map_err(|e| map_sdk_error(&self.alias, e))?;

        let content = output
            .output()
            .and_then(|o| o.as_message().ok())
            .map(|m| {
                m.content()
                    .iter()
                    .filter_map(|block| block.as_text().ok().cloned())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| Error::parse(&self.alias, "Converse output carried no message"))?;

        let usage = output
            .usage()
            .map(|u| TokenUsage {
                prompt_tokens: u.input_tokens().max(0) as u32,
                completion_tokens: u.output_tokens().max(0) as u32,
                total_tokens: u.total_tokens().max(0) as u32,
            })
            .unwrap_or_default();

        Ok(Completion {
            content,
            model: options.model.clone(),
            usage,
        })
    }

    fn observe_success(&self, completion: &Completion, started: Instant) {
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        info!(
            target: "llm_relay::ai",
            provider = %self.alias,
            model = %completion.model,
            prompt_tokens = completion.usage.prompt_tokens,
            completion_tokens = completion.usage.completion_tokens,
            duration_ms,
            "generate request succeeded"
        );
        let telemetry = self.telemetry();
        let labels = [
            ("provider", self.alias.as_str()),
            ("model", completion.model.as_str()),
        ];
        telemetry.incr_counter(metrics::REQUEST_SUCCESS, 1, &labels);
        telemetry.record_histogram(metrics::REQUEST_DURATION_MS, duration_ms, &labels);
        if !completion.usage.is_empty() {
            telemetry.incr_counter(
                metrics::REQUEST_TOKENS,
                u64::from(completion.usage.prompt_tokens),
                &[
                    ("provider", self.alias.as_str()),
                    ("model", completion.model.as_str()),
                    ("kind", "prompt"),
                ],
            );
            telemetry.incr_counter(
                metrics::REQUEST_TOKENS,
                u64::from(completion.usage.completion_tokens),
                &[
                    ("provider", self.alias.as_str()),
                    ("model", completion.model.as_str()),
                    ("kind", "completion"),
                ],
            );
        }
    }
}

fn map_sdk_error(provider: &str, err: SdkError<ConverseError>) -> Error {
    match &err {
        SdkError::ServiceError(ctx) => {
            let service = ctx.err();
            let message = service.to_string();
            match service {
                ConverseError::ThrottlingException(_) => Error::RateLimited {
                    provider: provider.to_string(),
                    message,
                    retry_after: None,
                },
                ConverseError::AccessDeniedException(_) => Error::auth(provider, message),
                ConverseError::ValidationException(_)
                | ConverseError::ResourceNotFoundException(_) => {
                    Error::invalid_request(provider, 400, message)
                }
                _ => Error::service_unavailable(provider, message),
            }
        }
        SdkError::TimeoutError(_) => Error::Timeout,
        _ => Error::service_unavailable(provider, err.to_string()),
    }
}
