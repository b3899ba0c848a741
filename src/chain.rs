//! Ordered failover across heterogeneous providers.
//!
//! A [`ChainClient`] implements the same [`AiClient`] contract as a single
//! adapter, but behind it sits an ordered list of clients tried one after
//! another. Construction is fail-fast for configuration mistakes (empty
//! list, unknown alias) and resilient for runtime ones (a member whose API
//! key is missing is skipped with a WARN rather than sinking the chain).
//!
//! # Chain error policy
//!
//! The chain classifies failures differently from a single adapter, because
//! each member carries its *own* credentials and endpoint:
//!
//! - **Fail over:** auth errors, rate limits, transient server and transport
//!   errors. A 401 from provider A says nothing about provider B's key.
//! - **Stop immediately:** invalid requests, content-policy rejections,
//!   parse failures. A malformed request stays malformed everywhere; burning
//!   the rest of the chain on it would just multiply the damage.
//!
//! # Per-attempt option isolation
//!
//! Each attempt gets its own clone of the caller's options with the model
//! reset to the value recorded at call entry. Without the reset, provider
//! A's resolved model (say `gpt-4o` from the alias `smart`) would leak into
//! provider B's attempt, which needs to resolve `smart` against its own
//! table. The caller's options value is never touched.
//!
//! # Streaming
//!
//! Failover is only legal while nothing has reached the caller. Members that
//! cannot stream are skipped; a member that fails *before* its first chunk
//! is failed over like a unary error; a member that fails *after* emitting
//! chunks produces the partial-completion sentinel and the chain stops,
//! since the next provider could not coherently continue output the caller
//! has already seen.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::catalog;
use crate::client::{AiClient, ChunkHandler};
use crate::config::{ClientConfig, new_client};
use crate::error::{Error, Result};
use crate::registry;
use crate::telemetry::{NoopTelemetry, TelemetryHandle, metrics};
use crate::types::{Completion, RequestOptions, StreamChunk};

#[derive(Debug)]
struct ChainEntry {
    alias: String,
    client: Arc<dyn AiClient>,
}

/// Ordered list of clients tried until one succeeds.
///
/// # Example
///
/// ```rust,no_run
/// use llm_relay::{ChainClient, RequestOptions};
/// use llm_relay::client::AiClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     llm_relay::providers::register_builtins();
///
///     let chain = ChainClient::new(["openai", "anthropic", "openai.ollama"])?;
///     let reply = chain
///         .generate("Summarize RAII in one line.", &RequestOptions::new().with_model("smart"))
///         .await?;
///     println!("{}", reply.content);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct ChainClient {
    entries: Vec<ChainEntry>,
    telemetry: RwLock<TelemetryHandle>,
}

impl ChainClient {
    /// Build a chain from provider aliases, in failover order.
    pub fn new<I, S>(aliases: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_telemetry(aliases, None)
    }

    /// Build a chain with an explicit telemetry sink shared by the chain and
    /// every member it constructs.
    pub fn with_telemetry<I, S>(aliases: I, telemetry: Option<TelemetryHandle>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let aliases: Vec<String> = aliases
            .into_iter()
            .map(|a| a.as_ref().to_string())
            .collect();
        if aliases.is_empty() {
            return Err(Error::config("provider chain cannot be empty"));
        }
        for alias in &aliases {
            if !catalog::is_known_alias(alias) && registry::get(alias).is_none() {
                return Err(Error::config(format!(
                    "unknown provider alias '{alias}' in chain"
                )));
            }
        }

        let mut entries = Vec::with_capacity(aliases.len());
        for alias in &aliases {
            let mut builder = ClientConfig::builder().provider(alias.clone());
            if let Some(telemetry) = &telemetry {
                builder = builder.telemetry(telemetry.clone());
            }
            match builder.build().and_then(new_client) {
                Ok(client) => entries.push(ChainEntry {
                    alias: alias.clone(),
                    client,
                }),
                Err(err) => {
                    warn!(
                        target: "llm_relay::ai",
                        provider = %alias,
                        error = %err,
                        "skipping chain member that failed to build"
                    );
                }
            }
        }
        if entries.is_empty() {
            return Err(Error::config(
                "no provider in the chain could be constructed; check credentials",
            ));
        }

        Ok(Self {
            entries,
            telemetry: RwLock::new(telemetry.unwrap_or_else(|| Arc::new(NoopTelemetry))),
        })
    }

    /// Build a chain directly from constructed clients.
    ///
    /// Used by embedders wiring custom [`AiClient`] implementations (and by
    /// the test suite); the alias-based constructors funnel here.
    pub fn from_clients(clients: Vec<(String, Arc<dyn AiClient>)>) -> Result<Self> {
        if clients.is_empty() {
            return Err(Error::config("provider chain cannot be empty"));
        }
        Ok(Self {
            entries: clients
                .into_iter()
                .map(|(alias, client)| ChainEntry { alias, client })
                .collect(),
            telemetry: RwLock::new(Arc::new(NoopTelemetry)),
        })
    }

    /// Member aliases, in failover order.
    pub fn aliases(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.alias.as_str()).collect()
    }

    fn chain_telemetry(&self) -> TelemetryHandle {
        self.telemetry
            .read()
            .expect("telemetry handle poisoned")
            .clone()
    }
}

#[async_trait]
impl AiClient for ChainClient {
    async fn generate(&self, prompt: &str, options: &RequestOptions) -> Result<Completion> {
        // Recorded before any attempt so every provider resolves aliases
        // against the caller's value, not a predecessor's resolution.
        let original_model = options.model.clone();
        let telemetry = self.chain_telemetry();

        let mut span = telemetry.start_span(metrics::CHAIN_GENERATE_SPAN);
        span.set_attribute("providers_count", &self.entries.len().to_string());
        span.set_attribute("original_model", &original_model);
        span.set_attribute("prompt_length", &prompt.len().to_string());

        let mut failed: Vec<String> = Vec::new();
        let mut last_err: Option<Error> = None;

        for (index, entry) in self.entries.iter().enumerate() {
            let mut attempt_options = options.clone();
            attempt_options.model = original_model.clone();

            let mut attempt_span = telemetry.start_span(metrics::CHAIN_ATTEMPT_SPAN);
            attempt_span.set_attribute("provider_index", &index.to_string());
            attempt_span.set_attribute("provider_alias", &entry.alias);
            attempt_span.set_attribute("is_retry", if index > 0 { "true" } else { "false" });

            match entry.client.generate(prompt, &attempt_options).await {
                Ok(completion) => {
                    attempt_span.end();
                    span.set_attribute("successful_provider", &entry.alias);
                    if index > 0 {
                        let from = failed.last().cloned().unwrap_or_default();
                        let failed_count = failed.len().to_string();
                        telemetry.incr_counter(
                            metrics::CHAIN_FAILOVER,
                            1,
                            &[
                                ("from_provider", from.as_str()),
                                ("to_provider", entry.alias.as_str()),
                                ("failed_count", failed_count.as_str()),
                            ],
                        );
                        info!(
                            target: "llm_relay::ai",
                            from_provider = %from,
                            to_provider = %entry.alias,
                            failed_count = failed.len(),
                            "failover succeeded"
                        );
                    }
                    span.end();
                    return Ok(completion);
                }
                Err(err) => {
                    attempt_span.record_error(&err);
                    attempt_span.end();

                    if !err.fails_over() {
                        warn!(
                            target: "llm_relay::ai",
                            provider = %entry.alias,
                            operation = "generate",
                            error = %err,
                            "client error (not retrying)"
                        );
                        span.record_error(&err);
                        span.end();
                        return Err(err);
                    }

                    warn!(
                        target: "llm_relay::ai",
                        provider = %entry.alias,
                        operation = "generate",
                        error = %err,
                        "provider failed, trying next in chain"
                    );
                    failed.push(entry.alias.clone());
                    last_err = Some(err);
                }
            }
        }

        telemetry.incr_counter(metrics::CHAIN_EXHAUSTED, 1, &[]);
        span.set_attribute("chain.status", "exhausted");
        let err = Error::ChainExhausted {
            attempted: failed,
            last: Box::new(last_err.unwrap_or_else(|| Error::other("chain had no members"))),
        };
        span.record_error(&err);
        span.end();
        Err(err)
    }

    fn provider_name(&self) -> &str {
        "chain"
    }

    /// A chain can stream iff at least one member can.
    fn supports_streaming(&self) -> bool {
        self.entries.iter().any(|e| e.client.supports_streaming())
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        options: &RequestOptions,
        on_chunk: &mut ChunkHandler<'_>,
    ) -> Result<()> {
        let original_model = options.model.clone();
        let mut failed: Vec<String> = Vec::new();
        let mut last_err: Option<Error> = None;

        for entry in &self.entries {
            if !entry.client.supports_streaming() {
                info!(
                    target: "llm_relay::ai",
                    provider = %entry.alias,
                    "skipping non-streaming provider for stream request"
                );
                continue;
            }

            let mut attempt_options = options.clone();
            attempt_options.model = original_model.clone();

            let mut emitted = 0usize;
            let result = {
                let mut forward = |chunk: StreamChunk| {
                    emitted += 1;
                    on_chunk(chunk)
                };
                entry
                    .client
                    .generate_stream(prompt, &attempt_options, &mut forward)
                    .await
            };

            match result {
                Ok(()) => {
                    if !failed.is_empty() {
                        info!(
                            target: "llm_relay::ai",
                            to_provider = %entry.alias,
                            failed_count = failed.len(),
                            "streaming failover succeeded"
                        );
                    }
                    return Ok(());
                }
                Err(err) => {
                    if emitted > 0 {
                        // The caller has already seen output; failing over
                        // would splice a second provider's stream onto it.
                        warn!(
                            target: "llm_relay::ai",
                            provider = %entry.alias,
                            operation = "generate_stream",
                            chunks = emitted,
                            error = %err,
                            "stream interrupted after first chunk, not failing over"
                        );
                        return Err(err);
                    }
                    if !err.fails_over() {
                        warn!(
                            target: "llm_relay::ai",
                            provider = %entry.alias,
                            operation = "generate_stream",
                            error = %err,
                            "client error (not retrying)"
                        );
                        return Err(err);
                    }
                    warn!(
                        target: "llm_relay::ai",
                        provider = %entry.alias,
                        operation = "generate_stream",
                        error = %err,
                        "provider failed before first chunk, trying next in chain"
                    );
                    failed.push(entry.alias.clone());
                    last_err = Some(err);
                }
            }
        }

        self.chain_telemetry()
            .incr_counter(metrics::CHAIN_EXHAUSTED, 1, &[]);
        Err(Error::ChainExhausted {
            attempted: failed,
            last: Box::new(
                last_err
                    .unwrap_or_else(|| Error::stream("no streaming-capable provider in chain")),
            ),
        })
    }

    /// Replace the telemetry sink for the chain and every member.
    fn set_telemetry(&self, telemetry: TelemetryHandle) {
        *self.telemetry.write().expect("telemetry handle poisoned") = telemetry.clone();
        for entry in &self.entries {
            entry.client.set_telemetry(telemetry.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_chain_fails_fast() {
        let err = ChainClient::new(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_unknown_alias_fails_fast() {
        let err = ChainClient::new(["openai", "definitely-not-a-provider"]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("definitely-not-a-provider"));
    }

    #[test]
    fn test_from_clients_rejects_empty() {
        let err = ChainClient::from_clients(Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
