//! The uniform client contract every provider adapter implements.
//!
//! Application code talks to one trait, [`AiClient`], regardless of which
//! wire protocol serves the request. Adapters translate between the uniform
//! request/response model in [`crate::types`] and their provider's wire
//! format; the chain client implements the same trait over an ordered list of
//! adapters, so a single provider and a failover chain are interchangeable at
//! call sites.
//!
//! Streaming and telemetry replacement are *optional capabilities*: the
//! default implementations report "unsupported" / no-op, and callers query
//! [`AiClient::supports_streaming`] before streaming. A chain's capability
//! set is the union over its members.
//!
//! # Example
//!
//! ```rust,no_run
//! use llm_relay::{new_client, ClientConfig, RequestOptions};
//! use llm_relay::client::AiClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     llm_relay::providers::register_builtins();
//!
//!     let config = ClientConfig::builder()
//!         .provider("openai.groq")
//!         .build()?;
//!     let client = new_client(config)?;
//!
//!     let reply = client
//!         .generate("What is a borrow checker?", &RequestOptions::new().with_model("fast"))
//!         .await?;
//!     println!("{}", reply.content);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::telemetry::TelemetryHandle;
use crate::types::{Completion, RequestOptions, StreamChunk};

/// Callback receiving streamed chunks.
///
/// Invoked synchronously as chunks arrive; a slow handler slows consumption
/// of the provider's HTTP stream (natural backpressure, no internal queue).
/// Returning an error aborts streaming for the current provider; the chain
/// does not treat a handler abort as a provider failure.
pub type ChunkHandler<'a> = dyn FnMut(StreamChunk) -> Result<()> + Send + 'a;

/// Uniform contract over every LLM back-end.
///
/// Implementations are `Send + Sync` and safe to share across tasks; a
/// request is cancelled by dropping its future (the HTTP send, body read,
/// and backoff sleeps are all await points).
#[async_trait]
pub trait AiClient: Send + Sync {
    /// Generate a single completion for `prompt`.
    ///
    /// The caller's `options` value is read, never mutated; adapters clone a
    /// working copy before filling defaults and resolving model aliases.
    async fn generate(&self, prompt: &str, options: &RequestOptions) -> Result<Completion>;

    /// Name the client answers as in logs, metrics, and errors. For
    /// adapters this is the configured provider alias (e.g.
    /// `openai.deepseek`); for a chain it is `chain`.
    fn provider_name(&self) -> &str;

    /// Whether [`AiClient::generate_stream`] is wired for this client.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Stream a completion, delivering chunks to `on_chunk` in order.
    ///
    /// Chunk indices are strictly increasing within the stream; the final
    /// chunk has `delta == false` and carries the finish reason. The default
    /// implementation reports streaming as unsupported.
    async fn generate_stream(
        &self,
        prompt: &str,
        options: &RequestOptions,
        on_chunk: &mut ChunkHandler<'_>,
    ) -> Result<()> {
        let _ = (prompt, options, on_chunk);
        Err(Error::stream(format!(
            "{} does not support streaming",
            self.provider_name()
        )))
    }

    /// Replace the telemetry sink.
    ///
    /// The new sink is fully published before the next request observes it;
    /// wrappers (the chain) forward the call to their children. The default
    /// implementation ignores the sink.
    fn set_telemetry(&self, telemetry: TelemetryHandle) {
        let _ = telemetry;
    }
}

impl std::fmt::Debug for dyn AiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiClient")
            .field("provider_name", &self.provider_name())
            .finish()
    }
}
