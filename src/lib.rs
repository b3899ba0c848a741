//! # LLM Relay - Multi-Provider AI Client Core
//!
//! A production-ready Rust core for routing one "generate response" contract
//! across a heterogeneous set of LLM back-ends: the hosted OpenAI API and
//! every OpenAI-compatible service (DeepSeek, Groq, xAI, Qwen, Together,
//! Ollama and other local servers), Anthropic's Messages API, Google Gemini,
//! and AWS Bedrock.
//!
//! ## Key Features
//!
//! - **One contract, many wires**: every adapter speaks the same
//!   [`AiClient`](client::AiClient) trait; call sites never see wire formats
//! - **Environment auto-detection**: `provider = "auto"` picks the
//!   highest-priority provider whose credentials are present
//! - **Provider aliases**: dotted names (`openai.deepseek`) namespace
//!   endpoints and credentials so parallel services coexist
//! - **Model aliases**: `fast` / `smart` / `code` / `vision` resolve to each
//!   provider's own model at each attempt
//! - **Retry with backoff**: exponential, jittered, `Retry-After`-aware, and
//!   interruptible by dropping the future
//! - **Failover chains**: ordered multi-provider failover with per-attempt
//!   option isolation and a chain-specific error policy
//! - **Streaming**: callback-based chunks with strict ordering and
//!   partial-completion semantics that never splice two providers' output
//! - **Intelligent tool retry**: structured tool errors fed back to an LLM
//!   that proposes a corrected payload, under a hard attempt bound
//! - **Observability**: structured `tracing` logs plus a pluggable span /
//!   counter / histogram seam with a no-op default
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use llm_relay::{ChainClient, ClientConfig, RequestOptions, new_client};
//! use llm_relay::client::AiClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Register the shipped providers once at startup.
//!     llm_relay::providers::register_builtins();
//!
//!     // Single provider, picked from the environment:
//!     let client = new_client(ClientConfig::builder().build()?)?;
//!     let reply = client
//!         .generate("One sentence on ownership.", &RequestOptions::new())
//!         .await?;
//!     println!("{}", reply.content);
//!
//!     // Or a failover chain that rides through auth failures and outages:
//!     let chain = ChainClient::new(["openai", "anthropic", "openai.ollama"])?;
//!     let reply = chain
//!         .generate("Same question.", &RequestOptions::new().with_model("fast"))
//!         .await?;
//!     println!("{}", reply.content);
//!     Ok(())
//! }
//! ```
//!
//! ## Streaming
//!
//! ```rust,no_run
//! use llm_relay::{ChainClient, RequestOptions};
//! use llm_relay::client::AiClient;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # llm_relay::providers::register_builtins();
//! let chain = ChainClient::new(["openai", "anthropic"])?;
//! chain
//!     .generate_stream(
//!         "Stream a haiku about lifetimes.",
//!         &RequestOptions::new(),
//!         &mut |chunk| {
//!             if chunk.delta {
//!                 print!("{}", chunk.content);
//!             }
//!             Ok(())
//!         },
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **client**: the uniform [`AiClient`](client::AiClient) contract
//! - **config**: option collection and client construction (`new_client`)
//! - **registry**: provider factories and environment auto-detection
//! - **catalog**: provider-alias and model-alias tables
//! - **transport**: shared HTTP execution with retry and classification
//! - **providers**: the four wire adapters (OpenAI-compatible, Anthropic,
//!   Gemini, Bedrock)
//! - **chain**: ordered failover, unary and streaming
//! - **tools** / **agent**: tool error envelopes and the intelligent retry
//!   loop
//! - **telemetry**: span/counter/histogram seam with no-op and in-memory
//!   sinks
//! - **error** / **retry** / **types** / **utils**: the supporting cast

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

/// Uniform client contract every adapter and the chain implement.
pub mod client;

/// Provider-alias and model-alias lookup tables.
pub mod catalog;

/// Ordered multi-provider failover, unary and streaming.
mod chain;

/// Configuration builder and client construction.
mod config;

/// Error types and the retry/failover classification predicates.
mod error;

/// Provider factory registry and environment auto-detection.
pub mod registry;

/// Backoff policy shared by the HTTP adapters.
pub mod retry;

/// Shared HTTP execution substrate (pooling, retry, classification,
/// observability).
pub mod transport;

/// Provider adapters, one per wire protocol, plus `register_builtins`.
pub mod providers;

/// Agent-side tool calling with AI-corrected retry.
pub mod agent;

/// Telemetry seam: spans, counters, histograms.
pub mod telemetry;

/// Wire envelopes returned by downstream tools.
pub mod tools;

/// Uniform request/response types.
mod types;

/// SSE decoding and model-output cleanup.
mod utils;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================

// --- Core Client API ---

pub use chain::ChainClient;
pub use client::{AiClient, ChunkHandler};
pub use config::{AwsCredentials, ClientConfig, ClientConfigBuilder, new_client};

// --- Error Handling ---

pub use error::{Error, Result};

// --- Core Types ---

pub use types::{Completion, RequestOptions, StreamChunk, TokenUsage};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// Convenience module containing the most commonly used types and functions.
/// Import with `use llm_relay::prelude::*;` to get everything you need for
/// typical usage.
pub mod prelude {
    pub use crate::agent::ToolCaller;
    pub use crate::client::AiClient;
    pub use crate::providers::register_builtins;
    pub use crate::{
        ChainClient, ClientConfig, Completion, Error, RequestOptions, Result, StreamChunk,
        TokenUsage, new_client,
    };
}
