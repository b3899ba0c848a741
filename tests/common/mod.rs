//! Shared fakes for the integration suites.
#![allow(dead_code)] // each test binary uses a different subset of the fakes
//!
//! `FakeClient` implements the public `AiClient` trait with scripted
//! behavior and records every options value it receives, so the chain tests
//! can assert on exactly what reached each provider.

use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use llm_relay::client::{AiClient, ChunkHandler};
use llm_relay::{Completion, Error, RequestOptions, StreamChunk};

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness so the chain's and tool
/// caller's WARN/INFO events show up under `--nocapture`. Safe to call from
/// every test; only the first call installs the subscriber.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

/// What a fake provider does when called.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Return a completion with this content.
    Succeed(&'static str),
    /// Fail with a 401-style auth error.
    FailAuth,
    /// Fail with a 429-style rate limit.
    FailRateLimit,
    /// Fail with a 5xx-style transient error.
    FailTransient,
    /// Fail with a 400-style invalid request.
    FailBadRequest,
}

impl Behavior {
    fn to_error(&self, provider: &str) -> Error {
        match self {
            Behavior::FailAuth => Error::auth(provider, "invalid api key"),
            Behavior::FailRateLimit => Error::rate_limited(provider, "slow down"),
            Behavior::FailTransient => Error::service_unavailable(provider, "upstream 503"),
            Behavior::FailBadRequest => Error::invalid_request(provider, 400, "bad prompt"),
            Behavior::Succeed(_) => unreachable!("success has no error"),
        }
    }
}

/// Scripted unary provider that records the options it receives.
pub struct FakeClient {
    pub alias: String,
    behavior: Behavior,
    /// Rewrite the model like a real adapter's default application would,
    /// to prove mutations never leak between attempts or to the caller.
    resolve_model: bool,
    pub seen_options: Arc<Mutex<Vec<RequestOptions>>>,
}

impl FakeClient {
    pub fn new(alias: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            alias: alias.to_string(),
            behavior,
            resolve_model: true,
            seen_options: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Options exactly as they arrived, before the fake's own resolution.
    pub fn seen(&self) -> Vec<RequestOptions> {
        self.seen_options.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.seen_options.lock().unwrap().len()
    }
}

#[async_trait]
impl AiClient for FakeClient {
    async fn generate(&self, _prompt: &str, options: &RequestOptions) -> Result<Completion, Error> {
        self.seen_options.lock().unwrap().push(options.clone());

        // Work on a local copy the way adapters do; the caller's value and
        // the recorded entry value must stay untouched.
        let mut working = options.clone();
        if self.resolve_model {
            working.model = format!("resolved-{}", self.alias);
        }

        match &self.behavior {
            Behavior::Succeed(content) => {
                Ok(Completion::new(*content, working.model.clone()))
            }
            other => Err(other.to_error(&self.alias)),
        }
    }

    fn provider_name(&self) -> &str {
        &self.alias
    }
}

/// Scripted streaming provider: emits `chunks`, then either finishes or
/// fails.
pub struct FakeStreamClient {
    pub alias: String,
    chunks: Vec<&'static str>,
    fail_after_chunks: bool,
    fail_before_first_chunk: bool,
    pub calls: Arc<Mutex<usize>>,
}

impl FakeStreamClient {
    pub fn emitting(alias: &str, chunks: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            alias: alias.to_string(),
            chunks,
            fail_after_chunks: false,
            fail_before_first_chunk: false,
            calls: Arc::new(Mutex::new(0)),
        })
    }

    pub fn failing_after(alias: &str, chunks: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            alias: alias.to_string(),
            chunks,
            fail_after_chunks: true,
            fail_before_first_chunk: false,
            calls: Arc::new(Mutex::new(0)),
        })
    }

    pub fn failing_immediately(alias: &str) -> Arc<Self> {
        Arc::new(Self {
            alias: alias.to_string(),
            chunks: Vec::new(),
            fail_after_chunks: false,
            fail_before_first_chunk: true,
            calls: Arc::new(Mutex::new(0)),
        })
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl AiClient for FakeStreamClient {
    async fn generate(&self, _prompt: &str, options: &RequestOptions) -> Result<Completion, Error> {
        *self.calls.lock().unwrap() += 1;
        if self.fail_before_first_chunk || self.fail_after_chunks {
            return Err(Error::service_unavailable(&self.alias, "unary fail"));
        }
        Ok(Completion::new(self.chunks.concat(), options.model.clone()))
    }

    fn provider_name(&self) -> &str {
        &self.alias
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn generate_stream(
        &self,
        _prompt: &str,
        _options: &RequestOptions,
        on_chunk: &mut ChunkHandler<'_>,
    ) -> Result<(), Error> {
        *self.calls.lock().unwrap() += 1;

        if self.fail_before_first_chunk {
            return Err(Error::service_unavailable(&self.alias, "connect refused"));
        }

        let mut delivered = String::new();
        for (index, content) in self.chunks.iter().enumerate() {
            delivered.push_str(content);
            on_chunk(StreamChunk::content_delta(*content, index, "fake-model"))?;
        }

        if self.fail_after_chunks {
            return Err(Error::StreamInterrupted {
                provider: self.alias.clone(),
                chunks: self.chunks.len(),
                partial: delivered,
                message: "connection reset mid-stream".to_string(),
            });
        }

        on_chunk(StreamChunk::finished(self.chunks.len(), "fake-model", "stop"))?;
        Ok(())
    }
}

/// Unary-only provider used to prove the chain skips it for streams.
pub struct NonStreamingClient {
    pub alias: String,
    pub calls: Arc<Mutex<usize>>,
}

impl NonStreamingClient {
    pub fn new(alias: &str) -> Arc<Self> {
        Arc::new(Self {
            alias: alias.to_string(),
            calls: Arc::new(Mutex::new(0)),
        })
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl AiClient for NonStreamingClient {
    async fn generate(&self, _prompt: &str, options: &RequestOptions) -> Result<Completion, Error> {
        *self.calls.lock().unwrap() += 1;
        Ok(Completion::new("unary only", options.model.clone()))
    }

    fn provider_name(&self) -> &str {
        &self.alias
    }
}
