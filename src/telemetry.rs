//! Telemetry seam: spans, counters, and histograms.
//!
//! The SDK never talks to a metrics backend directly. Everything flows
//! through the [`Telemetry`] trait so embedders can plug in their collector
//! of choice. Two implementations ship with the crate:
//!
//! - [`NoopTelemetry`]: the default. Every emitter is a no-op, so call sites
//!   never branch on "is telemetry configured".
//! - [`MemoryTelemetry`]: records everything into memory. Used by the test
//!   suite to assert on counters and span attributes, and handy for
//!   debugging an embedding before wiring a real collector.
//!
//! Metric names are centralized in the `metrics` module so emitters and
//! assertions agree on spelling.

use std::sync::{Arc, Mutex};

use crate::error::Error;

/// Well-known metric and span names emitted by the SDK.
pub mod metrics {
    /// Counter: one successful provider request.
    pub const REQUEST_SUCCESS: &str = "ai.request.success";
    /// Counter: one failed provider request.
    pub const REQUEST_ERROR: &str = "ai.request.error";
    /// Histogram: wall-clock duration of one provider request, milliseconds.
    pub const REQUEST_DURATION_MS: &str = "ai.request.duration_ms";
    /// Counter: provider-reported tokens, labelled `kind=prompt|completion`.
    pub const REQUEST_TOKENS: &str = "ai.request.tokens";

    /// Span: one chain-level generate call.
    pub const CHAIN_GENERATE_SPAN: &str = "ai.chain.generate_response";
    /// Span: one provider attempt inside a chain.
    pub const CHAIN_ATTEMPT_SPAN: &str = "ai.chain.provider_attempt";
    /// Counter: a later chain member succeeded after earlier failures.
    pub const CHAIN_FAILOVER: &str = "ai.chain.failover";
    /// Counter: every chain member failed.
    pub const CHAIN_EXHAUSTED: &str = "ai.chain.exhausted";

    /// Counter: a tool call was retried (same or corrected payload).
    pub const TOOL_RETRY: &str = "agent.tool_call.retry";
    /// Counter: an AI-corrected payload was produced and resent.
    pub const TOOL_AI_CORRECTION: &str = "agent.tool_call.ai_correction";
    /// Counter: a tool call ended in error.
    pub const TOOL_ERRORS: &str = "agent.tool_call.errors";
    /// Histogram: end-to-end tool call duration, milliseconds.
    pub const TOOL_DURATION_MS: &str = "agent.tool_call.duration_ms";
}

/// An in-flight trace span.
///
/// Spans are ended by dropping them; [`Span::end`] exists for call sites that
/// want the end point to be explicit.
pub trait Span: Send {
    /// Attach a key/value attribute to the span.
    fn set_attribute(&mut self, key: &str, value: &str);

    /// Record an error against the span.
    fn record_error(&mut self, error: &Error);

    /// Explicitly end the span.
    fn end(self: Box<Self>) {}
}

/// Telemetry sink consumed by every client, chain, and tool caller.
pub trait Telemetry: Send + Sync {
    /// Start a span. Returns a no-op span when the sink does not trace.
    fn start_span(&self, name: &str) -> Box<dyn Span>;

    /// Increment a counter by `value`.
    fn incr_counter(&self, name: &str, value: u64, labels: &[(&str, &str)]);

    /// Record one histogram observation.
    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]);
}

/// Shared handle to a telemetry sink.
pub type TelemetryHandle = Arc<dyn Telemetry>;

impl std::fmt::Debug for dyn Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry").finish()
    }
}

/// Sink that drops everything. The default everywhere a sink is optional.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

struct NoopSpan;

impl Span for NoopSpan {
    fn set_attribute(&mut self, _key: &str, _value: &str) {}
    fn record_error(&mut self, _error: &Error) {}
}

impl Telemetry for NoopTelemetry {
    fn start_span(&self, _name: &str) -> Box<dyn Span> {
        Box::new(NoopSpan)
    }

    fn incr_counter(&self, _name: &str, _value: u64, _labels: &[(&str, &str)]) {}

    fn record_histogram(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}
}

/// A recorded counter increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterEvent {
    pub name: String,
    pub value: u64,
    pub labels: Vec<(String, String)>,
}

/// A recorded histogram observation.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramEvent {
    pub name: String,
    pub value: f64,
    pub labels: Vec<(String, String)>,
}

/// A recorded span with its final attribute set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanEvent {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub errors: Vec<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    counters: Vec<CounterEvent>,
    histograms: Vec<HistogramEvent>,
    spans: Vec<SpanEvent>,
}

/// Sink that records every emission into memory.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use llm_relay::telemetry::{MemoryTelemetry, Telemetry, metrics};
///
/// let sink = Arc::new(MemoryTelemetry::new());
/// sink.incr_counter(metrics::REQUEST_SUCCESS, 1, &[("provider", "openai")]);
/// assert_eq!(sink.counter_total(metrics::REQUEST_SUCCESS), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded increments for `name`, in emission order.
    pub fn counters(&self, name: &str) -> Vec<CounterEvent> {
        self.state
            .lock()
            .expect("telemetry state poisoned")
            .counters
            .iter()
            .filter(|c| c.name == name)
            .cloned()
            .collect()
    }

    /// Sum of all increments for `name`.
    pub fn counter_total(&self, name: &str) -> u64 {
        self.counters(name).iter().map(|c| c.value).sum()
    }

    /// All recorded observations for `name`.
    pub fn histograms(&self, name: &str) -> Vec<HistogramEvent> {
        self.state
            .lock()
            .expect("telemetry state poisoned")
            .histograms
            .iter()
            .filter(|h| h.name == name)
            .cloned()
            .collect()
    }

    /// All recorded spans named `name` with their final attributes.
    pub fn spans(&self, name: &str) -> Vec<SpanEvent> {
        self.state
            .lock()
            .expect("telemetry state poisoned")
            .spans
            .iter()
            .filter(|s| s.name == name)
            .cloned()
            .collect()
    }
}

struct MemorySpan {
    state: Arc<Mutex<MemoryState>>,
    index: usize,
}

impl Span for MemorySpan {
    fn set_attribute(&mut self, key: &str, value: &str) {
        let mut state = self.state.lock().expect("telemetry state poisoned");
        state.spans[self.index]
            .attributes
            .push((key.to_string(), value.to_string()));
    }

    fn record_error(&mut self, error: &Error) {
        let mut state = self.state.lock().expect("telemetry state poisoned");
        state.spans[self.index].errors.push(error.to_string());
    }
}

impl Telemetry for MemoryTelemetry {
    fn start_span(&self, name: &str) -> Box<dyn Span> {
        let mut state = self.state.lock().expect("telemetry state poisoned");
        state.spans.push(SpanEvent {
            name: name.to_string(),
            attributes: Vec::new(),
            errors: Vec::new(),
        });
        let index = state.spans.len() - 1;
        Box::new(MemorySpan {
            state: Arc::clone(&self.state),
            index,
        })
    }

    fn incr_counter(&self, name: &str, value: u64, labels: &[(&str, &str)]) {
        let mut state = self.state.lock().expect("telemetry state poisoned");
        state.counters.push(CounterEvent {
            name: name.to_string(),
            value,
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
    }

    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let mut state = self.state.lock().expect("telemetry state poisoned");
        state.histograms.push(HistogramEvent {
            name: name.to_string(),
            value,
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
    }
}
