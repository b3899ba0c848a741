//! Internal utilities: SSE decoding and model-output cleanup.
//!
//! Provider streams arrive as Server-Sent Events:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//!
//! data: [DONE]
//! ```
//!
//! [`sse_data_stream`] decodes the HTTP byte stream into the `data` payloads
//! (skipping the `[DONE]` sentinel); each adapter then parses the payloads in
//! its own wire format. Decoding is delegated to `eventsource-stream`, which
//! handles events split across arbitrary byte boundaries.
//!
//! [`strip_code_fences`] cleans model output that was asked to produce bare
//! JSON but wrapped it in a markdown fence anyway, which chat-tuned models
//! do constantly. The AI-corrected retry path depends on this cleanup since
//! its response must parse as JSON.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};

use crate::error::{Error, Result};

/// Decode an HTTP response into a stream of SSE `data` payloads.
///
/// Yields each event's data string in arrival order; the OpenAI-style
/// `[DONE]` sentinel is consumed, not yielded. Decode failures surface as
/// per-item errors so callers can decide whether a malformed event is fatal.
pub fn sse_data_stream(
    response: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<String>> + Send>> {
    let stream = response
        .bytes_stream()
        .eventsource()
        .filter_map(|event| async move {
            match event {
                Ok(event) => {
                    if event.data == "[DONE]" {
                        None
                    } else {
                        Some(Ok(event.data))
                    }
                }
                Err(e) => Some(Err(Error::stream(format!("SSE decode error: {e}")))),
            }
        });
    Box::pin(stream)
}

/// Strip a surrounding markdown code fence from model output.
///
/// Handles ```` ```json ```` and bare ```` ``` ```` fences; text without a
/// fence passes through trimmed.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line (e.g. "json") after the opening fence.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => return trimmed,
    };
    body.strip_suffix("```").map(str::trim).unwrap_or(trimmed)
}
