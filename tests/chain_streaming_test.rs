//! Streaming chain semantics: skip rule, pre-chunk failover, and the
//! no-failover-after-first-chunk guarantee.

mod common;

use std::sync::Arc;

use common::{FakeStreamClient, NonStreamingClient};
use llm_relay::client::AiClient;
use llm_relay::{ChainClient, Error, RequestOptions, StreamChunk};

fn chain_of(clients: Vec<(String, Arc<dyn AiClient>)>) -> ChainClient {
    common::init_tracing();
    ChainClient::from_clients(clients).unwrap()
}

async fn collect_stream(
    chain: &ChainClient,
) -> (Vec<StreamChunk>, Result<(), Error>) {
    let mut chunks = Vec::new();
    let result = chain
        .generate_stream("hi", &RequestOptions::new(), &mut |chunk| {
            chunks.push(chunk);
            Ok(())
        })
        .await;
    (chunks, result)
}

// S5: a provider that fails after emitting chunks yields a partial
// completion; the next provider is never invoked.
#[tokio::test]
async fn partial_stream_never_fails_over() {
    let x = FakeStreamClient::failing_after("x", vec!["Hel", "lo"]);
    let y = FakeStreamClient::emitting("y", vec!["Other"]);
    let chain = chain_of(vec![
        ("x".to_string(), x.clone() as Arc<dyn AiClient>),
        ("y".to_string(), y.clone() as Arc<dyn AiClient>),
    ]);

    let (chunks, result) = collect_stream(&chain).await;

    // Exactly the two chunks from X, in order, strictly increasing indices.
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].content, "Hel");
    assert_eq!(chunks[1].content, "lo");
    assert!(chunks.windows(2).all(|w| w[0].index < w[1].index));

    match result.unwrap_err() {
        Error::StreamInterrupted {
            chunks: emitted,
            partial,
            ..
        } => {
            assert_eq!(emitted, 2);
            assert_eq!(partial, "Hello");
        }
        other => panic!("expected StreamInterrupted, got {other:?}"),
    }

    assert_eq!(y.call_count(), 0, "Y must never be invoked");
}

// Property 7: non-streaming members are skipped entirely for stream calls.
#[tokio::test]
async fn non_streaming_member_is_skipped() {
    let x = NonStreamingClient::new("x");
    let y = FakeStreamClient::emitting("y", vec!["from-y"]);
    let chain = chain_of(vec![
        ("x".to_string(), x.clone() as Arc<dyn AiClient>),
        ("y".to_string(), y.clone() as Arc<dyn AiClient>),
    ]);

    let (chunks, result) = collect_stream(&chain).await;
    result.unwrap();

    assert_eq!(x.call_count(), 0);
    assert_eq!(y.call_count(), 1);
    assert_eq!(chunks[0].content, "from-y");
    // Final chunk is the completion marker.
    let last = chunks.last().unwrap();
    assert!(!last.delta);
    assert_eq!(last.finish_reason.as_deref(), Some("stop"));
}

// A failure before the first chunk is an ordinary failover.
#[tokio::test]
async fn pre_chunk_failure_fails_over() {
    let x = FakeStreamClient::failing_immediately("x");
    let y = FakeStreamClient::emitting("y", vec!["recovered"]);
    let chain = chain_of(vec![
        ("x".to_string(), x.clone() as Arc<dyn AiClient>),
        ("y".to_string(), y.clone() as Arc<dyn AiClient>),
    ]);

    let (chunks, result) = collect_stream(&chain).await;
    result.unwrap();

    assert_eq!(x.call_count(), 1);
    assert_eq!(y.call_count(), 1);
    assert_eq!(chunks[0].content, "recovered");
}

#[tokio::test]
async fn all_streaming_members_failing_exhausts_chain() {
    let x = FakeStreamClient::failing_immediately("x");
    let y = FakeStreamClient::failing_immediately("y");
    let chain = chain_of(vec![
        ("x".to_string(), x as Arc<dyn AiClient>),
        ("y".to_string(), y as Arc<dyn AiClient>),
    ]);

    let (chunks, result) = collect_stream(&chain).await;
    assert!(chunks.is_empty());
    match result.unwrap_err() {
        Error::ChainExhausted { attempted, .. } => {
            assert_eq!(attempted, vec!["x".to_string(), "y".to_string()]);
        }
        other => panic!("expected ChainExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn chain_with_no_streaming_member_errors() {
    let x = NonStreamingClient::new("x");
    let chain = chain_of(vec![("x".to_string(), x as Arc<dyn AiClient>)]);

    assert!(!chain.supports_streaming());
    let (chunks, result) = collect_stream(&chain).await;
    assert!(chunks.is_empty());
    assert!(result.is_err());
}

#[tokio::test]
async fn supports_streaming_is_union_over_members() {
    let unary = NonStreamingClient::new("u");
    let streaming = FakeStreamClient::emitting("s", vec!["x"]);
    let chain = chain_of(vec![
        ("u".to_string(), unary as Arc<dyn AiClient>),
        ("s".to_string(), streaming as Arc<dyn AiClient>),
    ]);
    assert!(chain.supports_streaming());
}

// A callback abort stops the stream without invoking later providers.
#[tokio::test]
async fn callback_error_aborts_current_provider_only() {
    let x = FakeStreamClient::emitting("x", vec!["a", "b", "c"]);
    let y = FakeStreamClient::emitting("y", vec!["other"]);
    let chain = chain_of(vec![
        ("x".to_string(), x.clone() as Arc<dyn AiClient>),
        ("y".to_string(), y.clone() as Arc<dyn AiClient>),
    ]);

    let mut received = 0usize;
    let result = chain
        .generate_stream("hi", &RequestOptions::new(), &mut |_chunk| {
            received += 1;
            if received == 2 {
                return Err(Error::other("caller aborted"));
            }
            Ok(())
        })
        .await;

    assert!(result.is_err());
    assert_eq!(received, 2);
    assert_eq!(y.call_count(), 0, "callback abort must not trigger failover");
}
