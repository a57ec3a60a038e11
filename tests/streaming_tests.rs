use futures_util::StreamExt;
use serde_json::{json, Value};

use ledgerllm::orchestrator::{encode_frame, StreamFrame};
use ledgerllm::providers::common::simulate_stream;
use ledgerllm::tools::ExecutedToolCall;

#[tokio::test]
async fn simulated_stream_slices_at_fixed_granularity() {
    let text = "a".repeat(120);
    let mut stream = simulate_stream(&text, 50);

    let mut chunks = Vec::new();
    while let Some(chunk) = stream.next().await {
        chunks.push(chunk.unwrap().content);
    }
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].len(), 50);
    assert_eq!(chunks[2].len(), 20);
    assert_eq!(chunks.concat(), text);
}

#[tokio::test]
async fn simulated_stream_respects_char_boundaries() {
    let text = "héllo wörld ".repeat(12);
    let mut stream = simulate_stream(&text, 50);
    let mut collected = String::new();
    while let Some(chunk) = stream.next().await {
        collected.push_str(&chunk.unwrap().content);
    }
    assert_eq!(collected, text);
}

#[test]
fn frames_encode_as_data_lines() {
    let frame = StreamFrame::Content {
        content: "partial text".to_string(),
    };
    let encoded = encode_frame(&frame);
    assert!(encoded.starts_with("data: "));
    assert!(encoded.ends_with("\n\n"));

    let parsed: Value =
        serde_json::from_str(encoded.trim_start_matches("data: ").trim()).unwrap();
    assert_eq!(parsed["type"], "content");
    assert_eq!(parsed["content"], "partial text");
}

#[test]
fn done_and_error_frames_are_terminal_records() {
    let done: Value = serde_json::from_str(
        encode_frame(&StreamFrame::Done).trim_start_matches("data: ").trim(),
    )
    .unwrap();
    assert_eq!(done, json!({"type": "done"}));

    let error: Value = serde_json::from_str(
        encode_frame(&StreamFrame::Error {
            error: "rate limited".to_string(),
        })
        .trim_start_matches("data: ")
        .trim(),
    )
    .unwrap();
    assert_eq!(error["type"], "error");
    assert_eq!(error["error"], "rate limited");
}

#[test]
fn function_call_frames_serialize_executed_calls() {
    let frame = StreamFrame::FunctionCalls {
        function_calls: vec![ExecutedToolCall {
            id: "call_1".to_string(),
            name: "get_account_balance".to_string(),
            arguments: json!({"account_type": "checking"}),
            result: Some(json!({"balance": 10.0})),
            error: None,
            denied: false,
        }],
    };
    let encoded = encode_frame(&frame);
    let parsed: Value =
        serde_json::from_str(encoded.trim_start_matches("data: ").trim()).unwrap();
    assert_eq!(parsed["type"], "function_calls");
    assert_eq!(parsed["function_calls"][0]["function"], "get_account_balance");
    assert_eq!(parsed["function_calls"][0]["result"]["balance"], 10.0);
    // The denied flag is omitted on the wire for ordinary calls.
    assert!(parsed["function_calls"][0].get("denied").is_none());
}
