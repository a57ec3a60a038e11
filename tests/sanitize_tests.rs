use serde_json::json;

use ledgerllm::orchestrator::sanitize_transcript;
use ledgerllm::provider::{Message, Role, ToolCall, ToolSchema};

fn assistant_with_call(call_id: &str, name: &str) -> Message {
    Message::assistant_with_calls(
        "",
        vec![ToolCall {
            id: call_id.to_string(),
            name: name.to_string(),
            arguments: json!({}),
        }],
    )
}

#[test]
fn matched_tool_message_is_kept_for_schema_a() {
    let transcript = vec![
        Message::system("prompt"),
        Message::user("balance?"),
        assistant_with_call("call_1", "get_account_balance"),
        Message::tool("call_1", "{\"balance\": 10}"),
    ];
    let sanitized = sanitize_transcript(&transcript, ToolSchema::OpenAi);
    assert_eq!(sanitized.len(), 4);

    // Transcript integrity: every tool message follows an assistant turn declaring its id.
    for (i, msg) in sanitized.iter().enumerate() {
        if let Role::Tool { call_id } = &msg.role {
            let previous_assistant = sanitized[..i]
                .iter()
                .rev()
                .find(|m| m.role == Role::Assistant)
                .expect("tool message with no preceding assistant");
            assert!(previous_assistant
                .tool_calls
                .iter()
                .any(|tc| tc.id == *call_id));
        }
    }
}

#[test]
fn orphan_tool_message_is_purged_for_schema_a() {
    let transcript = vec![
        Message::user("hello"),
        Message::tool("call_zz", "{\"stale\": true}"),
    ];
    let sanitized = sanitize_transcript(&transcript, ToolSchema::OpenAi);
    assert_eq!(sanitized.len(), 1);
    assert_eq!(sanitized[0].role, Role::User);
}

#[test]
fn mismatched_call_id_is_purged_for_schema_a() {
    let transcript = vec![
        assistant_with_call("call_1", "list_recipients"),
        Message::tool("call_2", "{}"),
    ];
    let sanitized = sanitize_transcript(&transcript, ToolSchema::OpenAi);
    assert_eq!(sanitized.len(), 1);
}

#[test]
fn assistant_without_calls_resets_the_id_window() {
    let transcript = vec![
        assistant_with_call("call_1", "list_recipients"),
        Message::tool("call_1", "{}"),
        Message::assistant("plain turn"),
        Message::tool("call_1", "{}"),
    ];
    let sanitized = sanitize_transcript(&transcript, ToolSchema::OpenAi);
    // The second tool message follows a call-free assistant turn and is dropped.
    assert_eq!(sanitized.len(), 3);
    assert!(matches!(sanitized[1].role, Role::Tool { .. }));
    assert_eq!(sanitized[2].role, Role::Assistant);
}

#[test]
fn schema_b_keeps_tool_messages_behind_tool_call_turns() {
    let transcript = vec![
        assistant_with_call("call_1", "list_recipients"),
        Message::tool("call_1", "{}"),
        // Anthropic rendering does not require id matching, only a preceding tool turn.
        Message::tool("call_other", "{}"),
    ];
    let sanitized = sanitize_transcript(&transcript, ToolSchema::Anthropic);
    assert_eq!(sanitized.len(), 3);

    let orphan_only = vec![Message::user("hi"), Message::tool("call_1", "{}")];
    let sanitized = sanitize_transcript(&orphan_only, ToolSchema::Anthropic);
    assert_eq!(sanitized.len(), 1);
}

#[test]
fn schema_c_drops_all_tool_messages() {
    let transcript = vec![
        assistant_with_call("call_1", "list_recipients"),
        Message::tool("call_1", "{}"),
        Message::user("next"),
    ];
    let sanitized = sanitize_transcript(&transcript, ToolSchema::Text);
    assert!(sanitized
        .iter()
        .all(|m| !matches!(m.role, Role::Tool { .. })));
    assert_eq!(sanitized.len(), 2);
}

#[test]
fn sanitization_is_idempotent() {
    let transcript = vec![
        Message::user("hello"),
        Message::tool("call_zz", "{}"),
        assistant_with_call("call_1", "x"),
        Message::tool("call_1", "{}"),
    ];
    let once = sanitize_transcript(&transcript, ToolSchema::OpenAi);
    let twice = sanitize_transcript(&once, ToolSchema::OpenAi);
    assert_eq!(once.len(), twice.len());
}
