use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use ledgerllm::auth::Principal;
use ledgerllm::memory::{EphemeralMemory, MemoryStore};
use ledgerllm::orchestrator::{ChatRequest, Orchestrator};
use ledgerllm::provider::{
    Capabilities, ChatParams, Message, MessageChunkStream, ProviderAdapter, ProviderError, Role,
    ToolCall, ToolDefinition,
};
use ledgerllm::registry::{ActiveModel, ModelRegistry};
use ledgerllm::tools::{ToolDispatch, ToolError};

/// Adapter scripted with a fixed sequence of tool-calling turns.
struct MockAdapter {
    turns: Mutex<VecDeque<(String, Vec<ToolCall>)>>,
    vendor_calls: AtomicUsize,
    seen_transcripts: Mutex<Vec<Vec<Message>>>,
    final_answer: String,
}

impl MockAdapter {
    fn new(turns: Vec<(String, Vec<ToolCall>)>, final_answer: &str) -> Self {
        MockAdapter {
            turns: Mutex::new(turns.into_iter().collect()),
            vendor_calls: AtomicUsize::new(0),
            seen_transcripts: Mutex::new(Vec::new()),
            final_answer: final_answer.to_string(),
        }
    }

    fn calls(&self) -> usize {
        self.vendor_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    async fn chat(
        &self,
        messages: &[Message],
        _params: &ChatParams,
    ) -> Result<String, ProviderError> {
        self.vendor_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_transcripts.lock().await.push(messages.to_vec());
        Ok(self.final_answer.clone())
    }

    async fn chat_with_tools(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
        _params: &ChatParams,
    ) -> Result<(String, Vec<ToolCall>), ProviderError> {
        self.vendor_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_transcripts.lock().await.push(messages.to_vec());
        Ok(self
            .turns
            .lock()
            .await
            .pop_front()
            .unwrap_or((String::new(), vec![])))
    }

    async fn chat_stream(
        &self,
        _messages: &[Message],
        _params: &ChatParams,
    ) -> Result<MessageChunkStream, ProviderError> {
        Ok(Box::pin(futures_util::stream::empty()))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::for_model("openai", "gpt-4.1-nano", false)
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        "gpt-4.1-nano"
    }
}

/// Dispatch stub recording every executed call.
struct MockDispatch {
    executed: Mutex<Vec<String>>,
    responses: Mutex<VecDeque<Result<Value, ToolError>>>,
}

impl MockDispatch {
    fn new(responses: Vec<Result<Value, ToolError>>) -> Self {
        MockDispatch {
            executed: Mutex::new(Vec::new()),
            responses: Mutex::new(responses.into_iter().collect()),
        }
    }
}

#[async_trait]
impl ToolDispatch for MockDispatch {
    async fn execute(
        &self,
        name: &str,
        _args: &Value,
        _principal: Option<&Principal>,
    ) -> Result<Value, ToolError> {
        self.executed.lock().await.push(name.to_string());
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or(Ok(json!({"ok": true})))
    }
}

fn principal_with_tools(tools: &[&str]) -> Principal {
    let mut attributes = serde_json::Map::new();
    attributes.insert("verified".to_string(), json!(true));
    attributes.insert("membership_tier".to_string(), json!("premium"));
    attributes.insert("region".to_string(), json!("domestic"));
    Principal {
        user_id: "user-1".to_string(),
        scopes: vec![
            "banking:read".to_string(),
            "banking:write".to_string(),
            "transfers:create".to_string(),
        ],
        roles: vec!["customer".to_string()],
        attributes,
        expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
        permitted_tools: tools.iter().map(|t| t.to_string()).collect(),
    }
}

fn orchestrator(
    memory: Arc<EphemeralMemory>,
    dispatch: Arc<dyn ToolDispatch>,
    max_iterations: usize,
) -> Orchestrator {
    Orchestrator::new(
        memory,
        dispatch,
        Arc::new(ModelRegistry::empty()),
        "You are a helpful banking assistant.".to_string(),
        max_iterations,
        false,
    )
}

fn active() -> ActiveModel {
    ActiveModel {
        provider: "openai".to_string(),
        friendly: "gpt-4.1-nano".to_string(),
        api_name: "gpt-4.1-nano".to_string(),
    }
}

fn call(id: &str, name: &str, args: Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: args,
    }
}

#[tokio::test]
async fn simple_chat_makes_one_vendor_call_and_no_tools() {
    let memory = Arc::new(EphemeralMemory::new(24));
    let dispatch = Arc::new(MockDispatch::new(vec![]));
    let adapter = Arc::new(MockAdapter::new(vec![], "Hello there!"));
    let orch = orchestrator(memory.clone(), dispatch.clone(), 4);

    let request = ChatRequest {
        prompt: Some("hello".to_string()),
        session_id: Some("s1".to_string()),
        ..ChatRequest::default()
    };
    let outcome = orch
        .chat(adapter.clone(), &active(), None, &request, "req-1")
        .await
        .unwrap();

    assert_eq!(outcome.answer, "Hello there!");
    assert!(outcome.executed_calls.is_empty());
    assert_eq!(adapter.calls(), 1);
    assert!(dispatch.executed.lock().await.is_empty());

    let stored = memory.load("s1").await.unwrap();
    let roles: Vec<&str> = stored.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, vec!["user", "assistant"]);
}

#[tokio::test]
async fn recipient_lookup_then_transfer_trace() {
    let memory = Arc::new(EphemeralMemory::new(24));
    let dispatch = Arc::new(MockDispatch::new(vec![
        Ok(json!({"recipients": [{
            "user_id": "u-alice",
            "name": "Alice",
            "account_id": "acc-R",
            "account_type": "savings"
        }]})),
        Ok(json!({"status": "completed", "transferId": "t-1"})),
    ]));
    let adapter = Arc::new(MockAdapter::new(
        vec![
            (
                String::new(),
                vec![call(
                    "call_1",
                    "list_recipients",
                    json!({"name": "Alice", "account_type": "savings"}),
                )],
            ),
            (
                String::new(),
                vec![call(
                    "call_2",
                    "transfer_funds",
                    json!({"from_account": "checking", "to_account_id": "acc-R", "amount": 25}),
                )],
            ),
        ],
        "Sent $25 to Alice's savings account.",
    ));
    let orch = orchestrator(memory.clone(), dispatch.clone(), 4);
    let principal = principal_with_tools(&["list_recipients", "transfer_funds"]);

    let request = ChatRequest {
        prompt: Some("Send $25 from checking to Alice savings".to_string()),
        use_functions: true,
        session_id: Some("s2".to_string()),
        ..ChatRequest::default()
    };
    let outcome = orch
        .chat(adapter.clone(), &active(), Some(&principal), &request, "req-2")
        .await
        .unwrap();

    assert_eq!(outcome.answer, "Sent $25 to Alice's savings account.");
    let names: Vec<&str> = outcome
        .executed_calls
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(names, vec!["list_recipients", "transfer_funds"]);
    assert!(outcome.executed_calls.iter().all(|c| c.error.is_none()));
    assert_eq!(
        *dispatch.executed.lock().await,
        vec!["list_recipients".to_string(), "transfer_funds".to_string()]
    );

    // Two tool turns, one empty turn that ends the loop, one final answer.
    assert!(adapter.calls() <= 4 + 1);

    // Memory: user prompt, assistant answer, then one summary per executed call.
    let stored = memory.load("s2").await.unwrap();
    let roles: Vec<&str> = stored.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, vec!["user", "assistant", "assistant", "assistant"]);
    assert!(stored[2].content.starts_with("[tool_result] list_recipients:"));
    assert!(stored[3].content.starts_with("[tool_result] transfer_funds:"));
}

#[tokio::test]
async fn unauthorized_tool_is_denied_before_execution() {
    let memory = Arc::new(EphemeralMemory::new(24));
    let dispatch = Arc::new(MockDispatch::new(vec![]));
    let adapter = Arc::new(MockAdapter::new(
        vec![(
            String::new(),
            vec![call(
                "call_1",
                "place_trade_order",
                json!({"symbol": "AAPL", "order_type": "buy", "quantity": 1,
                       "order_method": "market"}),
            )],
        )],
        "I'm not able to place trade orders for you.",
    ));
    let orch = orchestrator(memory.clone(), dispatch.clone(), 4);
    let principal = principal_with_tools(&["get_account_balance"]);

    let request = ChatRequest {
        prompt: Some("Buy one share of AAPL".to_string()),
        use_functions: true,
        session_id: Some("s3".to_string()),
        ..ChatRequest::default()
    };
    let outcome = orch
        .chat(adapter.clone(), &active(), Some(&principal), &request, "req-3")
        .await
        .unwrap();

    // The trading backend is never reached.
    assert!(dispatch.executed.lock().await.is_empty());
    assert_eq!(outcome.executed_calls.len(), 1);
    assert!(outcome.executed_calls[0].denied);
    assert_eq!(
        outcome.executed_calls[0].error.as_deref(),
        Some("permission denied")
    );
    assert!(!outcome.answer.is_empty());

    // Denied calls are not persisted as tool summaries.
    let stored = memory.load("s3").await.unwrap();
    assert!(!stored.iter().any(|m| m.content.contains("[tool_result]")));
}

#[tokio::test]
async fn rag_tool_is_whitelisted_without_permissions() {
    let memory = Arc::new(EphemeralMemory::new(24));
    let dispatch = Arc::new(MockDispatch::new(vec![Ok(
        json!({"context": "Wire transfers settle within one business day."}),
    )]));
    let adapter = Arc::new(MockAdapter::new(
        vec![(
            String::new(),
            // No query argument: the orchestrator fills in the last user message.
            vec![call("call_1", "get_rag_context", json!({}))],
        )],
        "Transfers settle within one business day.",
    ));
    let orch = orchestrator(memory.clone(), dispatch.clone(), 4);

    let request = ChatRequest {
        prompt: Some("How fast do transfers settle?".to_string()),
        use_rag: true,
        session_id: Some("s-rag".to_string()),
        ..ChatRequest::default()
    };
    let outcome = orch
        .chat(adapter.clone(), &active(), None, &request, "req-rag")
        .await
        .unwrap();

    assert_eq!(
        *dispatch.executed.lock().await,
        vec!["get_rag_context".to_string()]
    );
    assert!(outcome.executed_calls[0].error.is_none());
}

#[tokio::test]
async fn tool_timeout_is_fed_back_not_fatal() {
    let memory = Arc::new(EphemeralMemory::new(24));
    let dispatch = Arc::new(MockDispatch::new(vec![Err(ToolError::Timeout)]));
    let adapter = Arc::new(MockAdapter::new(
        vec![(
            String::new(),
            vec![call(
                "call_1",
                "transfer_funds",
                json!({"from_account": "checking", "to_account_id": "acc-R", "amount": 25}),
            )],
        )],
        "The transfer service timed out; please try again.",
    ));
    let orch = orchestrator(memory.clone(), dispatch.clone(), 4);
    let principal = principal_with_tools(&["transfer_funds"]);

    let request = ChatRequest {
        prompt: Some("Send $25 to acc-R".to_string()),
        use_functions: true,
        session_id: Some("s5".to_string()),
        ..ChatRequest::default()
    };
    let outcome = orch
        .chat(adapter.clone(), &active(), Some(&principal), &request, "req-5")
        .await
        .unwrap();

    assert_eq!(outcome.executed_calls.len(), 1);
    assert_eq!(outcome.executed_calls[0].error.as_deref(), Some("timeout"));
    assert!(!outcome.executed_calls[0].denied);
    assert_eq!(outcome.answer, "The transfer service timed out; please try again.");
}

#[tokio::test]
async fn tool_loop_is_bounded() {
    let memory = Arc::new(EphemeralMemory::new(24));
    let dispatch = Arc::new(MockDispatch::new(vec![]));
    // Model that never stops asking for tools.
    let endless: Vec<(String, Vec<ToolCall>)> = (0..32)
        .map(|i| {
            (
                String::new(),
                vec![call(
                    &format!("call_{}", i),
                    "get_account_balance",
                    json!({"account_type": "checking"}),
                )],
            )
        })
        .collect();
    let adapter = Arc::new(MockAdapter::new(endless, "done"));
    let orch = orchestrator(memory.clone(), dispatch.clone(), 4);
    let principal = principal_with_tools(&["get_account_balance"]);

    let request = ChatRequest {
        prompt: Some("balance?".to_string()),
        use_functions: true,
        ..ChatRequest::default()
    };
    let outcome = orch
        .chat(adapter.clone(), &active(), Some(&principal), &request, "req-7")
        .await
        .unwrap();

    // At most iteration_bound tool turns plus the final tool-free turn.
    assert_eq!(adapter.calls(), 4 + 1);
    assert_eq!(outcome.executed_calls.len(), 4);
}

#[tokio::test]
async fn no_raw_tool_roles_reach_memory() {
    let memory = Arc::new(EphemeralMemory::new(24));
    let dispatch = Arc::new(MockDispatch::new(vec![Ok(json!({"balance": 12.5}))]));
    let adapter = Arc::new(MockAdapter::new(
        vec![(
            String::new(),
            vec![call(
                "call_1",
                "get_account_balance",
                json!({"account_type": "checking"}),
            )],
        )],
        "Your checking balance is $12.50.",
    ));
    let orch = orchestrator(memory.clone(), dispatch.clone(), 4);
    let principal = principal_with_tools(&["get_account_balance"]);

    let request = ChatRequest {
        prompt: Some("What's my balance?".to_string()),
        use_functions: true,
        session_id: Some("s8".to_string()),
        ..ChatRequest::default()
    };
    orch.chat(adapter, &active(), Some(&principal), &request, "req-8")
        .await
        .unwrap();

    for record in memory.audit_records("s8").await {
        assert_ne!(record.role, "tool");
    }
    let stored = memory.load("s8").await.unwrap();
    assert!(stored.iter().all(|m| m.role != "tool"));
    assert!(stored
        .iter()
        .any(|m| m.content.starts_with("[tool_result] get_account_balance:")));
}

#[tokio::test]
async fn orphan_tool_message_in_history_is_sanitized_before_vendor_call() {
    let memory = Arc::new(EphemeralMemory::new(24));
    // A prior defect left a trailing tool-role record in the thread.
    memory
        .append(
            "s4",
            "user-1",
            &[
                ledgerllm::memory::StoredMessage::new("user", "earlier question"),
                ledgerllm::memory::StoredMessage::new("tool", "{\"stale\": true}"),
            ],
        )
        .await
        .unwrap();

    let dispatch = Arc::new(MockDispatch::new(vec![]));
    let adapter = Arc::new(MockAdapter::new(vec![], "All good."));
    let orch = orchestrator(memory.clone(), dispatch, 4);

    let request = ChatRequest {
        prompt: Some("hello again".to_string()),
        session_id: Some("s4".to_string()),
        ..ChatRequest::default()
    };
    let outcome = orch
        .chat(adapter.clone(), &active(), None, &request, "req-4")
        .await
        .unwrap();
    assert_eq!(outcome.answer, "All good.");

    // The vendor never saw a tool-role message.
    for transcript in adapter.seen_transcripts.lock().await.iter() {
        assert!(transcript
            .iter()
            .all(|m| !matches!(m.role, Role::Tool { .. })));
    }
}

#[tokio::test]
async fn banking_prompt_replaces_history_system_messages() {
    let memory = Arc::new(EphemeralMemory::new(24));
    memory
        .append(
            "s9",
            "user-1",
            &[
                ledgerllm::memory::StoredMessage::new("system", "stale system prompt"),
                ledgerllm::memory::StoredMessage::new("user", "earlier question"),
            ],
        )
        .await
        .unwrap();

    let dispatch = Arc::new(MockDispatch::new(vec![]));
    let adapter = Arc::new(MockAdapter::new(vec![], "ok"));
    let orch = orchestrator(memory, dispatch, 4);

    let request = ChatRequest {
        prompt: Some("and now?".to_string()),
        session_id: Some("s9".to_string()),
        ..ChatRequest::default()
    };
    orch.chat(adapter.clone(), &active(), None, &request, "req-9")
        .await
        .unwrap();

    let transcripts = adapter.seen_transcripts.lock().await;
    let transcript = &transcripts[0];
    let system_count = transcript
        .iter()
        .filter(|m| m.role == Role::System)
        .count();
    assert_eq!(system_count, 1);
    assert_eq!(transcript[0].role, Role::System);
    assert!(transcript[0].content.contains("banking assistant"));
}

#[tokio::test]
async fn request_validation_rejects_bad_bodies() {
    let empty = ChatRequest::default();
    assert!(empty.validate().is_err());

    let both = ChatRequest {
        prompt: Some("a".to_string()),
        messages: Some(vec![]),
        ..ChatRequest::default()
    };
    assert!(both.validate().is_err());

    let hot = ChatRequest {
        prompt: Some("a".to_string()),
        temperature: Some(3.0),
        ..ChatRequest::default()
    };
    assert!(hot.validate().is_err());

    let huge = ChatRequest {
        prompt: Some("a".to_string()),
        max_tokens: Some(10_000),
        ..ChatRequest::default()
    };
    assert!(huge.validate().is_err());
}
