use std::sync::Arc;

use serde_json::json;
use tokio::sync::RwLock;

use ledgerllm::auth::ToolCatalog;
use ledgerllm::registry::{ActiveModel, ModelRegistry};
use ledgerllm::tools::executor::looks_like_account_id;
use ledgerllm::tools::{descriptor_for, BackendClients, ToolDispatch, ToolError, ToolExecutor};

fn executor() -> ToolExecutor {
    let backends = BackendClients::new(
        "http://127.0.0.1:1",
        "http://127.0.0.1:1",
        "http://127.0.0.1:1",
    );
    let active = Arc::new(RwLock::new(ActiveModel {
        provider: "openai".to_string(),
        friendly: "gpt-4.1-nano".to_string(),
        api_name: "gpt-4.1-nano".to_string(),
    }));
    ToolExecutor::new(backends, Arc::new(ModelRegistry::empty()), active, 2000)
}

#[tokio::test]
async fn unknown_tool_is_distinct_from_denial() {
    let result = executor()
        .execute("mint_currency", &json!({}), None)
        .await;
    assert!(matches!(result, Err(ToolError::UnknownTool)));
}

#[tokio::test]
async fn trigger_end_session_needs_no_backend() {
    let result = executor()
        .execute("trigger_end_session", &json!({"reason": "all done"}), None)
        .await
        .unwrap();
    assert_eq!(result["end_session"], true);
    assert_eq!(result["reason"], "all done");

    let default_reason = executor()
        .execute("trigger_end_session", &json!({}), None)
        .await
        .unwrap();
    assert_eq!(default_reason["reason"], "User requested to end session");
}

#[tokio::test]
async fn list_recipients_requires_three_characters() {
    let result = executor()
        .execute("list_recipients", &json!({"name": "Al"}), None)
        .await;
    assert!(matches!(result, Err(ToolError::InvalidArguments(_))));

    let missing = executor()
        .execute("list_recipients", &json!({}), None)
        .await;
    assert!(matches!(missing, Err(ToolError::InvalidArguments(_))));
}

#[tokio::test]
async fn transfer_funds_validates_arguments_before_any_backend_call() {
    let missing_amount = executor()
        .execute(
            "transfer_funds",
            &json!({"from_account": "checking", "to_account_id": "x"}),
            None,
        )
        .await;
    // No principal and missing amount are both argument problems, never a panic.
    assert!(matches!(
        missing_amount,
        Err(ToolError::InvalidArguments(_))
    ));
}

#[tokio::test]
async fn rag_query_is_required_when_no_default_exists() {
    let result = executor()
        .execute("get_rag_context", &json!({}), None)
        .await;
    assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
}

#[test]
fn account_id_detection_matches_hyphenated_identifiers() {
    assert!(looks_like_account_id(
        "123e4567-e89b-42d3-a456-426614174000"
    ));
    assert!(!looks_like_account_id("checking"));
    assert!(!looks_like_account_id("savings"));
    // Right length, wrong shape.
    assert!(!looks_like_account_id(
        "123e4567ae89ba42d3aa456a426614174000"
    ));
}

#[test]
fn every_catalog_entry_has_a_descriptor() {
    for entry in ToolCatalog::banking().entries() {
        assert!(
            descriptor_for(&entry.name).is_some(),
            "catalog tool {} has no descriptor",
            entry.name
        );
    }
    // The whitelisted retrieval tool is not a catalog entry but needs a descriptor.
    assert!(descriptor_for("get_rag_context").is_some());
    assert!(descriptor_for("no_such_tool").is_none());
}

#[test]
fn descriptors_carry_json_schema_parameters() {
    let descriptor = descriptor_for("transfer_funds").unwrap();
    assert_eq!(descriptor.parameters["type"], "object");
    let required = descriptor.parameters["required"].as_array().unwrap();
    assert!(required.contains(&json!("from_account")));
    assert!(required.contains(&json!("to_account_id")));
    assert!(required.contains(&json!("amount")));

    let recipients = descriptor_for("list_recipients").unwrap();
    assert_eq!(recipients.parameters["required"], json!(["name"]));
}
