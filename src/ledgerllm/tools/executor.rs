//! Tool execution against the internal micro-services.
//!
//! `execute` dispatches a validated tool name to its handler.  Handlers never panic on
//! model-supplied input: missing or malformed arguments surface as
//! [`ToolError::InvalidArguments`], backend failures as their structured variants, and
//! everything flows back into the transcript for the model's next turn.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::ledgerllm::auth::Principal;
use crate::ledgerllm::providers::common::truncate_chars;
use crate::ledgerllm::registry::{ActiveModel, ModelRegistry};
use crate::ledgerllm::tools::{BackendClients, ToolError};

/// A tool call the orchestrator processed, with its result or error attached.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutedToolCall {
    pub id: String,
    /// Tool name (serialized as `function` for wire compatibility with clients).
    #[serde(rename = "function")]
    pub name: String,
    pub arguments: Value,
    pub result: Option<Value>,
    pub error: Option<String>,
    /// True when the call was rejected pre-execution by the authorization check.
    #[serde(default, skip_serializing_if = "is_false")]
    pub denied: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Dispatch seam between the orchestrator and tool execution.
#[async_trait]
pub trait ToolDispatch: Send + Sync {
    /// Run `name` with `args` on behalf of `principal`.
    async fn execute(
        &self,
        name: &str,
        args: &Value,
        principal: Option<&Principal>,
    ) -> Result<Value, ToolError>;
}

/// Production executor backed by the finance, user, and retrieval services.
pub struct ToolExecutor {
    backends: BackendClients,
    registry: Arc<ModelRegistry>,
    active: Arc<RwLock<ActiveModel>>,
    rag_max_context_chars: usize,
}

impl ToolExecutor {
    pub fn new(
        backends: BackendClients,
        registry: Arc<ModelRegistry>,
        active: Arc<RwLock<ActiveModel>>,
        rag_max_context_chars: usize,
    ) -> ToolExecutor {
        ToolExecutor {
            backends,
            registry,
            active,
            rag_max_context_chars,
        }
    }

    /// Resolve an account designator to an account id.
    ///
    /// A 36-character hyphenated identifier is taken verbatim; anything else is treated
    /// as an account-type name and matched against the user's accounts.
    async fn resolve_user_account(
        &self,
        identifier: &str,
        user_id: &str,
    ) -> Result<String, ToolError> {
        if looks_like_account_id(identifier) {
            return Ok(identifier.to_string());
        }
        let accounts = self.backends.accounts(user_id).await?;
        for account in accounts.as_array().into_iter().flatten() {
            let account_type = account.get("type").and_then(|t| t.as_str()).unwrap_or("");
            if account_type.eq_ignore_ascii_case(identifier) {
                if let Some(id) = account.get("id").and_then(|i| i.as_str()) {
                    return Ok(id.to_string());
                }
            }
        }
        Err(ToolError::InvalidArguments(format!(
            "no {} account found for user",
            identifier
        )))
    }

    async fn transfer_funds(
        &self,
        args: &Value,
        principal: Option<&Principal>,
    ) -> Result<Value, ToolError> {
        let principal = principal.ok_or_else(|| {
            ToolError::InvalidArguments("user context required for transfer_funds".to_string())
        })?;
        let from_account = require_str(args, "from_account")?;
        let to_account_id = require_str(args, "to_account_id")?;
        let amount = args
            .get("amount")
            .and_then(|a| a.as_f64())
            .ok_or_else(|| ToolError::InvalidArguments("amount is required".to_string()))?;

        let from_account_id = self
            .resolve_user_account(from_account, principal.finance_user_id())
            .await?;

        let payload = json!({
            "fromAccountId": from_account_id,
            "toAccountId": to_account_id,
            "amount": amount,
            "description": args.get("description").and_then(|d| d.as_str())
                .unwrap_or("LLM initiated transfer"),
        });
        self.backends.post_transfer(&payload).await
    }

    async fn list_recipients(&self, args: &Value) -> Result<Value, ToolError> {
        let name = args
            .get("name")
            .and_then(|n| n.as_str())
            .map(str::trim)
            .unwrap_or("");
        if name.chars().count() < 3 {
            return Err(ToolError::InvalidArguments(
                "name parameter (min 3 chars) is required".to_string(),
            ));
        }
        let requested_type = args
            .get("account_type")
            .and_then(|t| t.as_str())
            .map(|t| t.trim().to_lowercase())
            .unwrap_or_default();

        let users_resp = self.backends.search_users(name).await?;
        let users = users_resp
            .get("users")
            .and_then(|u| u.as_array())
            .cloned()
            .unwrap_or_default();

        let mut recipients = Vec::new();
        for user in &users {
            let Some(user_id) = user.get("id").and_then(|i| i.as_str()) else {
                continue;
            };
            let accounts = self.backends.accounts(user_id).await?;
            let accounts = accounts.as_array().cloned().unwrap_or_default();
            if accounts.is_empty() {
                continue;
            }

            let chosen = if requested_type.is_empty() {
                Some(&accounts[0])
            } else {
                accounts.iter().find(|a| {
                    a.get("type")
                        .and_then(|t| t.as_str())
                        .map(|t| t.trim().eq_ignore_ascii_case(&requested_type))
                        .unwrap_or(false)
                })
            };
            let Some(account) = chosen else {
                // User lacks the requested account type.
                continue;
            };

            recipients.push(json!({
                "user_id": user_id,
                "name": user.get("name").cloned().unwrap_or(Value::Null),
                "account_id": account.get("id").cloned().unwrap_or(Value::Null),
                "account_type": account.get("type").cloned().unwrap_or(Value::Null),
            }));
        }
        Ok(json!({"recipients": recipients}))
    }

    async fn get_account_balance(
        &self,
        args: &Value,
        principal: Option<&Principal>,
    ) -> Result<Value, ToolError> {
        let account_type = require_str(args, "account_type")?;
        let user_id = principal.map(|p| p.finance_user_id()).ok_or_else(|| {
            ToolError::InvalidArguments("user context required for balance lookup".to_string())
        })?;
        let accounts = self.backends.accounts(user_id).await?;
        let balance: f64 = accounts
            .as_array()
            .into_iter()
            .flatten()
            .filter(|a| {
                a.get("type")
                    .and_then(|t| t.as_str())
                    .map(|t| t.eq_ignore_ascii_case(account_type))
                    .unwrap_or(false)
            })
            .filter_map(|a| a.get("balance").and_then(|b| b.as_f64()))
            .sum();
        Ok(json!({"account_type": account_type, "balance": balance}))
    }

    async fn get_transaction_history(
        &self,
        args: &Value,
        principal: Option<&Principal>,
    ) -> Result<Value, ToolError> {
        let days = args.get("days").and_then(|d| d.as_i64()).unwrap_or(30);
        let limit = args
            .get("limit")
            .and_then(|l| l.as_u64())
            .filter(|l| *l > 0)
            .unwrap_or(5) as usize;
        let user_id = principal.map(|p| p.finance_user_id()).ok_or_else(|| {
            ToolError::InvalidArguments("user context required for history lookup".to_string())
        })?;

        let transactions = self.backends.transactions(user_id).await?;
        let cutoff = chrono::Utc::now() - chrono::Duration::days(days.max(0));
        let filtered: Vec<Value> = transactions
            .as_array()
            .into_iter()
            .flatten()
            .filter(|txn| within_cutoff(txn, cutoff))
            .take(limit)
            .cloned()
            .collect();
        Ok(json!({"days": days, "transactions": filtered}))
    }

    async fn get_rag_context(&self, args: &Value) -> Result<Value, ToolError> {
        let query = args
            .get("query")
            .and_then(|q| q.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| {
                ToolError::InvalidArguments("get_rag_context requires 'query' string".to_string())
            })?;

        // Per-model retrieval limits from the registry.
        let active = self.active.read().await.clone();
        let defaults = self
            .registry
            .default_params(&active.provider, &active.friendly);
        let max_chars = defaults
            .rag_max_context_chars
            .unwrap_or(self.rag_max_context_chars);

        let data = self.backends.rag_query(query, defaults.rag_k).await?;
        let context = data
            .get("context")
            .and_then(|c| c.as_str())
            .unwrap_or_default();
        let context = if max_chars > 0 {
            truncate_chars(context, max_chars)
        } else {
            context.to_string()
        };
        log::info!("retrieval context fetched ({} chars)", context.len());
        Ok(json!({"context": context}))
    }

    async fn get_user_profile(&self, principal: Option<&Principal>) -> Result<Value, ToolError> {
        let principal = principal.ok_or_else(|| {
            ToolError::InvalidArguments("user context required for profile lookup".to_string())
        })?;
        let accounts = self.backends.accounts(principal.finance_user_id()).await?;
        Ok(json!({
            "user_id": principal.finance_user_id(),
            "name": principal.attr_str("user_name"),
            "membership_tier": principal.attr_str("membership_tier"),
            "region": principal.attr_str("region"),
            "accounts": accounts,
        }))
    }
}

#[async_trait]
impl ToolDispatch for ToolExecutor {
    async fn execute(
        &self,
        name: &str,
        args: &Value,
        principal: Option<&Principal>,
    ) -> Result<Value, ToolError> {
        log::info!("executing tool {}", name);
        match name {
            "transfer_funds" => self.transfer_funds(args, principal).await,
            "list_recipients" => self.list_recipients(args).await,
            "get_account_balance" => self.get_account_balance(args, principal).await,
            "get_transaction_history" => self.get_transaction_history(args, principal).await,
            "get_rag_context" => self.get_rag_context(args).await,
            "get_user_profile" => self.get_user_profile(principal).await,
            "trigger_end_session" => Ok(json!({
                "end_session": true,
                "reason": args.get("reason").and_then(|r| r.as_str())
                    .unwrap_or("User requested to end session"),
            })),
            _ => Err(ToolError::UnknownTool),
        }
    }
}

/// 36 characters with 4 hyphens reads as an account id.
pub fn looks_like_account_id(identifier: &str) -> bool {
    identifier.len() == 36 && identifier.matches('-').count() == 4
}

fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("{} is required", key)))
}

fn within_cutoff(txn: &Value, cutoff: chrono::DateTime<chrono::Utc>) -> bool {
    let Some(ts) = txn
        .get("createdAt")
        .or_else(|| txn.get("created_at"))
        .and_then(|t| t.as_str())
    else {
        // Keep entries with no timestamp.
        return true;
    };
    match chrono::DateTime::parse_from_rfc3339(ts) {
        Ok(parsed) => parsed.with_timezone(&chrono::Utc) >= cutoff,
        Err(_) => true,
    }
}
