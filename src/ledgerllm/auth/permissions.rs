//! Tool catalog and ABAC permission resolution.
//!
//! The catalog registers each banking tool with its required scopes, required roles, and
//! attribute conditions.  Resolution is a pure function of claims plus catalog: the same
//! input always yields the same permitted set, and nothing here performs I/O.
//!
//! Gates, in order:
//! 1. Scope gate — non-empty `required_scopes` must intersect the principal's scopes.
//! 2. Role gate — non-empty `required_roles` must intersect the principal's roles.
//! 3. Condition gate — `verified` is a boolean requirement; enumerated keys
//!    (`membership_tier`, `region`, …) match by list membership or equality.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Catalog entry for one tool.
#[derive(Debug, Clone)]
pub struct ToolPermission {
    pub name: String,
    pub required_scopes: Vec<String>,
    pub required_roles: Vec<String>,
    pub conditions: Map<String, Value>,
    pub description: String,
}

impl ToolPermission {
    fn new(
        name: &str,
        required_scopes: &[&str],
        required_roles: &[&str],
        conditions: Value,
        description: &str,
    ) -> ToolPermission {
        ToolPermission {
            name: name.to_string(),
            required_scopes: required_scopes.iter().map(|s| s.to_string()).collect(),
            required_roles: required_roles.iter().map(|s| s.to_string()).collect(),
            conditions: conditions.as_object().cloned().unwrap_or_default(),
            description: description.to_string(),
        }
    }
}

/// Process-wide, read-only registry of banking tools and their ABAC requirements.
pub struct ToolCatalog {
    entries: Vec<ToolPermission>,
}

impl ToolCatalog {
    /// The default banking catalog.
    pub fn banking() -> ToolCatalog {
        use serde_json::json;

        let entries = vec![
            ToolPermission::new(
                "get_account_balance",
                &["banking:read"],
                &["customer", "advisor", "admin"],
                json!({"verified": true, "region": ["domestic", "international"]}),
                "Get account balance for checking/savings accounts",
            ),
            ToolPermission::new(
                "get_transaction_history",
                &["banking:read"],
                &["customer", "advisor", "admin"],
                json!({"verified": true, "membership_tier": ["basic", "premium", "director"]}),
                "Get recent transaction history",
            ),
            ToolPermission::new(
                "transfer_funds",
                &["banking:write", "transfers:create"],
                &["customer", "advisor"],
                json!({"verified": true, "membership_tier": ["premium", "director"],
                       "region": ["domestic"]}),
                "Transfer funds between accounts",
            ),
            ToolPermission::new(
                "get_portfolio_balance",
                &["investments:read"],
                &["customer", "advisor", "admin"],
                json!({"verified": true, "membership_tier": ["premium", "director"]}),
                "Get investment portfolio balance and allocation",
            ),
            ToolPermission::new(
                "place_trade_order",
                &["investments:write", "trading:execute"],
                &["customer", "advisor"],
                json!({"verified": true, "membership_tier": ["director"], "region": ["domestic"]}),
                "Place buy/sell orders for securities",
            ),
            ToolPermission::new(
                "check_credit_score",
                &["credit:read"],
                &["customer", "advisor", "admin"],
                json!({"verified": true}),
                "Check current credit score and history",
            ),
            ToolPermission::new(
                "apply_for_loan",
                &["credit:apply"],
                &["customer"],
                json!({"verified": true, "region": ["domestic"]}),
                "Submit loan application",
            ),
            ToolPermission::new(
                "get_all_customer_accounts",
                &["admin:read", "customers:view"],
                &["advisor", "admin"],
                json!({"verified": true, "membership_tier": ["director"]}),
                "Get customer account information (admin only)",
            ),
            ToolPermission::new(
                "trigger_end_session",
                &[],
                &["customer", "advisor", "admin"],
                json!({}),
                "Signal that the user wants to end the banking session",
            ),
            ToolPermission::new(
                "get_user_profile",
                &["banking:read"],
                &["customer", "advisor", "admin"],
                json!({"verified": true, "membership_tier": ["premium", "director"]}),
                "Fetch basic profile information for the current user (premium/director tiers)",
            ),
            ToolPermission::new(
                "list_recipients",
                &["banking:read"],
                &["customer", "advisor", "admin"],
                json!({"verified": true}),
                "Look up recipient users by name to get their account IDs for transfers",
            ),
        ];
        ToolCatalog { entries }
    }

    /// An empty catalog (tests).
    pub fn empty() -> ToolCatalog {
        ToolCatalog { entries: vec![] }
    }

    /// Catalog with explicit entries (tests).
    pub fn with_entries(entries: Vec<ToolPermission>) -> ToolCatalog {
        ToolCatalog { entries }
    }

    pub fn entries(&self) -> &[ToolPermission] {
        &self.entries
    }

    /// Look up one entry by tool name.
    pub fn get(&self, name: &str) -> Option<&ToolPermission> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// Evaluate the catalog against a set of claims and return the permitted tool names.
pub fn resolve_permitted_tools(
    scopes: &[String],
    roles: &[String],
    attributes: &Map<String, Value>,
    catalog: &ToolCatalog,
) -> BTreeSet<String> {
    let mut permitted = BTreeSet::new();
    for entry in catalog.entries() {
        if check_access(entry, scopes, roles, attributes) {
            permitted.insert(entry.name.clone());
        }
    }
    log::debug!(
        "resolved {} permitted tools from {} scopes / {} roles",
        permitted.len(),
        scopes.len(),
        roles.len()
    );
    permitted
}

fn check_access(
    entry: &ToolPermission,
    scopes: &[String],
    roles: &[String],
    attributes: &Map<String, Value>,
) -> bool {
    if !entry.required_scopes.is_empty()
        && !entry.required_scopes.iter().any(|s| scopes.contains(s))
    {
        return false;
    }
    if !entry.required_roles.is_empty() && !entry.required_roles.iter().any(|r| roles.contains(r))
    {
        return false;
    }

    for (key, condition) in &entry.conditions {
        let user_value = attributes.get(key);
        if key == "verified" {
            let required = condition.as_bool().unwrap_or(false);
            let actual = user_value.and_then(|v| v.as_bool()).unwrap_or(false);
            if required && !actual {
                return false;
            }
        } else {
            match condition {
                Value::Array(allowed) => {
                    let matched = user_value.is_some_and(|v| allowed.contains(v));
                    if !matched {
                        return false;
                    }
                }
                other => {
                    if user_value != Some(other) {
                        return false;
                    }
                }
            }
        }
    }
    true
}
