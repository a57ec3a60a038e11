//! Tool descriptors surfaced to the model.
//!
//! Each descriptor pairs a catalog tool with the JSON-Schema parameter block the vendors
//! receive.  Descriptors exist for every catalog entry plus the retrieval-context tool;
//! a permitted tool without a descriptor is never offered to the model.

use serde_json::json;

use crate::ledgerllm::provider::ToolDefinition;

/// Build the wire descriptor for a tool name.
pub fn descriptor_for(name: &str) -> Option<ToolDefinition> {
    let (description, parameters) = match name {
        "get_account_balance" => (
            "Check the current balance of a user's account",
            json!({
                "type": "object",
                "properties": {
                    "account_type": {
                        "type": "string",
                        "enum": ["checking", "savings", "credit"],
                        "description": "The type of account to check"
                    }
                },
                "required": ["account_type"]
            }),
        ),
        "get_transaction_history" => (
            "Get recent transaction history for an account",
            json!({
                "type": "object",
                "properties": {
                    "account_type": {
                        "type": "string",
                        "enum": ["checking", "savings", "credit"],
                        "description": "The type of account"
                    },
                    "days": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": 90,
                        "description": "Number of days of history to retrieve"
                    },
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": 100,
                        "description": "Maximum number of transactions to return (default 5)"
                    }
                },
                "required": ["account_type"]
            }),
        ),
        "transfer_funds" => (
            "Transfer funds between your accounts or to another user's account ID \
             (obtain via list_recipients). Use the recipient's account_type if specified \
             to select the correct destination.",
            json!({
                "type": "object",
                "properties": {
                    "from_account": {
                        "type": "string",
                        "enum": ["checking", "savings"],
                        "description": "Source account type (checking or savings)"
                    },
                    "to_account_id": {
                        "type": "string",
                        "description": "Destination ACCOUNT ID (UUID) – call list_recipients first to obtain it"
                    },
                    "amount": {
                        "type": "number",
                        "minimum": 0.01,
                        "description": "Amount to transfer"
                    }
                },
                "required": ["from_account", "to_account_id", "amount"]
            }),
        ),
        "list_recipients" => (
            "Search recipient users by name. If account_type is provided, returns \
             recipients with an account ID of that type; otherwise returns the first \
             account ID.",
            json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "Partial or full name of the recipient (min 3 characters)"
                    },
                    "account_type": {
                        "type": "string",
                        "enum": ["checking", "savings"],
                        "description": "Optional desired recipient account type. If omitted, the first account will be selected."
                    }
                },
                "required": ["name"]
            }),
        ),
        "get_portfolio_balance" => (
            "Get investment portfolio balance and allocation",
            json!({
                "type": "object",
                "properties": {
                    "portfolio_type": {
                        "type": "string",
                        "enum": ["stocks", "bonds", "etfs", "all"],
                        "description": "Type of portfolio to check"
                    }
                },
                "required": ["portfolio_type"]
            }),
        ),
        "place_trade_order" => (
            "Place buy/sell orders for securities",
            json!({
                "type": "object",
                "properties": {
                    "symbol": {
                        "type": "string",
                        "description": "Stock symbol (e.g., AAPL, GOOGL)"
                    },
                    "order_type": {
                        "type": "string",
                        "enum": ["buy", "sell"],
                        "description": "Order type"
                    },
                    "quantity": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Number of shares"
                    },
                    "order_method": {
                        "type": "string",
                        "enum": ["market", "limit"],
                        "description": "Market or limit order"
                    },
                    "limit_price": {
                        "type": "number",
                        "minimum": 0.01,
                        "description": "Limit price (required for limit orders)"
                    }
                },
                "required": ["symbol", "order_type", "quantity", "order_method"]
            }),
        ),
        "check_credit_score" => (
            "Check current credit score and credit report summary",
            json!({"type": "object", "properties": {}, "required": []}),
        ),
        "apply_for_loan" => (
            "Submit loan application",
            json!({
                "type": "object",
                "properties": {
                    "loan_type": {
                        "type": "string",
                        "enum": ["personal", "auto", "home", "business"],
                        "description": "Type of loan to apply for"
                    },
                    "amount": {
                        "type": "number",
                        "minimum": 1000,
                        "description": "Loan amount requested"
                    },
                    "term_months": {
                        "type": "integer",
                        "minimum": 12,
                        "maximum": 360,
                        "description": "Loan term in months"
                    }
                },
                "required": ["loan_type", "amount", "term_months"]
            }),
        ),
        "get_all_customer_accounts" => (
            "Get customer account information (admin only)",
            json!({
                "type": "object",
                "properties": {
                    "customer_id": {
                        "type": "string",
                        "description": "Customer ID to lookup"
                    },
                    "account_type": {
                        "type": "string",
                        "enum": ["all", "checking", "savings", "credit", "investment"],
                        "description": "Filter by account type"
                    }
                },
                "required": ["customer_id"]
            }),
        ),
        "trigger_end_session" => (
            "Signal that the user wants to end the banking session (shows end session option to user)",
            json!({
                "type": "object",
                "properties": {
                    "reason": {
                        "type": "string",
                        "description": "Optional reason for ending the session",
                        "default": "User requested to end session"
                    }
                },
                "required": []
            }),
        ),
        "get_user_profile" => (
            "Fetch basic profile information for the current authenticated user. \
             Returns name, tier, region, and list of accounts.",
            json!({"type": "object", "properties": {}, "required": []}),
        ),
        "get_rag_context" => (
            "Retrieve concise knowledge-base context for the user's question.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The user's latest question to retrieve KB context for"
                    }
                },
                "required": ["query"]
            }),
        ),
        _ => return None,
    };

    Some(ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        parameters,
    })
}
