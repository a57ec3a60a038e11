//! Authentication and authorization.
//!
//! [`token`] validates bearer credentials into a [`Principal`]; [`permissions`] holds the
//! banking tool catalog and the ABAC resolver that derives the principal's permitted tool
//! set from scopes, roles, and attributes.

pub mod permissions;
pub mod token;

pub use permissions::{resolve_permitted_tools, ToolCatalog, ToolPermission};
pub use token::{AuthError, Claims, TokenValidator};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// The authenticated identity a request is processed on behalf of.
///
/// Built once per request from a validated credential and immutable afterwards.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
    pub scopes: Vec<String>,
    pub roles: Vec<String>,
    /// ABAC attributes: `verified`, `membership_tier`, `region`, plus anything the issuer
    /// embedded under `attributes`.
    pub attributes: Map<String, Value>,
    pub expires_at: DateTime<Utc>,
    /// Tool names this principal may invoke, either from the credential's `fxn` claim or
    /// resolved from the catalog.
    pub permitted_tools: Vec<String>,
}

impl Principal {
    /// Fetch a string attribute.
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }

    /// The identifier backend services know this user by.
    ///
    /// Issuers may embed a dedicated `finance_user_id` attribute; the subject id is the
    /// fallback.
    pub fn finance_user_id(&self) -> &str {
        self.attr_str("finance_user_id")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.user_id)
    }

    /// True when the principal may invoke `tool`.
    pub fn may_call(&self, tool: &str) -> bool {
        self.permitted_tools.iter().any(|t| t == tool)
    }
}
