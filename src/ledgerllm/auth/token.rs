//! Bearer credential validation.
//!
//! Credentials are HS256-signed JWTs carrying OAuth-ish claims.  Validation checks the
//! signature, expiry (zero leeway), and — when configured — the audience.  A credential
//! may embed a pre-computed permitted-tool list under `fxn`; when present it is trusted
//! as issued and the ABAC resolver is skipped.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::ledgerllm::auth::permissions::{resolve_permitted_tools, ToolCatalog};
use crate::ledgerllm::auth::Principal;

/// Credential validation failures.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("authentication system error: {0}")]
    System(String),
}

/// Claims carried by a gateway credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    /// Space-separated OAuth scopes.
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub aud: Option<Value>,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Membership tier; issuers write either `tier` or `membership_tier`.
    #[serde(default, alias = "membership_tier")]
    pub tier: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub verified: bool,
    /// Pre-computed permitted-tool list; overrides resolver output when present.
    #[serde(default)]
    pub fxn: Option<Vec<String>>,
}

impl Claims {
    /// Fold the flat tier/region/verified claims into the ABAC attribute map.
    pub fn merged_attributes(&self) -> Map<String, Value> {
        let mut attributes = self.attributes.clone();
        attributes.insert("verified".to_string(), Value::Bool(self.verified));
        if let Some(tier) = &self.tier {
            attributes.insert("membership_tier".to_string(), Value::String(tier.clone()));
        }
        if let Some(region) = &self.region {
            attributes.insert("region".to_string(), Value::String(region.clone()));
        }
        attributes
    }
}

/// Validates bearer credentials and produces [`Principal`]s.
pub struct TokenValidator {
    decoding_key: DecodingKey,
    validation: Validation,
    catalog: Arc<ToolCatalog>,
}

impl TokenValidator {
    pub fn new(secret: &str, audience: Option<&str>, catalog: Arc<ToolCatalog>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        TokenValidator {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            catalog,
        }
    }

    /// Validate a bearer credential and build the request principal.
    pub fn validate(&self, bearer: &str) -> Result<Principal, AuthError> {
        let data = decode::<Claims>(bearer, &self.decoding_key, &self.validation).map_err(
            |err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                jsonwebtoken::errors::ErrorKind::Crypto(_) => AuthError::System(err.to_string()),
                _ => AuthError::Invalid(err.to_string()),
            },
        )?;
        let claims = data.claims;

        let scopes: Vec<String> = claims
            .scope
            .split_whitespace()
            .map(|s| s.to_string())
            .collect();
        let attributes = claims.merged_attributes();

        let permitted_tools = match &claims.fxn {
            Some(tools) => {
                log::info!(
                    "permissions sourced from credential claim: user={} tools={}",
                    claims.sub,
                    tools.len()
                );
                tools.clone()
            }
            None => {
                let resolved =
                    resolve_permitted_tools(&scopes, &claims.roles, &attributes, &self.catalog);
                resolved.into_iter().collect()
            }
        };

        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AuthError::Invalid("exp out of range".to_string()))?;

        log::debug!(
            "authenticated user={} scopes={} permitted_tools={}",
            claims.sub,
            scopes.len(),
            permitted_tools.len()
        );

        Ok(Principal {
            user_id: claims.sub,
            scopes,
            roles: claims.roles,
            attributes,
            expires_at,
            permitted_tools,
        })
    }
}
