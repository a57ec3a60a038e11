use std::sync::Arc;

use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;

use ledgerllm::auth::{AuthError, Claims, TokenValidator, ToolCatalog};

const SECRET: &str = "test-secret";

fn claims(exp_offset_secs: i64) -> Claims {
    let now = chrono::Utc::now().timestamp();
    Claims {
        sub: "user-42".to_string(),
        exp: now + exp_offset_secs,
        iat: Some(now),
        scope: "banking:read banking:write transfers:create".to_string(),
        aud: None,
        iss: Some("test-issuer".to_string()),
        roles: vec!["customer".to_string()],
        attributes: serde_json::Map::new(),
        tier: Some("premium".to_string()),
        region: Some("domestic".to_string()),
        verified: true,
        fxn: None,
    }
}

fn sign(claims: &Claims) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn validator() -> TokenValidator {
    TokenValidator::new(SECRET, None, Arc::new(ToolCatalog::banking()))
}

#[test]
fn valid_token_yields_principal_with_resolved_tools() {
    let token = sign(&claims(3600));
    let principal = validator().validate(&token).unwrap();

    assert_eq!(principal.user_id, "user-42");
    assert!(principal.scopes.contains(&"banking:read".to_string()));
    assert_eq!(principal.attributes.get("verified"), Some(&json!(true)));
    assert_eq!(
        principal.attributes.get("membership_tier"),
        Some(&json!("premium"))
    );
    // ABAC resolution ran: premium + domestic + transfer scopes permit transfers.
    assert!(principal.may_call("transfer_funds"));
    assert!(principal.may_call("get_account_balance"));
    assert!(!principal.may_call("place_trade_order"));
}

#[test]
fn expired_token_is_rejected_as_expired() {
    let token = sign(&claims(-120));
    match validator().validate(&token) {
        Err(AuthError::Expired) => {}
        other => panic!("expected Expired, got {:?}", other.map(|p| p.user_id)),
    }
}

#[test]
fn garbage_token_is_invalid() {
    match validator().validate("not-a-jwt") {
        Err(AuthError::Invalid(_)) => {}
        other => panic!("expected Invalid, got {:?}", other.map(|p| p.user_id)),
    }
}

#[test]
fn wrong_signature_is_invalid() {
    let token = encode(
        &Header::default(),
        &claims(3600),
        &EncodingKey::from_secret(b"some-other-secret"),
    )
    .unwrap();
    assert!(matches!(
        validator().validate(&token),
        Err(AuthError::Invalid(_))
    ));
}

#[test]
fn audience_mismatch_is_invalid() {
    let mut c = claims(3600);
    c.aud = Some(json!("other-service"));
    let token = sign(&c);

    let validator = TokenValidator::new(SECRET, Some("ledgerllm"), Arc::new(ToolCatalog::banking()));
    assert!(matches!(validator.validate(&token), Err(AuthError::Invalid(_))));

    let mut ok = claims(3600);
    ok.aud = Some(json!("ledgerllm"));
    let token = sign(&ok);
    assert!(validator.validate(&token).is_ok());
}

#[test]
fn fxn_claim_overrides_resolver() {
    let mut c = claims(3600);
    // Claims that would resolve to a rich tool set, but the issuer pinned one tool.
    c.fxn = Some(vec!["get_account_balance".to_string()]);
    let token = sign(&c);

    let principal = validator().validate(&token).unwrap();
    assert_eq!(
        principal.permitted_tools,
        vec!["get_account_balance".to_string()]
    );
    assert!(!principal.may_call("transfer_funds"));
}

#[test]
fn membership_tier_alias_is_accepted() {
    // Issuers writing `membership_tier` instead of `tier` still populate the attribute.
    let token_body = json!({
        "sub": "user-7",
        "exp": chrono::Utc::now().timestamp() + 600,
        "scope": "banking:read",
        "roles": ["customer"],
        "membership_tier": "basic",
        "verified": true,
    });
    let token = encode(
        &Header::default(),
        &token_body,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();

    let principal = validator().validate(&token).unwrap();
    assert_eq!(
        principal.attributes.get("membership_tier"),
        Some(&json!("basic"))
    );
}
