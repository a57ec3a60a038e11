use serde_json::{json, Map, Value};

use ledgerllm::auth::{resolve_permitted_tools, ToolCatalog};

fn attrs(verified: bool, tier: &str, region: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("verified".to_string(), json!(verified));
    map.insert("membership_tier".to_string(), json!(tier));
    map.insert("region".to_string(), json!(region));
    map
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn resolver_is_deterministic() {
    let catalog = ToolCatalog::banking();
    let scopes = strings(&["banking:read", "banking:write", "transfers:create"]);
    let roles = strings(&["customer"]);
    let attributes = attrs(true, "premium", "domestic");

    let first = resolve_permitted_tools(&scopes, &roles, &attributes, &catalog);
    for _ in 0..10 {
        let again = resolve_permitted_tools(&scopes, &roles, &attributes, &catalog);
        assert_eq!(first, again);
    }
}

#[test]
fn scope_gate_excludes_disjoint_scopes() {
    let catalog = ToolCatalog::banking();
    // No banking:write / transfers:create -> transfer_funds must never resolve.
    let permitted = resolve_permitted_tools(
        &strings(&["banking:read"]),
        &strings(&["customer"]),
        &attrs(true, "premium", "domestic"),
        &catalog,
    );
    assert!(!permitted.contains("transfer_funds"));
    assert!(permitted.contains("get_account_balance"));
    assert!(permitted.contains("list_recipients"));
}

#[test]
fn role_gate_excludes_disjoint_roles() {
    let catalog = ToolCatalog::banking();
    let permitted = resolve_permitted_tools(
        &strings(&["banking:read", "banking:write", "transfers:create"]),
        &strings(&["auditor"]),
        &attrs(true, "premium", "domestic"),
        &catalog,
    );
    assert!(permitted.is_empty());
}

#[test]
fn verified_condition_is_required() {
    let catalog = ToolCatalog::banking();
    let permitted = resolve_permitted_tools(
        &strings(&["banking:read"]),
        &strings(&["customer"]),
        &attrs(false, "premium", "domestic"),
        &catalog,
    );
    assert!(!permitted.contains("get_account_balance"));
    // trigger_end_session has no conditions and no scope requirement.
    assert!(permitted.contains("trigger_end_session"));
}

#[test]
fn tier_membership_gates_transfers() {
    let catalog = ToolCatalog::banking();
    let scopes = strings(&["banking:read", "banking:write", "transfers:create"]);
    let roles = strings(&["customer"]);

    let basic = resolve_permitted_tools(&scopes, &roles, &attrs(true, "basic", "domestic"), &catalog);
    assert!(!basic.contains("transfer_funds"));

    let premium =
        resolve_permitted_tools(&scopes, &roles, &attrs(true, "premium", "domestic"), &catalog);
    assert!(premium.contains("transfer_funds"));
}

#[test]
fn region_membership_gates_transfers() {
    let catalog = ToolCatalog::banking();
    let scopes = strings(&["banking:read", "banking:write", "transfers:create"]);
    let roles = strings(&["customer"]);

    let international = resolve_permitted_tools(
        &scopes,
        &roles,
        &attrs(true, "premium", "international"),
        &catalog,
    );
    assert!(!international.contains("transfer_funds"));
    // Balance lookups allow both regions.
    assert!(international.contains("get_account_balance"));
}

#[test]
fn director_tier_unlocks_trading() {
    let catalog = ToolCatalog::banking();
    let scopes = strings(&[
        "banking:read",
        "investments:read",
        "investments:write",
        "trading:execute",
    ]);
    let roles = strings(&["customer"]);

    let premium =
        resolve_permitted_tools(&scopes, &roles, &attrs(true, "premium", "domestic"), &catalog);
    assert!(!premium.contains("place_trade_order"));
    assert!(premium.contains("get_portfolio_balance"));

    let director =
        resolve_permitted_tools(&scopes, &roles, &attrs(true, "director", "domestic"), &catalog);
    assert!(director.contains("place_trade_order"));
}

#[test]
fn empty_claims_resolve_to_session_control_only() {
    let catalog = ToolCatalog::banking();
    let permitted = resolve_permitted_tools(&[], &strings(&["customer"]), &Map::new(), &catalog);
    // Everything else requires scopes or verification.
    assert_eq!(
        permitted.into_iter().collect::<Vec<_>>(),
        vec!["trigger_end_session".to_string()]
    );
}
