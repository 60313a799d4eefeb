//! Integration tests for common Tenantry workflows.
//!
//! These tests drive the scoping engine and the request gate together over
//! the in-memory store.

use serde_json::{Value, json};
use std::sync::Arc;
use tenantry::*;

// =============================================================================
// Fixtures
// =============================================================================

/// client <- membership -> user, plus a license proxy shared by clients
fn schema() -> Schema {
    Schema::new()
        .with_entity(
            EntityMeta::new("client")
                .with_association(Association::belongs_to("license", "license", "license_id")),
        )
        .with_entity(EntityMeta::new("license").with_association(
            Association::has_many("clients", "client", "license_id").with_inverse("license"),
        ))
        .with_entity(
            EntityMeta::new("membership")
                .with_association(Association::belongs_to("client", "client", "client_id"))
                .with_association(Association::belongs_to("user", "user", "user_id")),
        )
        .with_entity(EntityMeta::new("user").with_association(Association::has_many(
            "memberships",
            "membership",
            "user_id",
        )))
        .with_entity(
            EntityMeta::new("seat")
                .with_association(Association::belongs_to("license", "license", "license_id")),
        )
}

struct World {
    tenancy: Tenancy,
    store: Arc<InMemoryTenantStore>,
}

fn world(mode: CardinalityMode) -> World {
    let registry = TenancyRegistry::builder(schema())
        .tenant(TenantType::new("client").with_identifier_field("slug").with_mode(mode))
        .and_then(|b| b.bind_proxy("license", "clients"))
        .and_then(|b| b.bind("membership", "client"))
        .and_then(|b| b.bind_through("user", "memberships"))
        .and_then(|b| b.bind("seat", "license"))
        .unwrap()
        .build();

    let store = Arc::new(InMemoryTenantStore::new());
    store.insert(Record::new("license").with("id", 500));
    store.insert(Record::new("client").with("id", 1).with("slug", "acme").with("license_id", 500));
    store.insert(Record::new("client").with("id", 2).with("slug", "globex").with("license_id", 500));
    store.insert(Record::new("client").with("id", 3).with("slug", "initech"));

    for (user, clients) in [(10, vec![1, 1, 2]), (11, vec![2]), (12, vec![3]), (13, vec![])] {
        store.insert(Record::new("user").with("id", user));
        for client in clients {
            store.insert(
                Record::new("membership")
                    .with("user_id", user)
                    .with("client_id", client),
            );
        }
    }

    store.insert(Record::new("seat").with("id", 900).with("license_id", 500));
    store.insert(Record::new("seat").with("id", 901).with("license_id", 501));

    World {
        tenancy: Tenancy::new(registry, store.clone()),
        store,
    }
}

fn ids(rows: &[Entity]) -> Vec<i64> {
    rows.iter()
        .filter_map(|row| row.get("id").and_then(Value::as_i64))
        .collect()
}

async fn visible(world: &World, entity: &str) -> Vec<Entity> {
    world
        .tenancy
        .scoped_query(entity, world.store.query(entity))
        .await
        .unwrap()
        .fetch()
}

// =============================================================================
// Ownership Tests
// =============================================================================

#[tokio::test]
async fn test_owned_reads_match_current_tenant() {
    let world = world(CardinalityMode::Single);
    let clients = world.tenancy.scope("client").unwrap();

    let all = visible(&world, "membership").await;
    assert_eq!(all.len(), 5);

    for (slug, id) in [("acme", 1), ("globex", 2), ("initech", 3)] {
        let rows = clients
            .with_current(slug, visible(&world, "membership"))
            .await
            .unwrap();
        assert!(!rows.is_empty());
        assert!(rows.iter().all(|r| r.get("client_id") == Some(&json!(id))));
        let expected = all.iter().filter(|r| r.get("client_id") == Some(&json!(id))).count();
        assert_eq!(rows.len(), expected);
    }
}

#[tokio::test]
async fn test_multiple_current_reads_union() {
    let world = world(CardinalityMode::Multiple);
    let clients = world.tenancy.scope("client").unwrap();

    let rows = clients
        .with_current(vec!["acme", "globex"], visible(&world, "membership"))
        .await
        .unwrap();

    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|r| r.get("client_id") != Some(&json!(3))));
}

#[tokio::test]
async fn test_through_binding_has_no_duplicates() {
    let world = world(CardinalityMode::Single);
    let clients = world.tenancy.scope("client").unwrap();

    // User 10 has two memberships under acme
    let users = clients
        .with_current("acme", visible(&world, "user"))
        .await
        .unwrap();
    assert_eq!(ids(&users), vec![10]);

    let users = clients
        .with_current("globex", visible(&world, "user"))
        .await
        .unwrap();
    assert_eq!(ids(&users), vec![10, 11]);

    // No tenant: every user, including those without memberships
    assert_eq!(ids(&visible(&world, "user").await), vec![10, 11, 12, 13]);
}

#[tokio::test]
async fn test_single_current_keeps_only_latest() {
    let world = world(CardinalityMode::Single);
    let clients = world.tenancy.scope("client").unwrap();

    TenantContext::isolated(async {
        clients.set_current("acme").await.unwrap();
        clients.set_current("globex").await.unwrap();

        let current = clients.current_all();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].get("slug"), Some(&json!("globex")));
    })
    .await;
}

#[tokio::test]
async fn test_writes_are_stamped_and_checked() {
    let world = world(CardinalityMode::Single);
    let clients = world.tenancy.scope("client").unwrap();

    clients
        .with_current("initech", async {
            let mut membership = Record::new("membership").with("user_id", 13);
            let errors = world.tenancy.prepare_write(&mut membership).await.unwrap();
            assert!(errors.is_empty());
            assert_eq!(membership.get("client_id"), Some(&json!(3)));

            let mut stray = Record::new("membership").with("user_id", 13).with("client_id", 1);
            let errors = world.tenancy.prepare_write(&mut stray).await.unwrap();
            let error = errors.for_field("client_id").next().unwrap();
            assert_eq!(error.constraint, "tenant_consistency");
            assert!(errors.into_result().is_err());
        })
        .await
        .unwrap();
}

// =============================================================================
// Proxy Tests
// =============================================================================

#[tokio::test]
async fn test_proxy_follows_inverse_association() {
    let world = world(CardinalityMode::Single);
    let clients = world.tenancy.scope("client").unwrap();
    let license = world.store.rows("license")[0].clone();

    let (proxy, seats) = clients
        .with_current("globex", async {
            (
                world.tenancy.current_proxy("license").await.unwrap(),
                visible(&world, "seat").await,
            )
        })
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&proxy.unwrap(), &license));
    assert_eq!(ids(&seats), vec![900]);
}

#[tokio::test]
async fn test_missing_proxy_is_an_integrity_failure() {
    let world = world(CardinalityMode::Single);
    let clients = world.tenancy.scope("client").unwrap();

    assert!(world.tenancy.current_proxy("license").await.unwrap().is_none());

    let err = clients
        .with_current("initech", world.tenancy.current_proxy("license"))
        .await
        .unwrap()
        .unwrap_err();
    assert!(err.is_integrity());
    assert!(matches!(err, TenancyError::MissingProxy { ref tenant, .. } if tenant == "client"));
}

// =============================================================================
// Batch Tests
// =============================================================================

#[tokio::test]
async fn test_each_tenant_visits_every_client() {
    let world = world(CardinalityMode::Single);
    let clients = world.tenancy.scope("client").unwrap();

    let counts = clients
        .each_tenant(|client| {
            let world = &world;
            async move {
                let rows = visible(world, "membership").await;
                Ok::<_, TenancyError>((client.get("slug").cloned(), rows.len()))
            }
        })
        .await
        .unwrap();

    assert_eq!(
        counts,
        vec![
            (Some(json!("acme")), 2),
            (Some(json!("globex")), 2),
            (Some(json!("initech")), 1),
        ]
    );
}

// =============================================================================
// Request Gate Tests
// =============================================================================

fn gate(world: &World) -> RequestGate {
    RequestGate::builder(world.tenancy.clone())
        .tenant_type("client")
        .extractor(IdentifierExtractor::header("X-Tenant"))
        .allow("svc", PathMatcher::exact("/health"), MethodSet::any())
        .build()
        .unwrap()
}

fn current_slugs() -> Vec<String> {
    TenantContext::get("tenantry.current.client")
        .iter()
        .filter_map(|t| t.get("slug").and_then(Value::as_str).map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_gate_sets_and_clears_context() {
    let world = world(CardinalityMode::Single);
    let gate = gate(&world);

    let request = RequestInfo::new("GET", "/x").with_header("X-Tenant", "acme");
    let response = gate
        .handle(request, |_req| async {
            assert_eq!(current_slugs(), vec!["acme"]);
            Ok::<_, GateError>(GateResponse::ok())
        })
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert!(current_slugs().is_empty());
}

#[tokio::test]
async fn test_gate_rejects_unknown_identifier() {
    let world = world(CardinalityMode::Single);
    let gate = gate(&world);
    let mut called = false;

    let request = RequestInfo::new("GET", "/x").with_header("X-Tenant", "ghost");
    let response = gate
        .handle(request, |_req| {
            called = true;
            async { Ok::<_, GateError>(GateResponse::ok()) }
        })
        .await
        .unwrap();

    assert!(!called);
    assert_eq!(response.status, 404);
    let body: Value = response.json().unwrap();
    assert_eq!(body["identifiers"], json!(["ghost"]));
}

#[tokio::test]
async fn test_gate_bypass_for_global_identifier() {
    let world = world(CardinalityMode::Single);
    let gate = gate(&world);

    for method in ["GET", "PUT"] {
        let request = RequestInfo::new(method, "/health").with_header("X-Tenant", "svc");
        let response = gate
            .handle(request, |_req| async {
                assert!(current_slugs().is_empty());
                let filter = world.tenancy.filter_for("membership").await?;
                assert!(filter.is_unrestricted());
                Ok::<_, GateError>(GateResponse::ok())
            })
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }
}

#[tokio::test]
async fn test_gate_downstream_sees_scoped_reads() {
    let world = world(CardinalityMode::Multiple);
    let gate = RequestGate::builder(world.tenancy.clone())
        .with_config(
            &GateConfig::from_toml_str(
                r#"
                tenant_type = "client"

                [identifier]
                header_list = "X-Tenants"
                "#,
            )
            .unwrap(),
        )
        .unwrap()
        .build()
        .unwrap();

    let request = RequestInfo::new("GET", "/users").with_header("X-Tenants", "acme,initech");
    let response = gate
        .handle(request, |_req| async {
            let users = visible(&world, "user").await;
            GateResponse::ok()
                .with_json(&json!({ "users": ids(&users) }))
                .map_err(|e| GateError::downstream(e.to_string()))
        })
        .await
        .unwrap();

    let body: Value = response.json().unwrap();
    assert_eq!(body["users"], json!([10, 12]));
}

#[tokio::test]
async fn test_concurrent_requests_are_isolated() {
    let world = world(CardinalityMode::Single);
    let gate = Arc::new(gate(&world));

    let mut handles = Vec::new();
    for slug in ["acme", "globex", "initech", "acme", "globex", "initech"] {
        let gate = Arc::clone(&gate);
        handles.push(tokio::spawn(async move {
            let request = RequestInfo::new("GET", "/x").with_header("X-Tenant", slug);
            gate.handle(request, move |_req| async move {
                for _ in 0..5 {
                    tokio::task::yield_now().await;
                    assert_eq!(current_slugs(), vec![slug]);
                }
                Ok::<_, GateError>(GateResponse::ok())
            })
            .await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().status, 200);
    }
}
