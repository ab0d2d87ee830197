//! Router tests for strata-api

use super::*;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    middleware::from_fn,
    response::Response,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use strata_core::{
    ContextOverride, InMemoryPermissionStore, OrganizationId, Scope, SubOrganizationId, UserId,
};

use crate::middleware::identity_middleware;

async fn seeded_store() -> Arc<InMemoryPermissionStore> {
    let store = Arc::new(InMemoryPermissionStore::new());
    store.add_system_role("admin", ["system:admin"]).await;
    store
        .add_organization_role("president", ["organization:manage", "organization:view"])
        .await;
    store
        .add_sub_organization_role("chair", ["sub_organization:manage"])
        .await;
    store
        .add_sub_organization_role("delegate", ["organization:manage"])
        .await;

    let org = OrganizationId::new(7).unwrap();
    let sub = SubOrganizationId::new(3).unwrap();
    store.add_organization(org, "Test Association", "association").await;
    store
        .add_sub_organization(sub, org, "Standards Committee", "committee")
        .await
        .unwrap();

    let other_org = OrganizationId::new(9).unwrap();
    let other_sub = SubOrganizationId::new(90).unwrap();
    store.add_organization(other_org, "Other Company", "company").await;
    store
        .add_sub_organization(other_sub, other_org, "Board", "board")
        .await
        .unwrap();

    store
        .assign_system_role(UserId::new(1).unwrap(), "admin")
        .await
        .unwrap();
    store
        .assign_organization_role(UserId::new(2).unwrap(), org, "president")
        .await
        .unwrap();
    store
        .assign_sub_organization_role(UserId::new(3).unwrap(), sub, "chair")
        .await
        .unwrap();
    store
        .assign_sub_organization_role(UserId::new(4).unwrap(), other_sub, "delegate")
        .await
        .unwrap();
    store.reset_query_counts();
    store
}

async fn state_with(settings: GateSettings) -> (Arc<InMemoryPermissionStore>, AppState) {
    let store = seeded_store().await;
    let shared: SharedStore = store.clone();
    (store, AppState::new(shared, settings))
}

async fn app() -> (Arc<InMemoryPermissionStore>, Router) {
    let (store, state) = state_with(GateSettings::default()).await;
    (store, create_router(state))
}

fn get_as(uri: &str, user: Option<i64>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(user) = user {
        builder = builder.header("X-User-Id", user.to_string());
    }
    builder.body(Body::empty()).unwrap()
}

fn post_raw(uri: &str, user: Option<i64>, body: String) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(user) = user {
        builder = builder.header("X-User-Id", user.to_string());
    }
    builder.body(Body::from(body)).unwrap()
}

fn post_json(uri: &str, user: Option<i64>, body: Value) -> Request<Body> {
    post_raw(uri, user, body.to_string())
}

const CHECK: &str = "/api/v1/permissions/check";

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn ok() -> &'static str {
    "ok"
}

/// Router with guarded routes the way an embedding application would build it
fn guarded_app(state: &AppState) -> Router {
    let merged = guard_routes(
        Router::new().route("/orgs/{organization_id}/manage", get(ok)),
        state,
        PermissionGuard::merged("organization:manage", ContextOverride::new()),
    );
    let pinned = guard_routes(
        Router::new().route("/orgs/{organization_id}/pinned", get(ok)),
        state,
        PermissionGuard::merged(
            "organization:manage",
            ContextOverride::new().clear_organization(),
        ),
    );
    let organization = guard_routes(
        Router::new().route("/org-only", get(ok)),
        state,
        PermissionGuard::organization("organization:view"),
    );
    let sub_organization = guard_routes(
        Router::new().route(
            "/orgs/{organization_id}/subs/{sub_organization_id}",
            get(ok),
        ),
        state,
        PermissionGuard::sub_organization("sub_organization:manage"),
    );

    Router::new()
        .merge(merged)
        .merge(pinned)
        .merge(organization)
        .merge(sub_organization)
        .layer(from_fn(identity_middleware))
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoints() {
    let (store, app) = app().await;

    let response = app.clone().oneshot(get_as("/health/live", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("X-Request-ID"));

    let response = app.clone().oneshot(get_as("/health/ready", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get_as("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["components"][0]["name"], "permission_store");

    assert_eq!(store.total_queries(), 0);
}

// =============================================================================
// Check endpoint
// =============================================================================

#[tokio::test]
async fn test_check_grants_through_organization() {
    let (_, app) = app().await;

    let response = app
        .oneshot(post_json(
            CHECK,
            Some(1),
            json!({"user_id": 2, "permission": "organization:manage", "organization_id": 7}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["allowed"], true);
    assert_eq!(body["granted_by"], "organization");
    assert_eq!(body["context"]["organization_id"], 7);
}

#[tokio::test]
async fn test_check_accepts_camel_case_and_ignores_zero_ids() {
    let (store, app) = app().await;

    let response = app
        .oneshot(post_json(
            CHECK,
            Some(1),
            json!({
                "userId": 2,
                "permission": "organization:manage",
                "organizationId": 0,
                "subOrganizationId": -4
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["allowed"], false);
    assert!(body.get("granted_by").is_none());
    assert_eq!(body["context"], json!({}));
    assert_eq!(store.query_count(Scope::Organization), 0);
}

#[tokio::test]
async fn test_check_matches_permission_verbatim() {
    let (_, app) = app().await;

    for permission in [" system:admin\n", "system:admin ", "SYSTEM:ADMIN"] {
        let response = app
            .clone()
            .oneshot(post_json(
                CHECK,
                Some(1),
                json!({"user_id": 1, "permission": permission}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["allowed"], false, "{permission:?} must not match");
    }

    let exact = app
        .oneshot(post_json(
            CHECK,
            Some(1),
            json!({"user_id": 1, "permission": "system:admin"}),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(exact).await["allowed"], true);
}

#[tokio::test]
async fn test_check_rejects_bad_requests() {
    let (store, app) = app().await;

    let missing_user = app
        .clone()
        .oneshot(post_json(CHECK, Some(1), json!({"permission": "system:admin"})))
        .await
        .unwrap();
    assert_eq!(missing_user.status(), StatusCode::BAD_REQUEST);
    let body = body_json(missing_user).await;
    assert_eq!(body["error"]["code"], "INVALID_USER_ID");

    let empty_permission = app
        .clone()
        .oneshot(post_json(
            CHECK,
            Some(1),
            json!({"user_id": 1, "permission": "  "}),
        ))
        .await
        .unwrap();
    assert_eq!(empty_permission.status(), StatusCode::BAD_REQUEST);
    let body = body_json(empty_permission).await;
    assert_eq!(body["error"]["code"], "INVALID_PERMISSION");

    let malformed = [
        json!({"user_id": 1}).to_string(),
        json!({"user_id": "abc", "permission": "system:admin"}).to_string(),
        "{not json".to_string(),
    ];
    for body in malformed {
        let response = app
            .clone()
            .oneshot(post_raw(CHECK, Some(1), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "INVALID_REQUEST");
    }

    // only the guard's own system lookups ran
    assert_eq!(store.query_count(Scope::Organization), 0);
    assert_eq!(store.query_count(Scope::SubOrganization), 0);
}

#[tokio::test]
async fn test_check_requires_diagnostics_permission() {
    let (store, app) = app().await;
    let body = json!({"user_id": 1, "permission": "system:admin"});

    let anonymous = app
        .clone()
        .oneshot(post_json(CHECK, None, body.clone()))
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(store.total_queries(), 0);

    let president = app
        .oneshot(post_json(CHECK, Some(2), body))
        .await
        .unwrap();
    assert_eq!(president.status(), StatusCode::FORBIDDEN);
    let body = body_json(president).await;
    assert_eq!(body["error"], "insufficient_permissions");
    assert!(body.get("allowed").is_none());
}

#[tokio::test]
async fn test_check_surfaces_store_failure() {
    let (store, app) = app().await;
    store.set_failing(Scope::Organization, true);

    let response = app
        .oneshot(post_json(
            CHECK,
            Some(1),
            json!({"user_id": 2, "permission": "organization:manage", "organization_id": 7}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "STORE_FAILURE");
}

// =============================================================================
// Diagnostics
// =============================================================================

#[tokio::test]
async fn test_me_requires_identity() {
    let (_, app) = app().await;

    let response = app
        .clone()
        .oneshot(get_as("/api/v1/me/permissions", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "unauthenticated");
    assert!(body["request_id"].is_string());

    let response = app
        .oneshot(get_as("/api/v1/me/permissions", Some(2)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["user_id"], 2);
    assert_eq!(body["data"]["organizations"][0]["organization_id"], 7);
}

#[tokio::test]
async fn test_malformed_identity_is_unauthenticated() {
    let (_, app) = app().await;

    let request = Request::get("/api/v1/me/permissions")
        .header("X-User-Id", "0")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_diagnostics_need_configured_permission() {
    let (store, app) = app().await;

    let anonymous = app
        .clone()
        .oneshot(get_as("/api/v1/users/2/permissions", None))
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(store.total_queries(), 0);

    let president = app
        .clone()
        .oneshot(get_as("/api/v1/users/2/permissions", Some(2)))
        .await
        .unwrap();
    assert_eq!(president.status(), StatusCode::FORBIDDEN);
    let body = body_json(president).await;
    assert_eq!(body["error"], "insufficient_permissions");

    let admin = app
        .oneshot(get_as("/api/v1/users/2/permissions", Some(1)))
        .await
        .unwrap();
    assert_eq!(admin.status(), StatusCode::OK);
    let body = body_json(admin).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["organizations"][0]["organization_name"], "Test Association");
}

#[tokio::test]
async fn test_scoped_diagnostics() {
    let (_, app) = app().await;

    let response = app
        .clone()
        .oneshot(get_as("/api/v1/users/1/permissions/system", Some(1)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["scope"], "system");
    assert_eq!(body["permissions"], json!(["system:admin"]));

    let response = app
        .clone()
        .oneshot(get_as("/api/v1/users/2/organizations/7/permissions", Some(1)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["scope"], "organization");
    assert_eq!(body["scope_id"], 7);
    assert_eq!(
        body["permissions"],
        json!(["organization:manage", "organization:view"])
    );

    let response = app
        .clone()
        .oneshot(get_as("/api/v1/users/3/sub-organizations/3/permissions", Some(1)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["scope"], "sub_organization");
    assert_eq!(body["permissions"], json!(["sub_organization:manage"]));

    let response = app
        .oneshot(get_as("/api/v1/users/abc/permissions/system", Some(1)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_diagnostics_permission_is_configurable() {
    let (_, state) = state_with(GateSettings {
        diagnostics_permission: "organization:view".to_string(),
        ..GateSettings::default()
    })
    .await;
    let app = create_router(state);

    // organization roles never satisfy a system-scoped guard
    let response = app
        .oneshot(get_as("/api/v1/users/2/permissions", Some(2)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// =============================================================================
// Guards
// =============================================================================

#[tokio::test]
async fn test_merged_guard_reads_route_parameters() {
    let (_, state) = state_with(GateSettings::default()).await;
    let app = guarded_app(&state);

    let granted = app
        .clone()
        .oneshot(get_as("/orgs/7/manage", Some(2)))
        .await
        .unwrap();
    assert_eq!(granted.status(), StatusCode::OK);

    let other = app
        .clone()
        .oneshot(get_as("/orgs/8/manage", Some(2)))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::FORBIDDEN);

    let anonymous = app.oneshot(get_as("/orgs/7/manage", None)).await.unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_override_clears_route_organization() {
    let (store, state) = state_with(GateSettings::default()).await;
    let app = guarded_app(&state);

    let response = app
        .oneshot(get_as("/orgs/7/pinned", Some(2)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(store.query_count(Scope::Organization), 0);
}

#[tokio::test]
async fn test_guards_ignore_query_string() {
    let (store, state) = state_with(GateSettings::default()).await;
    let app = guarded_app(&state);

    let missing = app
        .clone()
        .oneshot(get_as("/org-only?organizationId=7", Some(2)))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    let body = body_json(missing).await;
    assert_eq!(body["error"], "invalid_organization");

    // user 4 holds organization:manage only through sub-organization 90 of org 9
    let plain = app
        .clone()
        .oneshot(get_as("/orgs/7/manage", Some(4)))
        .await
        .unwrap();
    assert_eq!(plain.status(), StatusCode::FORBIDDEN);

    let injected = app
        .clone()
        .oneshot(get_as("/orgs/7/manage?subOrganizationId=90", Some(4)))
        .await
        .unwrap();
    assert_eq!(injected.status(), StatusCode::FORBIDDEN);
    assert_eq!(store.query_count(Scope::SubOrganization), 0);

    let retargeted = app
        .oneshot(get_as("/orgs/8/manage?organizationId=7", Some(2)))
        .await
        .unwrap();
    assert_eq!(retargeted.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_sub_organization_guard() {
    let (_, state) = state_with(GateSettings::default()).await;
    let app = guarded_app(&state);

    let granted = app
        .clone()
        .oneshot(get_as("/orgs/7/subs/3", Some(3)))
        .await
        .unwrap();
    assert_eq!(granted.status(), StatusCode::OK);

    let invalid = app
        .oneshot(get_as("/orgs/0/subs/3", Some(3)))
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_guard_redirects_when_login_configured() {
    let (_, state) = state_with(GateSettings {
        login_redirect: Some("/login".to_string()),
        ..GateSettings::default()
    })
    .await;
    let app = guarded_app(&state);

    let anonymous = app
        .clone()
        .oneshot(get_as("/orgs/7/manage", None))
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::FOUND);
    assert_eq!(anonymous.headers()[header::LOCATION], "/login");

    let forbidden = app
        .oneshot(get_as("/orgs/8/manage", Some(2)))
        .await
        .unwrap();
    assert_eq!(forbidden.status(), StatusCode::FOUND);
    assert_eq!(
        forbidden.headers()[header::LOCATION],
        "/login?error=insufficient_permissions"
    );
}

#[tokio::test]
async fn test_guard_maps_store_failure_to_500() {
    let (store, state) = state_with(GateSettings::default()).await;
    store.set_failing(Scope::Organization, true);
    let app = guarded_app(&state);

    let response = app
        .oneshot(get_as("/orgs/7/manage", Some(2)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
