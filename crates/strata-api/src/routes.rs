//! API route definitions

use std::sync::Arc;

use axum::{
    extract::Request,
    middleware::{from_fn, Next},
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::middleware::{
    identity_middleware, logging_middleware, permission_middleware, request_id_middleware,
    require_identity, PermissionGuard,
};
use crate::state::AppState;

/// Create the full API router with application state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/health/live", get(handlers::liveness))
        .route("/health/ready", get(handlers::readiness))
        .nest("/api/v1", api_v1_routes(&state))
        .with_state(state)
        .layer(from_fn(identity_middleware))
        .layer(from_fn(logging_middleware))
        .layer(from_fn(request_id_middleware))
}

/// Put every route of `router` behind `guard`.
///
/// Must be applied to routers that are merged or nested under a router
/// carrying [`identity_middleware`].
pub fn guard_routes<S>(router: Router<S>, state: &AppState, guard: PermissionGuard) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let state = state.clone();
    let guard = Arc::new(guard);
    router.route_layer(from_fn(move |request: Request, next: Next| {
        permission_middleware(state.clone(), Arc::clone(&guard), request, next)
    }))
}

/// API v1 routes
fn api_v1_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(check_routes(state))
        .merge(me_routes(state))
        .nest("/users", diagnostics_routes(state))
}

fn diagnostics_guard(state: &AppState) -> PermissionGuard {
    PermissionGuard::system(state.settings.diagnostics_permission.clone())
}

/// Arbitrary-user checks answer the same questions as the diagnostics
/// routes and share their guard
fn check_routes(state: &AppState) -> Router<AppState> {
    let routes = Router::new().route(
        "/permissions/check",
        post(handlers::permissions::check_permission),
    );
    guard_routes(routes, state, diagnostics_guard(state))
}

/// Routes about the calling user
fn me_routes(state: &AppState) -> Router<AppState> {
    let settings = Arc::clone(&state.settings);
    Router::new()
        .route(
            "/me/permissions",
            get(handlers::permissions::my_permissions),
        )
        .route_layer(from_fn(move |request: Request, next: Next| {
            require_identity(Arc::clone(&settings), request, next)
        }))
}

/// Per-user permission diagnostics, restricted to holders of the configured
/// system permission
fn diagnostics_routes(state: &AppState) -> Router<AppState> {
    let routes = Router::new()
        .route(
            "/{user_id}/permissions",
            get(handlers::permissions::user_permissions),
        )
        .route(
            "/{user_id}/permissions/system",
            get(handlers::permissions::user_system_permissions),
        )
        .route(
            "/{user_id}/organizations/{organization_id}/permissions",
            get(handlers::permissions::user_organization_permissions),
        )
        .route(
            "/{user_id}/sub-organizations/{sub_organization_id}/permissions",
            get(handlers::permissions::user_sub_organization_permissions),
        );

    guard_routes(routes, state, diagnostics_guard(state))
}
