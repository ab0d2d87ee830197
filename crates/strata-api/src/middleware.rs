//! API middleware: request ids, logging, caller identity and permission guards
//!
//! Guards consult the [`AuthorizationGate`](strata_core::AuthorizationGate)
//! and translate its decision with [`denial_response`], which depends on
//! nothing but the denial reason and the configured settings.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, RawPathParams, Request},
    http::{header, request::Parts, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use strata_core::{
    AuthorizationContext, ContextOverride, DenialReason, GateDecision, StrataError, UserId,
};

use crate::dto::ApiResponse;
use crate::state::{AppState, GateSettings};

/// Header carrying the caller's user id, set by the upstream authenticator
pub const USER_ID_HEADER: &str = "X-User-Id";

// =============================================================================
// Types
// =============================================================================

/// Caller identity attached by [`identity_middleware`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserId);

/// Error response for denied requests
#[derive(Debug, Serialize)]
pub struct AuthError {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Which gate variant a guarded route goes through
#[derive(Debug, Clone)]
pub enum GuardScope {
    /// Route parameters merged with the given overrides
    Merged(ContextOverride),
    /// System roles only
    System,
    /// Requires an organization id among the route parameters
    Organization,
    /// Requires organization and sub-organization ids among the route parameters
    SubOrganization,
}

/// Permission requirement attached to a group of routes
#[derive(Debug, Clone)]
pub struct PermissionGuard {
    pub permission: String,
    pub scope: GuardScope,
}

impl PermissionGuard {
    pub fn merged(permission: impl Into<String>, overrides: ContextOverride) -> Self {
        Self {
            permission: permission.into(),
            scope: GuardScope::Merged(overrides),
        }
    }

    pub fn system(permission: impl Into<String>) -> Self {
        Self {
            permission: permission.into(),
            scope: GuardScope::System,
        }
    }

    pub fn organization(permission: impl Into<String>) -> Self {
        Self {
            permission: permission.into(),
            scope: GuardScope::Organization,
        }
    }

    pub fn sub_organization(permission: impl Into<String>) -> Self {
        Self {
            permission: permission.into(),
            scope: GuardScope::SubOrganization,
        }
    }
}

// =============================================================================
// Request ID Middleware
// =============================================================================

/// Request ID wrapper for extensions
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Add unique request ID to every request
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = Uuid::now_v7().to_string();

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("X-Request-ID", value);
    }

    response
}

fn request_id_of(request: &Request) -> Option<String> {
    request.extensions().get::<RequestId>().map(|r| r.0.clone())
}

// =============================================================================
// Identity Middleware
// =============================================================================

/// Attach an [`AuthenticatedUser`] when the request carries a valid user id.
///
/// Requests without one pass through unchanged; guards turn the missing
/// identity into an `unauthenticated` denial.
pub async fn identity_middleware(mut request: Request, next: Next) -> Response {
    let user_id = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(UserId::parse_param);

    match user_id {
        Some(user_id) => {
            request.extensions_mut().insert(AuthenticatedUser(user_id));
        }
        None if request.headers().contains_key(USER_ID_HEADER) => {
            warn!("Ignoring malformed {} header", USER_ID_HEADER);
        }
        None => {}
    }

    next.run(request).await
}

/// Reject requests that carry no identity
pub async fn require_identity(
    settings: Arc<GateSettings>,
    request: Request,
    next: Next,
) -> Response {
    if request.extensions().get::<AuthenticatedUser>().is_none() {
        let request_id = request_id_of(&request);
        return denial_response(DenialReason::Unauthenticated, &settings, request_id);
    }
    next.run(request).await
}

// =============================================================================
// Permission Middleware
// =============================================================================

/// Gate a request on `guard`, reading ambient context from the matched route
/// parameters.
///
/// The query string is never consulted. Sub-organization ids are not checked
/// against their organization, so they must come from the route itself.
pub async fn permission_middleware(
    state: AppState,
    guard: Arc<PermissionGuard>,
    request: Request,
    next: Next,
) -> Response {
    let request_id = request_id_of(&request);
    let user_id = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|user| user.0);

    let (mut parts, body) = request.into_parts();
    let ambient = ambient_context(&mut parts).await;
    let request = Request::from_parts(parts, body);

    let gate = &state.gate;
    let permission = guard.permission.as_str();
    let decision = match &guard.scope {
        GuardScope::Merged(overrides) => {
            gate.authorize(user_id, permission, &ambient, overrides)
                .await
        }
        GuardScope::System => gate.authorize_system(user_id, permission).await,
        GuardScope::Organization => {
            gate.authorize_organization(user_id, permission, ambient.organization_id)
                .await
        }
        GuardScope::SubOrganization => {
            gate.authorize_sub_organization(
                user_id,
                permission,
                ambient.organization_id,
                ambient.sub_organization_id,
            )
            .await
        }
    };

    match decision {
        Ok(GateDecision::Granted) => next.run(request).await,
        Ok(GateDecision::Denied(reason)) => {
            denial_response(reason, &state.settings, request_id)
        }
        Err(e) => {
            error!(request_id = ?request_id, "Permission check failed: {}", e);
            error_response(&e)
        }
    }
}

async fn ambient_context(parts: &mut Parts) -> AuthorizationContext {
    match RawPathParams::from_request_parts(parts, &()).await {
        Ok(path) => AuthorizationContext::from_params(path.iter()),
        Err(_) => AuthorizationContext::default(),
    }
}

// =============================================================================
// Responses
// =============================================================================

/// HTTP reaction to a denial.
///
/// With a login redirect configured the caller is sent there (`302`), with
/// `?error=<code>` unless the denial is `unauthenticated`. Otherwise the
/// reason is returned as JSON: `401`, `400` or `403`.
pub fn denial_response(
    reason: DenialReason,
    settings: &GateSettings,
    request_id: Option<String>,
) -> Response {
    info!(reason = %reason, request_id = ?request_id, "Request denied");

    if let Some(login) = &settings.login_redirect {
        let location = match reason {
            DenialReason::Unauthenticated => login.clone(),
            _ => {
                let separator = if login.contains('?') { '&' } else { '?' };
                format!("{}{}error={}", login, separator, reason.code())
            }
        };
        return (StatusCode::FOUND, [(header::LOCATION, location)]).into_response();
    }

    let status = match reason {
        DenialReason::Unauthenticated => StatusCode::UNAUTHORIZED,
        DenialReason::InvalidOrganization => StatusCode::BAD_REQUEST,
        DenialReason::InsufficientPermissions => StatusCode::FORBIDDEN,
    };
    let body = AuthError {
        error: reason.code().to_string(),
        message: reason.message().to_string(),
        request_id,
    };
    (status, Json(body)).into_response()
}

/// Map a core error onto an API error response
pub fn error_response(error: &StrataError) -> Response {
    let (status, code) = match error {
        StrataError::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
        StrataError::InvalidContext { .. } => (StatusCode::BAD_REQUEST, "INVALID_CONTEXT"),
        StrataError::InvalidInput { .. } => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
        StrataError::StoreFailure { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "STORE_FAILURE")
        }
        StrataError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "CANCELLED"),
        StrataError::Config { .. } | StrataError::Internal { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        }
    };
    (status, Json(ApiResponse::error(code, error.to_string()))).into_response()
}

// =============================================================================
// Logging Middleware
// =============================================================================

/// Request logging middleware with request ID
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request_id_of(&request).unwrap_or_else(|| "unknown".to_string());

    let start = std::time::Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %status.as_u16(),
        latency_ms = %latency.as_millis(),
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redirecting() -> GateSettings {
        GateSettings {
            login_redirect: Some("/login".to_string()),
            ..GateSettings::default()
        }
    }

    fn location(response: &Response) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap()
    }

    #[test]
    fn test_json_denials() {
        let settings = GateSettings::default();
        let cases = [
            (DenialReason::Unauthenticated, StatusCode::UNAUTHORIZED),
            (DenialReason::InvalidOrganization, StatusCode::BAD_REQUEST),
            (DenialReason::InsufficientPermissions, StatusCode::FORBIDDEN),
        ];
        for (reason, status) in cases {
            let response = denial_response(reason, &settings, None);
            assert_eq!(response.status(), status);
            assert!(response.headers().get(header::LOCATION).is_none());
        }
    }

    #[test]
    fn test_redirect_denials() {
        let settings = redirecting();

        let response = denial_response(DenialReason::Unauthenticated, &settings, None);
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/login");

        let response = denial_response(DenialReason::InsufficientPermissions, &settings, None);
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/login?error=insufficient_permissions");

        let response = denial_response(DenialReason::InvalidOrganization, &settings, None);
        assert_eq!(location(&response), "/login?error=invalid_organization");
    }

    #[test]
    fn test_redirect_keeps_existing_query() {
        let settings = GateSettings {
            login_redirect: Some("/login?next=%2F".to_string()),
            ..GateSettings::default()
        };
        let response = denial_response(DenialReason::InsufficientPermissions, &settings, None);
        assert_eq!(
            location(&response),
            "/login?next=%2F&error=insufficient_permissions"
        );
    }

    #[test]
    fn test_store_failure_maps_to_500() {
        let response = error_response(&StrataError::store_failure("connection reset"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
