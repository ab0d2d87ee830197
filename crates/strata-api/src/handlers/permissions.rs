//! Permission check and diagnostics handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use tracing::{debug, info};

use strata_core::{
    AllPermissions, AuthorizationContext, OrganizationId, Scope, SubOrganizationId, UserId,
};

use crate::dto::{
    ApiResponse, CheckPermissionRequest, CheckPermissionResponse, ScopedPermissionsResponse,
};
use crate::extract::JsonBody;
use crate::middleware::{error_response, AuthenticatedUser};
use crate::state::AppState;

fn bad_request(code: &str, message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::error(code, message))).into_response()
}

fn parse_user(raw: &str) -> Result<UserId, Response> {
    UserId::parse_param(raw)
        .ok_or_else(|| bad_request("INVALID_USER_ID", format!("Invalid user id: {}", raw)))
}

/// Decide a single permission for an explicit user and context.
///
/// The permission string is matched verbatim; only a blank one is rejected.
pub async fn check_permission(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CheckPermissionRequest>,
) -> Result<Json<CheckPermissionResponse>, Response> {
    let user_id = request
        .user_id
        .and_then(UserId::new)
        .ok_or_else(|| bad_request("INVALID_USER_ID", "user_id must be a positive integer"))?;

    let permission = request.permission.as_str();
    if permission.trim().is_empty() {
        return Err(bad_request("INVALID_PERMISSION", "permission must not be empty"));
    }

    let context =
        AuthorizationContext::from_raw(request.organization_id, request.sub_organization_id);
    debug!(%user_id, permission, ?context, "Permission check requested");

    let outcome = state
        .resolver()
        .evaluate(user_id, permission, &context)
        .await
        .map_err(|e| error_response(&e))?;

    info!(%user_id, permission, allowed = outcome.allowed, "Permission check result");
    Ok(Json(CheckPermissionResponse {
        allowed: outcome.allowed,
        granted_by: outcome.granted_by,
        context,
        checked_at: chrono::Utc::now().to_rfc3339(),
    }))
}

/// Everything the calling user holds
pub async fn my_permissions(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
) -> Result<Json<ApiResponse<AllPermissions>>, Response> {
    all_permissions_for(&state, user_id).await
}

/// Everything a given user holds
pub async fn user_permissions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<AllPermissions>>, Response> {
    let user_id = parse_user(&user_id)?;
    all_permissions_for(&state, user_id).await
}

async fn all_permissions_for(
    state: &AppState,
    user_id: UserId,
) -> Result<Json<ApiResponse<AllPermissions>>, Response> {
    let all = state
        .resolver()
        .all_permissions(user_id)
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(ApiResponse {
        success: true,
        data: Some(all),
        error: None,
    }))
}

pub async fn user_system_permissions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ScopedPermissionsResponse>, Response> {
    let user_id = parse_user(&user_id)?;
    let permissions = state
        .resolver()
        .system_permissions(user_id)
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(ScopedPermissionsResponse {
        user_id: user_id.get(),
        scope: Scope::System,
        scope_id: None,
        permissions,
    }))
}

pub async fn user_organization_permissions(
    State(state): State<AppState>,
    Path((user_id, organization_id)): Path<(String, String)>,
) -> Result<Json<ScopedPermissionsResponse>, Response> {
    let user_id = parse_user(&user_id)?;
    let organization_id = OrganizationId::parse_param(&organization_id).ok_or_else(|| {
        bad_request(
            "INVALID_ORGANIZATION_ID",
            format!("Invalid organization id: {}", organization_id),
        )
    })?;

    let permissions = state
        .resolver()
        .organization_permissions(user_id, organization_id)
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(ScopedPermissionsResponse {
        user_id: user_id.get(),
        scope: Scope::Organization,
        scope_id: Some(organization_id.get()),
        permissions,
    }))
}

pub async fn user_sub_organization_permissions(
    State(state): State<AppState>,
    Path((user_id, sub_organization_id)): Path<(String, String)>,
) -> Result<Json<ScopedPermissionsResponse>, Response> {
    let user_id = parse_user(&user_id)?;
    let sub_organization_id =
        SubOrganizationId::parse_param(&sub_organization_id).ok_or_else(|| {
            bad_request(
                "INVALID_SUB_ORGANIZATION_ID",
                format!("Invalid sub-organization id: {}", sub_organization_id),
            )
        })?;

    let permissions = state
        .resolver()
        .sub_organization_permissions(user_id, sub_organization_id)
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(ScopedPermissionsResponse {
        user_id: user_id.get(),
        scope: Scope::SubOrganization,
        scope_id: Some(sub_organization_id.get()),
        permissions,
    }))
}
