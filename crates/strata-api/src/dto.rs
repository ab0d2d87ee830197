//! Data Transfer Objects for API requests and responses

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use strata_core::{AuthorizationContext, PermissionSet, Scope};

// ============================================================================
// Generic Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl ApiResponse<()> {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.to_string(),
                message: message.into(),
                details: None,
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, String>>,
}

// ============================================================================
// Permission DTOs
// ============================================================================

/// Body of `POST /api/v1/permissions/check`.
///
/// Ids arrive as raw integers; zero or negative context ids are treated as
/// absent, a missing or non-positive user id is rejected.
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckPermissionRequest {
    #[serde(default, alias = "userId")]
    pub user_id: Option<i64>,
    pub permission: String,
    #[serde(default, alias = "organizationId")]
    pub organization_id: Option<i64>,
    #[serde(default, alias = "subOrganizationId")]
    pub sub_organization_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckPermissionResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_by: Option<Scope>,
    /// Context the check actually ran with, after normalization
    pub context: AuthorizationContext,
    pub checked_at: String,
}

/// Permission set held at a single scope
#[derive(Debug, Serialize, Deserialize)]
pub struct ScopedPermissionsResponse {
    pub user_id: i64,
    pub scope: Scope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<i64>,
    pub permissions: PermissionSet,
}
