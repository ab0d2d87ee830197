//! Authorization gate: turns resolver answers into explicit decisions.
//!
//! The gate never redirects or builds responses. It hands back a
//! [`GateDecision`] and leaves the reaction to the transport.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::context::{AuthorizationContext, ContextMerger, ContextOverride};
use crate::error::Result;
use crate::ids::*;
use crate::resolver::PermissionResolver;
use crate::traits::PermissionStore;

/// Why a request was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// No user identity accompanied the request
    Unauthenticated,
    /// A scoped guard was missing its organization or sub-organization id
    InvalidOrganization,
    /// The resolver found no granting role
    InsufficientPermissions,
}

impl DenialReason {
    pub fn code(&self) -> &'static str {
        match self {
            DenialReason::Unauthenticated => "unauthenticated",
            DenialReason::InvalidOrganization => "invalid_organization",
            DenialReason::InsufficientPermissions => "insufficient_permissions",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            DenialReason::Unauthenticated => "Authentication required",
            DenialReason::InvalidOrganization => {
                "A valid organization context is required for this operation"
            }
            DenialReason::InsufficientPermissions => "Insufficient permissions",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Granted,
    Denied(DenialReason),
}

impl GateDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, GateDecision::Granted)
    }

    fn from_check(allowed: bool) -> Self {
        if allowed {
            GateDecision::Granted
        } else {
            GateDecision::Denied(DenialReason::InsufficientPermissions)
        }
    }
}

/// Guard in front of operations that need a permission
pub struct AuthorizationGate<S> {
    resolver: Arc<PermissionResolver<S>>,
}

impl<S> Clone for AuthorizationGate<S> {
    fn clone(&self) -> Self {
        Self {
            resolver: Arc::clone(&self.resolver),
        }
    }
}

impl<S> AuthorizationGate<S>
where
    S: PermissionStore,
{
    pub fn new(resolver: Arc<PermissionResolver<S>>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &PermissionResolver<S> {
        &self.resolver
    }

    /// Check with a context merged from ambient parameters and overrides
    pub async fn authorize(
        &self,
        user_id: Option<UserId>,
        permission: &str,
        ambient: &AuthorizationContext,
        overrides: &ContextOverride,
    ) -> Result<GateDecision> {
        let Some(user_id) = user_id else {
            return Ok(unauthenticated(permission));
        };
        let context = ContextMerger::merge(ambient, overrides);
        self.decide(user_id, permission, &context).await
    }

    /// Check system roles only
    pub async fn authorize_system(
        &self,
        user_id: Option<UserId>,
        permission: &str,
    ) -> Result<GateDecision> {
        let Some(user_id) = user_id else {
            return Ok(unauthenticated(permission));
        };
        self.decide(user_id, permission, &AuthorizationContext::none())
            .await
    }

    /// Check within one organization; the organization id is mandatory
    pub async fn authorize_organization(
        &self,
        user_id: Option<UserId>,
        permission: &str,
        organization_id: Option<OrganizationId>,
    ) -> Result<GateDecision> {
        let Some(user_id) = user_id else {
            return Ok(unauthenticated(permission));
        };
        let Some(organization_id) = organization_id else {
            debug!(%user_id, permission, "organization id missing");
            return Ok(GateDecision::Denied(DenialReason::InvalidOrganization));
        };
        self.decide(
            user_id,
            permission,
            &AuthorizationContext::organization(organization_id),
        )
        .await
    }

    /// Check within one sub-organization; both ids are mandatory
    pub async fn authorize_sub_organization(
        &self,
        user_id: Option<UserId>,
        permission: &str,
        organization_id: Option<OrganizationId>,
        sub_organization_id: Option<SubOrganizationId>,
    ) -> Result<GateDecision> {
        let Some(user_id) = user_id else {
            return Ok(unauthenticated(permission));
        };
        let (Some(organization_id), Some(sub_organization_id)) =
            (organization_id, sub_organization_id)
        else {
            debug!(%user_id, permission, "organization or sub-organization id missing");
            return Ok(GateDecision::Denied(DenialReason::InvalidOrganization));
        };
        self.decide(
            user_id,
            permission,
            &AuthorizationContext::sub_organization(organization_id, sub_organization_id),
        )
        .await
    }

    async fn decide(
        &self,
        user_id: UserId,
        permission: &str,
        context: &AuthorizationContext,
    ) -> Result<GateDecision> {
        let allowed = self.resolver.check(user_id, permission, context).await?;
        let decision = GateDecision::from_check(allowed);
        if !allowed {
            warn!(%user_id, permission, "permission denied");
        }
        Ok(decision)
    }
}

fn unauthenticated(permission: &str) -> GateDecision {
    debug!(permission, "no user identity");
    GateDecision::Denied(DenialReason::Unauthenticated)
}
