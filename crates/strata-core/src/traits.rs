//! Core traits for the Strata resolver

use crate::{error::Result, ids::*, models::*};
use async_trait::async_trait;
use std::sync::Arc;

// =============================================================================
// Permission Store
// =============================================================================

/// Read-only access to role assignments and their permissions.
///
/// Every permission query returns an empty set when the user holds no
/// matching assignment; errors are reserved for data access failures.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Permissions granted through the user's system roles
    async fn system_permissions(&self, user_id: UserId) -> Result<PermissionSet>;

    /// Permissions granted through the user's roles in one organization
    async fn organization_permissions(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> Result<PermissionSet>;

    /// Permissions granted through the user's roles in one sub-organization
    async fn sub_organization_permissions(
        &self,
        user_id: UserId,
        sub_organization_id: SubOrganizationId,
    ) -> Result<PermissionSet>;

    /// Every (organization, role) assignment the user holds
    async fn organization_memberships(&self, user_id: UserId)
        -> Result<Vec<OrganizationMembership>>;

    /// Every (sub-organization, role) assignment the user holds, optionally
    /// restricted to sub-organizations owned by one organization
    async fn sub_organization_memberships(
        &self,
        user_id: UserId,
        organization_id: Option<OrganizationId>,
    ) -> Result<Vec<SubOrganizationMembership>>;

    /// Verify the backing store is reachable
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<T> PermissionStore for Arc<T>
where
    T: PermissionStore + ?Sized,
{
    async fn system_permissions(&self, user_id: UserId) -> Result<PermissionSet> {
        (**self).system_permissions(user_id).await
    }

    async fn organization_permissions(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> Result<PermissionSet> {
        (**self)
            .organization_permissions(user_id, organization_id)
            .await
    }

    async fn sub_organization_permissions(
        &self,
        user_id: UserId,
        sub_organization_id: SubOrganizationId,
    ) -> Result<PermissionSet> {
        (**self)
            .sub_organization_permissions(user_id, sub_organization_id)
            .await
    }

    async fn organization_memberships(
        &self,
        user_id: UserId,
    ) -> Result<Vec<OrganizationMembership>> {
        (**self).organization_memberships(user_id).await
    }

    async fn sub_organization_memberships(
        &self,
        user_id: UserId,
        organization_id: Option<OrganizationId>,
    ) -> Result<Vec<SubOrganizationMembership>> {
        (**self)
            .sub_organization_memberships(user_id, organization_id)
            .await
    }

    async fn health_check(&self) -> Result<()> {
        (**self).health_check().await
    }
}
