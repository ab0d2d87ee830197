//! Permission resolver.
//!
//! A check walks three stages in a fixed order and stops at the first one
//! that grants the permission:
//!
//! 1. system roles (always consulted)
//! 2. organization roles (only when the context names an organization)
//! 3. sub-organization roles (only when the context names a sub-organization)
//!
//! Stages never pool their permission sets, and there is no inheritance
//! between levels: an organization role says nothing about the
//! organization's sub-organizations, and vice versa. The sub-organization
//! stage does not verify that the supplied organization owns the supplied
//! sub-organization.
//!
//! Store errors surface as [`StrataError::StoreFailure`] so a broken store is
//! never mistaken for a denial.

use std::collections::BTreeMap;
use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::context::AuthorizationContext;
use crate::error::{Result, StrataError};
use crate::ids::*;
use crate::models::*;
use crate::traits::PermissionStore;

/// Three-tier permission resolver over an injected store
pub struct PermissionResolver<S> {
    store: S,
}

impl<S> PermissionResolver<S>
where
    S: PermissionStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Decide whether `user_id` holds `permission` within `context`
    pub async fn check(
        &self,
        user_id: UserId,
        permission: &str,
        context: &AuthorizationContext,
    ) -> Result<bool> {
        Ok(self.evaluate(user_id, permission, context).await?.allowed)
    }

    /// Like [`check`](Self::check), aborting in-flight store queries once `cancel` fires
    pub async fn check_with_cancellation(
        &self,
        user_id: UserId,
        permission: &str,
        context: &AuthorizationContext,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        Ok(self
            .run_stages(user_id, permission, context, Some(cancel))
            .await?
            .allowed)
    }

    /// Evaluate a check and report which stage granted it
    #[instrument(skip(self, context), fields(
        organization_id = ?context.organization_id,
        sub_organization_id = ?context.sub_organization_id,
    ))]
    pub async fn evaluate(
        &self,
        user_id: UserId,
        permission: &str,
        context: &AuthorizationContext,
    ) -> Result<CheckOutcome> {
        self.run_stages(user_id, permission, context, None).await
    }

    async fn run_stages(
        &self,
        user_id: UserId,
        permission: &str,
        context: &AuthorizationContext,
        cancel: Option<&CancellationToken>,
    ) -> Result<CheckOutcome> {
        let mut queries = 0u8;

        queries += 1;
        let system = guarded(cancel, self.store.system_permissions(user_id)).await?;
        if system.contains(permission) {
            debug!(%user_id, permission, "granted by system role");
            return Ok(CheckOutcome::granted(Scope::System, queries));
        }

        if let Some(organization_id) = context.organization_id {
            queries += 1;
            let granted = guarded(
                cancel,
                self.store.organization_permissions(user_id, organization_id),
            )
            .await?;
            if granted.contains(permission) {
                debug!(%user_id, permission, %organization_id, "granted by organization role");
                return Ok(CheckOutcome::granted(Scope::Organization, queries));
            }
        }

        if let Some(sub_organization_id) = context.sub_organization_id {
            queries += 1;
            let granted = guarded(
                cancel,
                self.store
                    .sub_organization_permissions(user_id, sub_organization_id),
            )
            .await?;
            if granted.contains(permission) {
                debug!(
                    %user_id,
                    permission,
                    %sub_organization_id,
                    "granted by sub-organization role"
                );
                return Ok(CheckOutcome::granted(Scope::SubOrganization, queries));
            }
        }

        debug!(%user_id, permission, queries, "permission denied");
        Ok(CheckOutcome::denied(queries))
    }

    pub async fn system_permissions(&self, user_id: UserId) -> Result<PermissionSet> {
        self.store.system_permissions(user_id).await
    }

    pub async fn organization_permissions(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> Result<PermissionSet> {
        self.store
            .organization_permissions(user_id, organization_id)
            .await
    }

    pub async fn sub_organization_permissions(
        &self,
        user_id: UserId,
        sub_organization_id: SubOrganizationId,
    ) -> Result<PermissionSet> {
        self.store
            .sub_organization_permissions(user_id, sub_organization_id)
            .await
    }

    /// Aggregate view of everything a user holds.
    ///
    /// Diagnostic only: it applies no context narrowing and must not stand in
    /// for [`check`](Self::check). Sub-organizations are listed under the
    /// organization that owns them, and only for organizations where the user
    /// holds a role.
    #[instrument(skip(self))]
    pub async fn all_permissions(&self, user_id: UserId) -> Result<AllPermissions> {
        let system = self.store.system_permissions(user_id).await?;
        let memberships = self.store.organization_memberships(user_id).await?;

        let mut grouped: BTreeMap<OrganizationId, (OrganizationMembership, Vec<RoleSummary>)> =
            BTreeMap::new();
        for membership in memberships {
            let role = membership.role.clone();
            grouped
                .entry(membership.organization_id)
                .or_insert_with(|| (membership, Vec::new()))
                .1
                .push(role);
        }

        let mut organizations = Vec::with_capacity(grouped.len());
        for (organization_id, (membership, roles)) in grouped {
            let permissions = self
                .store
                .organization_permissions(user_id, organization_id)
                .await?;
            let sub_organizations = self
                .sub_organizations_of(user_id, organization_id)
                .await?;

            organizations.push(OrganizationPermissions {
                organization_id,
                organization_name: membership.organization_name,
                organization_type: membership.organization_type,
                roles,
                permissions,
                sub_organizations,
            });
        }

        Ok(AllPermissions {
            user_id,
            system,
            organizations,
        })
    }

    async fn sub_organizations_of(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> Result<Vec<SubOrganizationPermissions>> {
        let memberships = self
            .store
            .sub_organization_memberships(user_id, Some(organization_id))
            .await?;

        let mut grouped: BTreeMap<
            SubOrganizationId,
            (SubOrganizationMembership, Vec<RoleSummary>),
        > = BTreeMap::new();
        for membership in memberships {
            let role = membership.role.clone();
            grouped
                .entry(membership.sub_organization_id)
                .or_insert_with(|| (membership, Vec::new()))
                .1
                .push(role);
        }

        let mut result = Vec::with_capacity(grouped.len());
        for (sub_organization_id, (membership, roles)) in grouped {
            let permissions = self
                .store
                .sub_organization_permissions(user_id, sub_organization_id)
                .await?;
            result.push(SubOrganizationPermissions {
                sub_organization_id,
                sub_organization_name: membership.sub_organization_name,
                sub_organization_type: membership.sub_organization_type,
                roles,
                permissions,
            });
        }
        Ok(result)
    }
}

/// Race a store query against the caller's cancellation token
async fn guarded<T, F>(cancel: Option<&CancellationToken>, query: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match cancel {
        None => query.await,
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(StrataError::Cancelled),
                result = query => result,
            }
        }
    }
}

impl<S> std::fmt::Debug for PermissionResolver<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionResolver").finish_non_exhaustive()
    }
}
