//! In-memory permission store.
//!
//! Mirrors the relational layout: roles per scope with their permission
//! links, organizations and sub-organizations, and the three assignment
//! tables. Each scoped permission query is counted so tests can assert how
//! many round trips a check made, and each scope can be told to fail.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::error::{Result, StrataError};
use crate::ids::*;
use crate::models::*;
use crate::traits::PermissionStore;

#[derive(Debug, Clone, Default)]
struct Role {
    description: Option<String>,
    permissions: BTreeSet<String>,
}

#[derive(Debug, Clone)]
struct Organization {
    name: String,
    kind: String,
}

#[derive(Debug, Clone)]
struct SubOrganization {
    name: String,
    kind: String,
    organization_id: OrganizationId,
}

#[derive(Debug, Default)]
struct Tables {
    system_roles: BTreeMap<String, Role>,
    organization_roles: BTreeMap<String, Role>,
    sub_organization_roles: BTreeMap<String, Role>,
    organizations: BTreeMap<OrganizationId, Organization>,
    sub_organizations: BTreeMap<SubOrganizationId, SubOrganization>,
    user_system_roles: BTreeSet<(UserId, String)>,
    user_organization_roles: BTreeSet<(UserId, OrganizationId, String)>,
    user_sub_organization_roles: BTreeSet<(UserId, SubOrganizationId, String)>,
}

fn collect_permissions<'a>(
    roles: &BTreeMap<String, Role>,
    names: impl Iterator<Item = &'a String>,
) -> PermissionSet {
    names
        .filter_map(|name| roles.get(name))
        .flat_map(|role| role.permissions.iter().cloned())
        .collect()
}

#[derive(Debug, Default)]
struct ScopeCounters {
    system: AtomicUsize,
    organization: AtomicUsize,
    sub_organization: AtomicUsize,
}

#[derive(Debug, Default)]
struct FailureSwitches {
    system: AtomicBool,
    organization: AtomicBool,
    sub_organization: AtomicBool,
}

/// In-memory implementation of PermissionStore
#[derive(Debug, Default)]
pub struct InMemoryPermissionStore {
    tables: RwLock<Tables>,
    queries: ScopeCounters,
    failures: FailureSwitches,
}

impl InMemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated from a fixture
    pub async fn from_fixture(fixture: Fixture) -> Result<Self> {
        let store = Self::new();
        store.load_fixture(fixture).await?;
        Ok(store)
    }

    // -------------------------------------------------------------------------
    // Roles
    // -------------------------------------------------------------------------

    pub async fn add_system_role<I, P>(&self, name: &str, permissions: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let mut tables = self.tables.write().await;
        add_role(&mut tables.system_roles, name, None, permissions);
    }

    pub async fn add_organization_role<I, P>(&self, name: &str, permissions: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let mut tables = self.tables.write().await;
        add_role(&mut tables.organization_roles, name, None, permissions);
    }

    pub async fn add_sub_organization_role<I, P>(&self, name: &str, permissions: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let mut tables = self.tables.write().await;
        add_role(&mut tables.sub_organization_roles, name, None, permissions);
    }

    // -------------------------------------------------------------------------
    // Organizations
    // -------------------------------------------------------------------------

    pub async fn add_organization(&self, id: OrganizationId, name: &str, kind: &str) {
        self.tables.write().await.organizations.insert(
            id,
            Organization {
                name: name.to_string(),
                kind: kind.to_string(),
            },
        );
    }

    /// Register a sub-organization; its owning organization must exist
    pub async fn add_sub_organization(
        &self,
        id: SubOrganizationId,
        organization_id: OrganizationId,
        name: &str,
        kind: &str,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.organizations.contains_key(&organization_id) {
            return Err(StrataError::invalid_input(format!(
                "organization {} does not exist",
                organization_id
            )));
        }
        tables.sub_organizations.insert(
            id,
            SubOrganization {
                name: name.to_string(),
                kind: kind.to_string(),
                organization_id,
            },
        );
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Assignments
    // -------------------------------------------------------------------------

    pub async fn assign_system_role(&self, user_id: UserId, role: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        ensure_role(&tables.system_roles, Scope::System, role)?;
        tables.user_system_roles.insert((user_id, role.to_string()));
        Ok(())
    }

    pub async fn assign_organization_role(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
        role: &str,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        ensure_role(&tables.organization_roles, Scope::Organization, role)?;
        if !tables.organizations.contains_key(&organization_id) {
            return Err(StrataError::invalid_input(format!(
                "organization {} does not exist",
                organization_id
            )));
        }
        tables
            .user_organization_roles
            .insert((user_id, organization_id, role.to_string()));
        Ok(())
    }

    pub async fn assign_sub_organization_role(
        &self,
        user_id: UserId,
        sub_organization_id: SubOrganizationId,
        role: &str,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        ensure_role(&tables.sub_organization_roles, Scope::SubOrganization, role)?;
        if !tables.sub_organizations.contains_key(&sub_organization_id) {
            return Err(StrataError::invalid_input(format!(
                "sub-organization {} does not exist",
                sub_organization_id
            )));
        }
        tables
            .user_sub_organization_roles
            .insert((user_id, sub_organization_id, role.to_string()));
        Ok(())
    }

    pub async fn revoke_organization_role(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
        role: &str,
    ) -> bool {
        self.tables
            .write()
            .await
            .user_organization_roles
            .remove(&(user_id, organization_id, role.to_string()))
    }

    // -------------------------------------------------------------------------
    // Instrumentation
    // -------------------------------------------------------------------------

    /// Number of permission queries served for `scope`
    pub fn query_count(&self, scope: Scope) -> usize {
        self.counter(scope).load(Ordering::SeqCst)
    }

    /// Permission queries served across all scopes
    pub fn total_queries(&self) -> usize {
        [Scope::System, Scope::Organization, Scope::SubOrganization]
            .into_iter()
            .map(|scope| self.query_count(scope))
            .sum()
    }

    pub fn reset_query_counts(&self) {
        for scope in [Scope::System, Scope::Organization, Scope::SubOrganization] {
            self.counter(scope).store(0, Ordering::SeqCst);
        }
    }

    /// Make every permission query for `scope` fail until switched back
    pub fn set_failing(&self, scope: Scope, failing: bool) {
        let switch = match scope {
            Scope::System => &self.failures.system,
            Scope::Organization => &self.failures.organization,
            Scope::SubOrganization => &self.failures.sub_organization,
        };
        switch.store(failing, Ordering::SeqCst);
    }

    fn counter(&self, scope: Scope) -> &AtomicUsize {
        match scope {
            Scope::System => &self.queries.system,
            Scope::Organization => &self.queries.organization,
            Scope::SubOrganization => &self.queries.sub_organization,
        }
    }

    fn record_query(&self, scope: Scope) -> Result<()> {
        self.counter(scope).fetch_add(1, Ordering::SeqCst);
        let failing = match scope {
            Scope::System => self.failures.system.load(Ordering::SeqCst),
            Scope::Organization => self.failures.organization.load(Ordering::SeqCst),
            Scope::SubOrganization => self.failures.sub_organization.load(Ordering::SeqCst),
        };
        if failing {
            return Err(StrataError::store_failure(format!(
                "{} permission query failed",
                scope
            )));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Fixtures
    // -------------------------------------------------------------------------

    /// Load roles, organizations and assignments described by `fixture`
    pub async fn load_fixture(&self, fixture: Fixture) -> Result<()> {
        {
            let mut tables = self.tables.write().await;
            for role in fixture.system_roles {
                add_role(
                    &mut tables.system_roles,
                    &role.name,
                    role.description,
                    role.permissions,
                );
            }
            for role in fixture.organization_roles {
                add_role(
                    &mut tables.organization_roles,
                    &role.name,
                    role.description,
                    role.permissions,
                );
            }
            for role in fixture.sub_organization_roles {
                add_role(
                    &mut tables.sub_organization_roles,
                    &role.name,
                    role.description,
                    role.permissions,
                );
            }
        }

        for org in fixture.organizations {
            self.add_organization(org.id, &org.name, &org.kind).await;
        }
        for sub in fixture.sub_organizations {
            self.add_sub_organization(sub.id, sub.organization_id, &sub.name, &sub.kind)
                .await?;
        }

        for assignment in fixture.assignments {
            match assignment {
                FixtureAssignment::System { user_id, role } => {
                    self.assign_system_role(user_id, &role).await?
                }
                FixtureAssignment::Organization {
                    user_id,
                    organization_id,
                    role,
                } => {
                    self.assign_organization_role(user_id, organization_id, &role)
                        .await?
                }
                FixtureAssignment::SubOrganization {
                    user_id,
                    sub_organization_id,
                    role,
                } => {
                    self.assign_sub_organization_role(user_id, sub_organization_id, &role)
                        .await?
                }
            }
        }
        Ok(())
    }
}

fn add_role<I, P>(
    roles: &mut BTreeMap<String, Role>,
    name: &str,
    description: Option<String>,
    permissions: I,
) where
    I: IntoIterator<Item = P>,
    P: Into<String>,
{
    let role = roles.entry(name.to_string()).or_default();
    if description.is_some() {
        role.description = description;
    }
    role.permissions.extend(permissions.into_iter().map(Into::into));
}

fn ensure_role(roles: &BTreeMap<String, Role>, scope: Scope, name: &str) -> Result<()> {
    if roles.contains_key(name) {
        Ok(())
    } else {
        Err(StrataError::invalid_input(format!(
            "{} role {:?} does not exist",
            scope, name
        )))
    }
}

fn role_summary(roles: &BTreeMap<String, Role>, name: &str) -> RoleSummary {
    RoleSummary {
        name: name.to_string(),
        description: roles.get(name).and_then(|r| r.description.clone()),
    }
}

#[async_trait]
impl PermissionStore for InMemoryPermissionStore {
    #[instrument(skip(self))]
    async fn system_permissions(&self, user_id: UserId) -> Result<PermissionSet> {
        self.record_query(Scope::System)?;
        let tables = self.tables.read().await;
        let names = tables
            .user_system_roles
            .iter()
            .filter(|(user, _)| *user == user_id)
            .map(|(_, role)| role);
        Ok(collect_permissions(&tables.system_roles, names))
    }

    #[instrument(skip(self))]
    async fn organization_permissions(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> Result<PermissionSet> {
        self.record_query(Scope::Organization)?;
        let tables = self.tables.read().await;
        let names = tables
            .user_organization_roles
            .iter()
            .filter(|(user, org, _)| *user == user_id && *org == organization_id)
            .map(|(_, _, role)| role);
        Ok(collect_permissions(&tables.organization_roles, names))
    }

    #[instrument(skip(self))]
    async fn sub_organization_permissions(
        &self,
        user_id: UserId,
        sub_organization_id: SubOrganizationId,
    ) -> Result<PermissionSet> {
        self.record_query(Scope::SubOrganization)?;
        let tables = self.tables.read().await;
        let names = tables
            .user_sub_organization_roles
            .iter()
            .filter(|(user, sub, _)| *user == user_id && *sub == sub_organization_id)
            .map(|(_, _, role)| role);
        Ok(collect_permissions(&tables.sub_organization_roles, names))
    }

    #[instrument(skip(self))]
    async fn organization_memberships(
        &self,
        user_id: UserId,
    ) -> Result<Vec<OrganizationMembership>> {
        let tables = self.tables.read().await;
        let memberships = tables
            .user_organization_roles
            .iter()
            .filter(|(user, _, _)| *user == user_id)
            .filter_map(|(_, org_id, role)| {
                let org = tables.organizations.get(org_id)?;
                Some(OrganizationMembership {
                    organization_id: *org_id,
                    organization_name: org.name.clone(),
                    organization_type: org.kind.clone(),
                    role: role_summary(&tables.organization_roles, role),
                })
            })
            .collect::<Vec<_>>();
        debug!(%user_id, count = memberships.len(), "listed organization memberships");
        Ok(memberships)
    }

    #[instrument(skip(self))]
    async fn sub_organization_memberships(
        &self,
        user_id: UserId,
        organization_id: Option<OrganizationId>,
    ) -> Result<Vec<SubOrganizationMembership>> {
        let tables = self.tables.read().await;
        let memberships = tables
            .user_sub_organization_roles
            .iter()
            .filter(|(user, _, _)| *user == user_id)
            .filter_map(|(_, sub_id, role)| {
                let sub = tables.sub_organizations.get(sub_id)?;
                if organization_id.is_some_and(|org| org != sub.organization_id) {
                    return None;
                }
                let org = tables.organizations.get(&sub.organization_id)?;
                Some(SubOrganizationMembership {
                    sub_organization_id: *sub_id,
                    sub_organization_name: sub.name.clone(),
                    sub_organization_type: sub.kind.clone(),
                    organization_id: sub.organization_id,
                    organization_name: org.name.clone(),
                    role: role_summary(&tables.sub_organization_roles, role),
                })
            })
            .collect();
        Ok(memberships)
    }
}

// =============================================================================
// Fixture format
// =============================================================================

/// Seed data for the in-memory store, usually read from JSON
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub system_roles: Vec<FixtureRole>,
    pub organization_roles: Vec<FixtureRole>,
    pub sub_organization_roles: Vec<FixtureRole>,
    pub organizations: Vec<FixtureOrganization>,
    pub sub_organizations: Vec<FixtureSubOrganization>,
    pub assignments: Vec<FixtureAssignment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureRole {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureOrganization {
    pub id: OrganizationId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureSubOrganization {
    pub id: SubOrganizationId,
    pub organization_id: OrganizationId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum FixtureAssignment {
    System {
        user_id: UserId,
        role: String,
    },
    Organization {
        user_id: UserId,
        organization_id: OrganizationId,
        role: String,
    },
    SubOrganization {
        user_id: UserId,
        sub_organization_id: SubOrganizationId,
        role: String,
    },
}

impl Fixture {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| StrataError::invalid_input(format!("invalid fixture: {}", e)))
    }
}
