//! Domain models for the Strata permission resolver
//!
//! Roles, organizations and assignments live in the external store. The
//! types here are the read-side shapes the resolver and its diagnostics hand
//! back to callers.

use crate::ids::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// =============================================================================
// Permissions & Scopes
// =============================================================================

/// The three authorization levels, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    System,
    Organization,
    SubOrganization,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::System => "system",
            Scope::Organization => "organization",
            Scope::SubOrganization => "sub_organization",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of opaque permission strings held at one scope.
///
/// Membership is exact-string; nothing inside a permission is parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<String>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.0.contains(permission)
    }

    pub fn insert(&mut self, permission: impl Into<String>) -> bool {
        self.0.insert(permission.into())
    }

    pub fn extend<I, P>(&mut self, permissions: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.0.extend(permissions.into_iter().map(Into::into));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<P: Into<String>> FromIterator<P> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl IntoIterator for PermissionSet {
    type Item = String;
    type IntoIter = std::collections::btree_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// =============================================================================
// Memberships
// =============================================================================

/// A role as seen from an assignment row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One (organization, role) assignment held by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationMembership {
    pub organization_id: OrganizationId,
    pub organization_name: String,
    /// association / company / group
    pub organization_type: String,
    pub role: RoleSummary,
}

/// One (sub-organization, role) assignment held by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubOrganizationMembership {
    pub sub_organization_id: SubOrganizationId,
    pub sub_organization_name: String,
    /// committee / department / subsidiary
    pub sub_organization_type: String,
    pub organization_id: OrganizationId,
    pub organization_name: String,
    pub role: RoleSummary,
}

// =============================================================================
// Diagnostic aggregate
// =============================================================================

/// Everything a user holds, grouped by organization. Diagnostic only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllPermissions {
    pub user_id: UserId,
    pub system: PermissionSet,
    pub organizations: Vec<OrganizationPermissions>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationPermissions {
    pub organization_id: OrganizationId,
    pub organization_name: String,
    pub organization_type: String,
    pub roles: Vec<RoleSummary>,
    pub permissions: PermissionSet,
    pub sub_organizations: Vec<SubOrganizationPermissions>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubOrganizationPermissions {
    pub sub_organization_id: SubOrganizationId,
    pub sub_organization_name: String,
    pub sub_organization_type: String,
    pub roles: Vec<RoleSummary>,
    pub permissions: PermissionSet,
}

// =============================================================================
// Check results
// =============================================================================

/// Result of a single permission evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub allowed: bool,
    /// Stage that granted access, if any
    pub granted_by: Option<Scope>,
    /// Store queries issued while evaluating
    pub queries: u8,
}

impl CheckOutcome {
    pub(crate) fn granted(scope: Scope, queries: u8) -> Self {
        Self {
            allowed: true,
            granted_by: Some(scope),
            queries,
        }
    }

    pub(crate) fn denied(queries: u8) -> Self {
        Self {
            allowed: false,
            granted_by: None,
            queries,
        }
    }
}
