//! Authorization context and the merge of ambient parameters with caller overrides

use serde::{Deserialize, Deserializer, Serialize};

use crate::ids::*;

/// Organizational context narrowing which scoped roles a check consults.
///
/// Fields hold validated ids only; a missing field means the matching
/// resolver stage is skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<OrganizationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_organization_id: Option<SubOrganizationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

impl AuthorizationContext {
    /// Empty context: only system roles are consulted
    pub fn none() -> Self {
        Self::default()
    }

    pub fn organization(organization_id: OrganizationId) -> Self {
        Self {
            organization_id: Some(organization_id),
            ..Self::default()
        }
    }

    pub fn sub_organization(
        organization_id: OrganizationId,
        sub_organization_id: SubOrganizationId,
    ) -> Self {
        Self {
            organization_id: Some(organization_id),
            sub_organization_id: Some(sub_organization_id),
            ..Self::default()
        }
    }

    /// Build from raw integers; zero and negative ids become absent
    pub fn from_raw(organization_id: Option<i64>, sub_organization_id: Option<i64>) -> Self {
        Self {
            organization_id: organization_id.and_then(OrganizationId::new),
            sub_organization_id: sub_organization_id.and_then(SubOrganizationId::new),
            user_id: None,
        }
    }

    /// Build the ambient context from route parameters.
    ///
    /// Both snake_case and camelCase names are recognised. Values that are
    /// not positive integers leave the field empty.
    pub fn from_params<'a, I>(params: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut context = Self::default();
        for (name, value) in params {
            match name {
                "organization_id" | "organizationId" => {
                    context.organization_id = OrganizationId::parse_param(value);
                }
                "sub_organization_id" | "subOrganizationId" => {
                    context.sub_organization_id = SubOrganizationId::parse_param(value);
                }
                "user_id" | "userId" => {
                    context.user_id = UserId::parse_param(value);
                }
                _ => {}
            }
        }
        context
    }

    pub fn with_organization(mut self, organization_id: OrganizationId) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    pub fn with_sub_organization(mut self, sub_organization_id: SubOrganizationId) -> Self {
        self.sub_organization_id = Some(sub_organization_id);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.organization_id.is_none() && self.sub_organization_id.is_none()
    }
}

// =============================================================================
// Overrides
// =============================================================================

/// Per-field override instruction.
///
/// With `#[serde(default)]` on the containing field, a missing key
/// deserializes to `Keep` and an explicit `null` to `Clear`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOverride<T> {
    /// Key omitted: the ambient value stands
    Keep,
    /// Key explicitly unset: the ambient value is dropped
    Clear,
    Set(T),
}

impl<T> Default for FieldOverride<T> {
    fn default() -> Self {
        FieldOverride::Keep
    }
}

impl<T: Copy> FieldOverride<T> {
    fn apply<U>(self, ambient: Option<U>, convert: impl FnOnce(T) -> Option<U>) -> Option<U> {
        match self {
            FieldOverride::Keep => ambient,
            FieldOverride::Clear => None,
            FieldOverride::Set(value) => convert(value),
        }
    }
}

impl<T> From<Option<T>> for FieldOverride<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => FieldOverride::Set(v),
            None => FieldOverride::Clear,
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for FieldOverride<T> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(FieldOverride::from)
    }
}

/// Caller-supplied overrides applied on top of the ambient context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ContextOverride {
    #[serde(default, alias = "organizationId")]
    pub organization_id: FieldOverride<i64>,
    #[serde(default, alias = "subOrganizationId")]
    pub sub_organization_id: FieldOverride<i64>,
    #[serde(default, alias = "userId")]
    pub user_id: FieldOverride<i64>,
}

impl ContextOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn organization(mut self, organization_id: i64) -> Self {
        self.organization_id = FieldOverride::Set(organization_id);
        self
    }

    pub fn clear_organization(mut self) -> Self {
        self.organization_id = FieldOverride::Clear;
        self
    }

    pub fn sub_organization(mut self, sub_organization_id: i64) -> Self {
        self.sub_organization_id = FieldOverride::Set(sub_organization_id);
        self
    }

    pub fn clear_sub_organization(mut self) -> Self {
        self.sub_organization_id = FieldOverride::Clear;
        self
    }

    pub fn user(mut self, user_id: i64) -> Self {
        self.user_id = FieldOverride::Set(user_id);
        self
    }

    pub fn clear_user(mut self) -> Self {
        self.user_id = FieldOverride::Clear;
        self
    }
}

// =============================================================================
// Merger
// =============================================================================

/// Merges ambient parameters with caller overrides.
///
/// Ambient values are defaults; the override is authoritative per field,
/// including the instruction to clear a field.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextMerger;

impl ContextMerger {
    pub fn merge(
        ambient: &AuthorizationContext,
        overrides: &ContextOverride,
    ) -> AuthorizationContext {
        AuthorizationContext {
            organization_id: overrides
                .organization_id
                .apply(ambient.organization_id, OrganizationId::new),
            sub_organization_id: overrides
                .sub_organization_id
                .apply(ambient.sub_organization_id, SubOrganizationId::new),
            user_id: overrides.user_id.apply(ambient.user_id, UserId::new),
        }
    }
}
