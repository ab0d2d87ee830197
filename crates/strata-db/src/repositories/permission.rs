//! Permission store backed by PostgreSQL

use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info, instrument};

use strata_core::{
    OrganizationId, OrganizationMembership, PermissionSet, PermissionStore, Result, RoleSummary,
    StrataError, SubOrganizationId, SubOrganizationMembership, UserId,
};

use crate::config::DatabaseConfig;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// PostgreSQL implementation of PermissionStore
#[derive(Clone)]
pub struct PgPermissionStore {
    pool: PgPool,
}

impl PgPermissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool for `config` and, unless disabled, bring the schema up to date
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!(
            max_connections = config.max_connections,
            migrate = config.migrate,
            "Connecting permission store"
        );

        let pool = config
            .pool_options()
            .connect(&config.url)
            .await
            .map_err(|e| StrataError::store_failure(format!("Failed to connect: {}", e)))?;

        let store = Self::new(pool);
        if config.migrate {
            store.migrate().await?;
        }
        Ok(store)
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StrataError::store_failure(format!("Migration failed: {}", e)))?;
        info!("Permission schema is up to date");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn permissions_from_rows(rows: Vec<PgRow>) -> PermissionSet {
    rows.iter()
        .map(|row| row.get::<String, _>("permission"))
        .collect()
}

fn organization_id(raw: i64) -> Result<OrganizationId> {
    OrganizationId::new(raw)
        .ok_or_else(|| StrataError::store_failure(format!("invalid organization id {}", raw)))
}

fn sub_organization_id(raw: i64) -> Result<SubOrganizationId> {
    SubOrganizationId::new(raw).ok_or_else(|| {
        StrataError::store_failure(format!("invalid sub-organization id {}", raw))
    })
}

#[async_trait]
impl PermissionStore for PgPermissionStore {
    #[instrument(skip(self))]
    async fn system_permissions(&self, user_id: UserId) -> Result<PermissionSet> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT srp.permission
            FROM user_system_roles usr
            INNER JOIN system_role_permissions srp ON srp.system_role_id = usr.system_role_id
            WHERE usr.user_id = $1
            "#,
        )
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StrataError::store_failure(e.to_string()))?;

        Ok(permissions_from_rows(rows))
    }

    #[instrument(skip(self))]
    async fn organization_permissions(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> Result<PermissionSet> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT orp.permission
            FROM user_organization_roles uor
            INNER JOIN organization_role_permissions orp
                ON orp.organization_role_id = uor.organization_role_id
            WHERE uor.user_id = $1 AND uor.organization_id = $2
            "#,
        )
        .bind(user_id.get())
        .bind(organization_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StrataError::store_failure(e.to_string()))?;

        Ok(permissions_from_rows(rows))
    }

    #[instrument(skip(self))]
    async fn sub_organization_permissions(
        &self,
        user_id: UserId,
        sub_organization_id: SubOrganizationId,
    ) -> Result<PermissionSet> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT sorp.permission
            FROM user_sub_organization_roles usor
            INNER JOIN sub_organization_role_permissions sorp
                ON sorp.sub_organization_role_id = usor.sub_organization_role_id
            WHERE usor.user_id = $1 AND usor.sub_organization_id = $2
            "#,
        )
        .bind(user_id.get())
        .bind(sub_organization_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StrataError::store_failure(e.to_string()))?;

        Ok(permissions_from_rows(rows))
    }

    #[instrument(skip(self))]
    async fn organization_memberships(
        &self,
        user_id: UserId,
    ) -> Result<Vec<OrganizationMembership>> {
        let rows = sqlx::query(
            r#"
            SELECT o.id AS organization_id, o.name AS organization_name,
                   o.type AS organization_type, r.name AS role_name,
                   r.description AS role_description
            FROM user_organization_roles uor
            INNER JOIN organizations o ON o.id = uor.organization_id
            INNER JOIN organization_roles r ON r.id = uor.organization_role_id
            WHERE uor.user_id = $1
            ORDER BY o.id, r.name
            "#,
        )
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StrataError::store_failure(e.to_string()))?;

        let memberships = rows
            .iter()
            .map(|row| {
                Ok(OrganizationMembership {
                    organization_id: organization_id(row.get("organization_id"))?,
                    organization_name: row.get("organization_name"),
                    organization_type: row.get("organization_type"),
                    role: RoleSummary {
                        name: row.get("role_name"),
                        description: row.get("role_description"),
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(%user_id, count = memberships.len(), "listed organization memberships");
        Ok(memberships)
    }

    #[instrument(skip(self))]
    async fn sub_organization_memberships(
        &self,
        user_id: UserId,
        organization: Option<OrganizationId>,
    ) -> Result<Vec<SubOrganizationMembership>> {
        let rows = sqlx::query(
            r#"
            SELECT so.id AS sub_organization_id, so.name AS sub_organization_name,
                   so.type AS sub_organization_type, o.id AS organization_id,
                   o.name AS organization_name, r.name AS role_name,
                   r.description AS role_description
            FROM user_sub_organization_roles usor
            INNER JOIN sub_organizations so ON so.id = usor.sub_organization_id
            INNER JOIN organizations o ON o.id = so.organization_id
            INNER JOIN sub_organization_roles r ON r.id = usor.sub_organization_role_id
            WHERE usor.user_id = $1 AND ($2::BIGINT IS NULL OR so.organization_id = $2)
            ORDER BY so.id, r.name
            "#,
        )
        .bind(user_id.get())
        .bind(organization.map(OrganizationId::get))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StrataError::store_failure(e.to_string()))?;

        rows.iter()
            .map(|row| {
                Ok(SubOrganizationMembership {
                    sub_organization_id: sub_organization_id(row.get("sub_organization_id"))?,
                    sub_organization_name: row.get("sub_organization_name"),
                    sub_organization_type: row.get("sub_organization_type"),
                    organization_id: organization_id(row.get("organization_id"))?,
                    organization_name: row.get("organization_name"),
                    role: RoleSummary {
                        name: row.get("role_name"),
                        description: row.get("role_description"),
                    },
                })
            })
            .collect()
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StrataError::store_failure(e.to_string()))?;
        Ok(())
    }
}

impl std::fmt::Debug for PgPermissionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgPermissionStore")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}
