//! Caching decorator for permission stores
//!
//! - Moka async cache per scope, keyed by (user, scope id)
//! - TTL-bounded staleness; `invalidate_all` after administrative changes
//! - Membership listings pass straight through

use async_trait::async_trait;
use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::ids::*;
use crate::models::*;
use crate::traits::PermissionStore;

/// Configuration for the cached store
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached permission sets per scope
    pub max_capacity: u64,
    /// TTL for cached permission sets (default: 30 seconds)
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            ttl: Duration::from_secs(30),
        }
    }
}

/// Cache metrics for monitoring
#[derive(Debug, Default)]
pub struct CacheMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub invalidations: AtomicU64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Permission store wrapper that memoizes scoped permission sets.
///
/// The resolver still asks for scopes in system → organization →
/// sub-organization order; the cache only makes individual answers cheaper.
pub struct CachedPermissionStore<S> {
    inner: S,
    system: Cache<UserId, PermissionSet>,
    organization: Cache<(UserId, OrganizationId), PermissionSet>,
    sub_organization: Cache<(UserId, SubOrganizationId), PermissionSet>,
    metrics: Arc<CacheMetrics>,
}

impl<S> CachedPermissionStore<S>
where
    S: PermissionStore,
{
    pub fn new(inner: S, config: CacheConfig) -> Self {
        Self {
            inner,
            system: build_cache(&config),
            organization: build_cache(&config),
            sub_organization: build_cache(&config),
            metrics: Arc::new(CacheMetrics::default()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Drop every cached permission set
    pub fn invalidate_all(&self) {
        self.system.invalidate_all();
        self.organization.invalidate_all();
        self.sub_organization.invalidate_all();
        self.metrics.invalidations.fetch_add(1, Ordering::Relaxed);
        info!("Invalidated permission cache");
    }

    fn record(&self, hit: bool, scope: Scope) {
        if hit {
            self.metrics.hits.fetch_add(1, Ordering::Relaxed);
            debug!(%scope, "permission cache hit");
        } else {
            self.metrics.misses.fetch_add(1, Ordering::Relaxed);
            debug!(%scope, "permission cache miss");
        }
    }
}

fn build_cache<K, V>(config: &CacheConfig) -> Cache<K, V>
where
    K: std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    Cache::builder()
        .max_capacity(config.max_capacity)
        .time_to_live(config.ttl)
        .build()
}

#[async_trait]
impl<S> PermissionStore for CachedPermissionStore<S>
where
    S: PermissionStore,
{
    #[instrument(skip(self))]
    async fn system_permissions(&self, user_id: UserId) -> Result<PermissionSet> {
        if let Some(cached) = self.system.get(&user_id).await {
            self.record(true, Scope::System);
            return Ok(cached);
        }
        self.record(false, Scope::System);
        let permissions = self.inner.system_permissions(user_id).await?;
        self.system.insert(user_id, permissions.clone()).await;
        Ok(permissions)
    }

    #[instrument(skip(self))]
    async fn organization_permissions(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> Result<PermissionSet> {
        let key = (user_id, organization_id);
        if let Some(cached) = self.organization.get(&key).await {
            self.record(true, Scope::Organization);
            return Ok(cached);
        }
        self.record(false, Scope::Organization);
        let permissions = self
            .inner
            .organization_permissions(user_id, organization_id)
            .await?;
        self.organization.insert(key, permissions.clone()).await;
        Ok(permissions)
    }

    #[instrument(skip(self))]
    async fn sub_organization_permissions(
        &self,
        user_id: UserId,
        sub_organization_id: SubOrganizationId,
    ) -> Result<PermissionSet> {
        let key = (user_id, sub_organization_id);
        if let Some(cached) = self.sub_organization.get(&key).await {
            self.record(true, Scope::SubOrganization);
            return Ok(cached);
        }
        self.record(false, Scope::SubOrganization);
        let permissions = self
            .inner
            .sub_organization_permissions(user_id, sub_organization_id)
            .await?;
        self.sub_organization.insert(key, permissions.clone()).await;
        Ok(permissions)
    }

    async fn organization_memberships(
        &self,
        user_id: UserId,
    ) -> Result<Vec<OrganizationMembership>> {
        self.inner.organization_memberships(user_id).await
    }

    async fn sub_organization_memberships(
        &self,
        user_id: UserId,
        organization_id: Option<OrganizationId>,
    ) -> Result<Vec<SubOrganizationMembership>> {
        self.inner
            .sub_organization_memberships(user_id, organization_id)
            .await
    }

    async fn health_check(&self) -> Result<()> {
        self.inner.health_check().await
    }
}

impl<S> std::fmt::Debug for CachedPermissionStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.system.entry_count()
            + self.organization.entry_count()
            + self.sub_organization.entry_count();
        f.debug_struct("CachedPermissionStore")
            .field("cache_size", &entries)
            .field("hit_rate", &format!("{:.1}%", self.metrics.hit_rate() * 100.0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_metrics() {
        let metrics = CacheMetrics::default();
        assert_eq!(metrics.hit_rate(), 0.0);

        metrics.hits.fetch_add(3, Ordering::Relaxed);
        metrics.misses.fetch_add(1, Ordering::Relaxed);

        assert_eq!(metrics.hit_rate(), 0.75);
    }

    #[test]
    fn test_cache_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.max_capacity, 10_000);
        assert_eq!(config.ttl, Duration::from_secs(30));
    }
}
