//! Server configuration

use anyhow::{bail, Result};
use serde::Deserialize;
use std::time::Duration;

use strata_api::GateSettings;
use strata_core::CacheConfig;
use strata_db::DatabaseConfig;

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub gate: GateConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Which permission store backs the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Default, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: StorageBackend,
    /// JSON fixture seeding the memory backend
    #[serde(default)]
    pub fixture: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_migrate")]
    pub migrate: bool,
}

#[derive(Debug, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,
}

#[derive(Debug, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub login_redirect: Option<String>,
    #[serde(default = "default_diagnostics_permission")]
    pub diagnostics_permission: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_database_url() -> String {
    DatabaseConfig::default().url
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_migrate() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    30
}

fn default_cache_capacity() -> u64 {
    10_000
}

fn default_diagnostics_permission() -> String {
    "system:admin".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            migrate: default_migrate(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: default_cache_ttl(),
            max_capacity: default_cache_capacity(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            login_redirect: None,
            diagnostics_permission: default_diagnostics_permission(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            // Load from config file if present
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            // Load from environment variables with STRATA_ prefix
            .add_source(
                config::Environment::with_prefix("STRATA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::from_config(config)
    }

    fn from_config(config: config::Config) -> Result<Self> {
        let settings: Self = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.gate.diagnostics_permission.trim().is_empty() {
            bail!("gate.diagnostics_permission must not be empty");
        }
        if self.storage.fixture.is_some() && self.storage.backend != StorageBackend::Memory {
            bail!("storage.fixture is only used by the memory backend");
        }
        if self.database.max_connections == 0 {
            bail!("database.max_connections must be positive");
        }
        if self.cache.enabled && self.cache.ttl_secs == 0 {
            bail!("cache.ttl_secs must be positive when the cache is enabled");
        }
        Ok(())
    }

    pub fn database_config(&self) -> DatabaseConfig {
        let idle_timeout = match self.database.idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        DatabaseConfig {
            url: self.database.url.clone(),
            max_connections: self.database.max_connections,
            min_connections: self.database.min_connections,
            acquire_timeout: Duration::from_secs(self.database.acquire_timeout_secs),
            idle_timeout,
            migrate: self.database.migrate,
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_capacity: self.cache.max_capacity,
            ttl: Duration::from_secs(self.cache.ttl_secs),
        }
    }

    pub fn gate_settings(&self) -> GateSettings {
        GateSettings {
            login_redirect: self.gate.login_redirect.clone(),
            diagnostics_permission: self.gate.diagnostics_permission.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{Config, File, FileFormat};

    fn parse(toml: &str) -> Result<Settings> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Settings::from_config(config)
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let settings = parse("").unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.storage.backend, StorageBackend::Postgres);
        assert!(!settings.cache.enabled);
        assert_eq!(settings.gate.diagnostics_permission, "system:admin");
        let database = settings.database_config();
        assert_eq!(database.min_connections, 2);
        assert_eq!(database.acquire_timeout, Duration::from_secs(30));
        assert!(database.migrate);
    }

    #[test]
    fn test_memory_backend_with_fixture() {
        let settings = parse(
            r#"
            [storage]
            backend = "memory"
            fixture = "fixtures/dev.json"

            [cache]
            enabled = true
            ttl_secs = 5

            [gate]
            login_redirect = "/login"
            "#,
        )
        .unwrap();

        assert_eq!(settings.storage.backend, StorageBackend::Memory);
        assert_eq!(settings.cache_config().ttl, Duration::from_secs(5));
        assert_eq!(
            settings.gate_settings().login_redirect.as_deref(),
            Some("/login")
        );
    }

    #[test]
    fn test_fixture_requires_memory_backend() {
        let result = parse(
            r#"
            [storage]
            fixture = "fixtures/dev.json"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let result = parse(
            r#"
            [storage]
            backend = "redis"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_database_settings_convert() {
        let settings = parse(
            r#"
            [database]
            url = "postgres://app@db/permissions"
            idle_timeout_secs = 0
            migrate = false
            "#,
        )
        .unwrap();

        let database = settings.database_config();
        assert_eq!(database.url, "postgres://app@db/permissions");
        assert_eq!(database.idle_timeout, None);
        assert!(!database.migrate);
    }
}
