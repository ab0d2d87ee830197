//! PostgreSQL permission store for Strata

pub mod config;
pub mod repositories;

pub use config::DatabaseConfig;
pub use repositories::*;
