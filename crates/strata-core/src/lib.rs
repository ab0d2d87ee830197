//! Strata Core - three-tier permission resolution for organizational hierarchies

pub mod cache;
pub mod context;
pub mod error;
pub mod gate;
pub mod ids;
pub mod memory;
pub mod models;
pub mod resolver;
pub mod traits;


pub use cache::{CacheConfig, CachedPermissionStore};
pub use context::*;
pub use error::*;
pub use gate::{AuthorizationGate, DenialReason, GateDecision};
pub use ids::*;
pub use memory::{Fixture, InMemoryPermissionStore};
pub use models::*;
pub use resolver::PermissionResolver;
pub use traits::*;

pub use tokio_util::sync::CancellationToken;
