//! Strata API - HTTP surface for the permission resolver
//!
//! - Permission checks and per-user diagnostics over JSON
//! - Caller identity from the `X-User-Id` header
//! - Route guards backed by the authorization gate
//! - Request ID tracing

pub mod dto;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

#[cfg(test)]
mod tests;

pub use middleware::{denial_response, AuthenticatedUser, GuardScope, PermissionGuard};
pub use routes::{create_router, guard_routes};
pub use state::{AppState, GateSettings, SharedStore};
