//! API request handlers

pub mod health;
pub mod permissions;

pub use health::{health_check, liveness, readiness};
