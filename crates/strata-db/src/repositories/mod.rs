//! Repository implementations for PostgreSQL

pub mod permission;

pub use permission::*;
