//! Health check handlers
//!
//! Follows Kubernetes health check patterns:
//! - /health - comprehensive status
//! - /health/live - simple liveness (is the process running?)
//! - /health/ready - readiness (can the permission store answer?)

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use strata_core::PermissionStore;

use crate::state::AppState;

/// Overall health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Individual component health
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub latency_ms: u64,
}

/// Comprehensive health response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: Vec<ComponentHealth>,
}

/// Simple health response for liveness/readiness probes
#[derive(Serialize)]
pub struct SimpleHealthResponse {
    pub status: String,
}

/// Start time for uptime calculation
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

fn get_uptime_seconds() -> u64 {
    let start = START_TIME.get_or_init(Instant::now);
    start.elapsed().as_secs()
}

/// Comprehensive health check
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store_health = check_store(&state, Duration::from_secs(5)).await;
    let status = store_health.status;

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: get_uptime_seconds(),
        components: vec![store_health],
    };

    let status_code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(response))
}

async fn check_store(state: &AppState, timeout: Duration) -> ComponentHealth {
    let start = Instant::now();

    let (status, message) =
        match tokio::time::timeout(timeout, state.store().health_check()).await {
            Ok(Ok(())) => {
                debug!("Permission store health check passed");
                (HealthStatus::Healthy, None)
            }
            Ok(Err(e)) => {
                warn!("Permission store health check failed: {}", e);
                (HealthStatus::Unhealthy, Some(e.to_string()))
            }
            Err(_) => {
                warn!("Permission store health check timed out");
                (
                    HealthStatus::Unhealthy,
                    Some(format!("Health check timed out after {:?}", timeout)),
                )
            }
        };

    ComponentHealth {
        name: "permission_store".to_string(),
        status,
        message,
        latency_ms: start.elapsed().as_millis() as u64,
    }
}

/// Kubernetes liveness probe
pub async fn liveness() -> (StatusCode, Json<SimpleHealthResponse>) {
    (
        StatusCode::OK,
        Json(SimpleHealthResponse {
            status: "alive".to_string(),
        }),
    )
}

/// Kubernetes readiness probe
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<SimpleHealthResponse>) {
    let store = check_store(&state, Duration::from_secs(2)).await;

    if store.status == HealthStatus::Healthy {
        (
            StatusCode::OK,
            Json(SimpleHealthResponse {
                status: "ready".to_string(),
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(SimpleHealthResponse {
                status: "not ready: permission_store unavailable".to_string(),
            }),
        )
    }
}
