//! Application state for API handlers

use std::sync::Arc;

use strata_core::{AuthorizationGate, PermissionResolver, PermissionStore};

/// Store handle shared by every request
pub type SharedStore = Arc<dyn PermissionStore>;

/// How denials and diagnostics routes behave
#[derive(Debug, Clone)]
pub struct GateSettings {
    /// When set, denied browser requests are redirected here instead of
    /// receiving a JSON error
    pub login_redirect: Option<String>,
    /// System permission required for the per-user diagnostics routes
    pub diagnostics_permission: String,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            login_redirect: None,
            diagnostics_permission: "system:admin".to_string(),
        }
    }
}

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub gate: AuthorizationGate<SharedStore>,
    pub settings: Arc<GateSettings>,
}

impl AppState {
    pub fn new(store: SharedStore, settings: GateSettings) -> Self {
        let resolver = Arc::new(PermissionResolver::new(store));
        Self {
            gate: AuthorizationGate::new(resolver),
            settings: Arc::new(settings),
        }
    }

    pub fn resolver(&self) -> &PermissionResolver<SharedStore> {
        self.gate.resolver()
    }

    pub fn store(&self) -> &SharedStore {
        self.resolver().store()
    }
}
