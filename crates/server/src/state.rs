//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use receptionist_config::Settings;

use crate::registry::SessionRegistry;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Validated settings, fixed for the process lifetime
    pub settings: Arc<Settings>,
    pub registry: Arc<SessionRegistry>,
    /// `None` when metrics are disabled or the recorder could not be installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(settings: Settings, registry: Arc<SessionRegistry>) -> Self {
        Self {
            settings: Arc::new(settings),
            registry,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }
}
