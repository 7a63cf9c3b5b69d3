//! Prometheus metrics
//!
//! The recorder is process-global; `init_metrics` installs it once and the
//! `/metrics` route renders it. Without a recorder the macros are no-ops.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use receptionist_core::Frame;
use receptionist_pipeline::FrameObserver;

use crate::state::AppState;

/// Install the Prometheus recorder
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            tracing::info!("Prometheus metrics recorder installed");
            Some(handle)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install metrics recorder");
            None
        }
    }
}

pub fn record_sessions_active(count: usize) {
    metrics::gauge!("receptionist_sessions_active").set(count as f64);
}

pub fn record_offer(success: bool) {
    let outcome = if success { "created" } else { "failed" };
    metrics::counter!("receptionist_offers_total", "outcome" => outcome).increment(1);
}

pub fn record_renegotiation(restart: bool, success: bool) {
    let outcome = if success { "ok" } else { "failed" };
    let restart = if restart { "true" } else { "false" };
    metrics::counter!(
        "receptionist_renegotiations_total",
        "restart" => restart,
        "outcome" => outcome
    )
    .increment(1);
}

/// Counts completed turns and error frames leaving the pipeline
pub fn frame_observer() -> FrameObserver {
    Arc::new(|frame: &Frame| match frame {
        Frame::TurnEnd => metrics::counter!("receptionist_turns_total").increment(1),
        Frame::Error {
            stage, recoverable, ..
        } => metrics::counter!(
            "receptionist_turn_errors_total",
            "stage" => stage.clone(),
            "recoverable" => if *recoverable { "true" } else { "false" }
        )
        .increment(1),
        _ => {}
    })
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain")],
            "metrics disabled".to_string(),
        ),
    }
}
