#[cfg(feature = "server")]
use axum::{http::StatusCode, response::IntoResponse};
#[cfg(feature = "server")]
use metrics::{counter, histogram};
#[cfg(feature = "server")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
#[cfg(feature = "server")]
use std::sync::OnceLock;

#[cfg(feature = "server")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

#[cfg(feature = "server")]
pub fn init_metrics() {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Metrics recorder already installed");
                return;
            }

            // Initialize metrics with zero values
            counter!("dvp_predictions_total", "outcome" => "success").absolute(0);
            counter!("dvp_availability_resolutions_total", "tier" => "digest").absolute(0);
            counter!("dvp_webhook_events_total", "event_type" => "unknown").absolute(0);
            counter!("dvp_errors_total", "error_type" => "unknown").absolute(0);
            histogram!("dvp_prediction_duration_seconds").record(0.0);
        }
        Err(e) => {
            tracing::error!("Failed to install metrics recorder: {}", e);
        }
    }
}

/// Counts which availability tier produced the answer.
pub fn increment_tier_resolutions(tier: &'static str) {
    #[cfg(feature = "server")]
    counter!("dvp_availability_resolutions_total", "tier" => tier).increment(1);
    #[cfg(not(feature = "server"))]
    let _ = tier;
}

pub fn increment_predictions(outcome: &'static str) {
    #[cfg(feature = "server")]
    counter!("dvp_predictions_total", "outcome" => outcome).increment(1);
    #[cfg(not(feature = "server"))]
    let _ = outcome;
}

pub fn increment_webhook_events(event_type: &str) {
    #[cfg(feature = "server")]
    counter!("dvp_webhook_events_total", "event_type" => event_type.to_string()).increment(1);
    #[cfg(not(feature = "server"))]
    let _ = event_type;
}

pub fn increment_errors(error_type: &'static str) {
    #[cfg(feature = "server")]
    counter!("dvp_errors_total", "error_type" => error_type).increment(1);
    #[cfg(not(feature = "server"))]
    let _ = error_type;
}

pub fn record_prediction_time(duration_ms: u64) {
    #[cfg(feature = "server")]
    histogram!("dvp_prediction_duration_seconds").record(duration_ms as f64 / 1000.0);
    #[cfg(not(feature = "server"))]
    let _ = duration_ms;
}

#[cfg(feature = "server")]
pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::SERVICE_UNAVAILABLE, "Metrics not initialized".to_string()),
    }
}
