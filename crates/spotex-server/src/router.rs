use std::sync::Arc;

use axum::{Router, routing::get};
use spotex_common::error::{Result, SpotexError};
use spotex_metrics::MetricsRegistry;
use tower_http::trace::TraceLayer;

use crate::handlers;

pub struct ExporterState {
    pub registry: Arc<MetricsRegistry>,
    pub telemetry_path: String,
}

impl ExporterState {
    pub fn new(registry: Arc<MetricsRegistry>, telemetry_path: impl Into<String>) -> Result<Self> {
        let telemetry_path = telemetry_path.into();
        validate_telemetry_path(&telemetry_path)?;
        Ok(Self {
            registry,
            telemetry_path,
        })
    }
}

pub fn exporter_router(state: Arc<ExporterState>) -> Router {
    Router::new()
        .route("/", get(handlers::landing_page))
        .route(&state.telemetry_path, get(handlers::prometheus_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn validate_telemetry_path(path: &str) -> Result<()> {
    if !path.starts_with('/') || path == "/" {
        return Err(SpotexError::InvalidArgument(format!(
            "telemetry path must start with '/' and differ from the landing page: {path:?}"
        )));
    }
    if path.contains(['{', '}', '*']) {
        return Err(SpotexError::InvalidArgument(format!(
            "telemetry path must be a literal path: {path:?}"
        )));
    }
    Ok(())
}
