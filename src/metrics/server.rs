//! HTTP endpoint exposing acquisition metrics.
//!
//! `/metrics` serves the Prometheus text format and `/health` a one-word
//! acquisition state (`OK` or `CALIBRATING`) for simple probes.

use crate::metrics::MetricsRegistry;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::CorsLayer;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind metrics endpoint: {0}")]
    Bind(#[from] std::io::Error),

    #[error("metrics endpoint failed: {0}")]
    Server(String),
}

/// Where the endpoint listens. Loopback only.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    pub bind_addr: SocketAddr,
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([127, 0, 0, 1], 9090).into(),
        }
    }
}

impl MetricsServerConfig {
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: ([127, 0, 0, 1], port).into(),
        }
    }
}

/// Serves a registry shared with the running session.
pub struct MetricsServer {
    config: MetricsServerConfig,
    registry: Arc<MetricsRegistry>,
}

impl MetricsServer {
    /// The session keeps a clone of `registry` and updates it as frames
    /// arrive.
    pub fn new(config: MetricsServerConfig, registry: MetricsRegistry) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .layer(CorsLayer::permissive())
            .with_state(Arc::clone(&self.registry))
    }

    /// Serves requests until the listener fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!(addr = %self.config.bind_addr, "Metrics endpoint listening");

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Server(e.to_string()))?;

        Ok(())
    }

    /// Runs the server on a dedicated thread so the acquisition loop stays
    /// synchronous.
    pub fn spawn(self) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::error!(error = %e, "Metrics endpoint not started");
                    return;
                }
            };
            if let Err(e) = runtime.block_on(self.run()) {
                tracing::error!(error = %e, "Metrics endpoint stopped");
            }
        })
    }
}

async fn metrics_handler(State(registry): State<Arc<MetricsRegistry>>) -> impl IntoResponse {
    match registry.encode() {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {}", e),
        ),
    }
}

async fn health_handler(State(registry): State<Arc<MetricsRegistry>>) -> impl IntoResponse {
    (StatusCode::OK, acquisition_state(&registry))
}

fn acquisition_state(registry: &MetricsRegistry) -> &'static str {
    if registry.calibration_active() {
        "CALIBRATING"
    } else {
        "OK"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::metrics::MetricsSnapshot;

    #[test]
    fn test_config_binds_loopback() {
        let config = MetricsServerConfig::with_port(9184);
        assert_eq!(config.bind_addr.port(), 9184);
        assert!(config.bind_addr.ip().is_loopback());
        assert_eq!(MetricsServerConfig::default().bind_addr.port(), 9090);
    }

    #[test]
    fn test_health_reports_calibration() {
        let registry = MetricsRegistry::new().unwrap();
        assert_eq!(acquisition_state(&registry), "OK");

        registry.update(&MetricsSnapshot {
            calibration_active: true,
            calibration_index: Some(2),
            ..Default::default()
        });
        assert_eq!(acquisition_state(&registry), "CALIBRATING");
    }
}
