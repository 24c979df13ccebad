//! HTTP observability server.
//!
//! Endpoints:
//! - `GET /metrics` - Prometheus text format
//! - `GET /health` - health report
//! - `GET /health/ready` - readiness probe
//! - `GET /health/live` - liveness probe
//!
//! The scheduler core is plain threads; this server is the one async
//! component and runs on its own single-threaded runtime so the two worlds
//! never share an executor.

use super::health::{HealthChecker, HealthStatus};
use crate::shared::metrics::METRICS;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

pub struct ObservabilityServer {
    addr: SocketAddr,
    health_checker: Arc<HealthChecker>,
}

impl ObservabilityServer {
    pub fn new(port: u16) -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], port)),
            health_checker: Arc::new(HealthChecker::new(env!("CARGO_PKG_VERSION"))),
        }
    }

    pub fn health_checker(&self) -> Arc<HealthChecker> {
        Arc::clone(&self.health_checker)
    }

    /// Serves until the process exits.
    pub async fn run(self) -> Result<(), std::io::Error> {
        let app = router(Arc::clone(&self.health_checker));

        tracing::info!(addr = %self.addr, "observability server listening");
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, app).await
    }

    /// Spawns the server on a dedicated thread with its own runtime and
    /// returns immediately.
    pub fn spawn(self) {
        let addr = self.addr;
        if let Err(error) = thread::Builder::new()
            .name("observability".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(error) => {
                        tracing::error!(%error, "failed to build observability runtime");
                        return;
                    }
                };
                if let Err(error) = runtime.block_on(self.run()) {
                    tracing::error!(%error, %addr, "observability server stopped");
                }
            })
        {
            tracing::error!(%error, "failed to spawn observability thread");
        }
    }
}

fn router(health_checker: Arc<HealthChecker>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/health/ready", get(readiness_handler))
        .route("/health/live", get(liveness_handler))
        .with_state(health_checker)
}

async fn metrics_handler() -> Response {
    (StatusCode::OK, METRICS.gather()).into_response()
}

async fn health_handler(State(checker): State<Arc<HealthChecker>>) -> Response {
    let response = checker.check_health();
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response)).into_response()
}

async fn readiness_handler(State(checker): State<Arc<HealthChecker>>) -> Response {
    if checker.check_readiness() {
        StatusCode::OK.into_response()
    } else {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
}

async fn liveness_handler(State(checker): State<Arc<HealthChecker>>) -> Response {
    if checker.check_liveness() {
        StatusCode::OK.into_response()
    } else {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_binds_requested_port() {
        let server = ObservabilityServer::new(9090);
        assert_eq!(server.addr.port(), 9090);
    }

    #[tokio::test]
    async fn test_metrics_handler_serves_text() {
        // Touch a metric so the export is non-trivial.
        METRICS.requests_total.with_label_values(&["read"]).inc();
        let response = metrics_handler().await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_probes_follow_health_state() {
        let checker = Arc::new(HealthChecker::new("0.1.0"));

        let response = readiness_handler(State(Arc::clone(&checker))).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        checker.set_status(HealthStatus::Healthy);
        let response = readiness_handler(State(Arc::clone(&checker))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = liveness_handler(State(checker)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_handler_reports_json() {
        let checker = Arc::new(HealthChecker::new("0.1.0"));
        checker.set_status(HealthStatus::Healthy);
        let response = health_handler(State(checker)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
