//! Observability endpoints: Prometheus export and health probes.

pub mod health;
pub mod http_server;

pub use health::{HealthChecker, HealthResponse, HealthStatus};
pub use http_server::ObservabilityServer;
