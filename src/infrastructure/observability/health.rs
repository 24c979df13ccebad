//! Health state for load balancers and monitoring.
//!
//! Response format:
//! ```json
//! {
//!   "status": "healthy",
//!   "uptime_seconds": 3600,
//!   "version": "0.1.0",
//!   "timestamp": 1234567890
//! }
//! ```

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Running but not accepting traffic yet (or draining).
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub uptime_seconds: u64,
    pub version: String,
    pub timestamp: u64,
}

pub struct HealthChecker {
    start_time: SystemTime,
    status: RwLock<HealthStatus>,
    version: String,
}

impl HealthChecker {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            start_time: SystemTime::now(),
            status: RwLock::new(HealthStatus::Degraded),
            version: version.into(),
        }
    }

    pub fn set_status(&self, status: HealthStatus) {
        *self.status.write() = status;
    }

    pub fn check_health(&self) -> HealthResponse {
        HealthResponse {
            status: *self.status.read(),
            uptime_seconds: self
                .start_time
                .elapsed()
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or(0),
            version: self.version.clone(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|since| since.as_secs())
                .unwrap_or(0),
        }
    }

    /// Ready to accept traffic.
    pub fn check_readiness(&self) -> bool {
        *self.status.read() == HealthStatus::Healthy
    }

    /// Process is alive; only a hard failure flips this.
    pub fn check_liveness(&self) -> bool {
        *self.status.read() != HealthStatus::Unhealthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_degraded_until_marked_ready() {
        let checker = HealthChecker::new("0.1.0");
        assert!(!checker.check_readiness());
        assert!(checker.check_liveness());

        checker.set_status(HealthStatus::Healthy);
        assert!(checker.check_readiness());
    }

    #[test]
    fn test_unhealthy_fails_liveness() {
        let checker = HealthChecker::new("0.1.0");
        checker.set_status(HealthStatus::Unhealthy);
        assert!(!checker.check_liveness());
        assert!(!checker.check_readiness());
    }

    #[test]
    fn test_health_response_shape() {
        let checker = HealthChecker::new("9.9.9");
        checker.set_status(HealthStatus::Healthy);

        let response = checker.check_health();
        assert_eq!(response.status, HealthStatus::Healthy);
        assert_eq!(response.version, "9.9.9");
        assert!(response.timestamp > 0);

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
    }
}
