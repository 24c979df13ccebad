//! Prometheus metrics for the scheduler core.
//!
//! One global registry, initialised lazily on first touch. Everything is
//! labelled so a single instance can serve any partition count.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    CounterVec, Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};

lazy_static! {
    /// Global metrics instance.
    pub static ref METRICS: Metrics = Metrics::new();
}

pub struct Metrics {
    /// Admitted requests by kind (read/write/scan/error).
    pub requests_total: CounterVec,

    /// Requests executed per partition.
    pub executed_total: CounterVec,

    /// Requests that referenced unmapped keys and were answered with ERROR.
    pub routing_errors_total: CounterVec,

    /// Cross-partition requests that went through the barrier protocol.
    pub multi_partition_total: CounterVec,

    /// Completed repartitions by cut method.
    pub repartitions_total: CounterVec,

    /// Edge weight crossing partitions after the latest repartition.
    pub edge_cut: Gauge,

    /// Keys owned per partition.
    pub partition_members: GaugeVec,

    /// Requests waiting in each partition queue.
    pub queue_depth: GaugeVec,

    /// Sampled request execution latency in microseconds.
    pub execution_duration: HistogramVec,
}

impl Metrics {
    fn new() -> Self {
        Self {
            requests_total: register_counter_vec!(
                "kv_scheduler_requests_total",
                "Total number of admitted requests",
                &["kind"]
            )
            .unwrap(),

            executed_total: register_counter_vec!(
                "kv_scheduler_executed_total",
                "Total number of requests executed per partition",
                &["partition"]
            )
            .unwrap(),

            routing_errors_total: register_counter_vec!(
                "kv_scheduler_routing_errors_total",
                "Requests rejected because a key was not mapped",
                &["kind"]
            )
            .unwrap(),

            multi_partition_total: register_counter_vec!(
                "kv_scheduler_multi_partition_total",
                "Requests that spanned more than one partition",
                &["kind"]
            )
            .unwrap(),

            repartitions_total: register_counter_vec!(
                "kv_scheduler_repartitions_total",
                "Completed repartition sequences",
                &["method", "outcome"]
            )
            .unwrap(),

            edge_cut: register_gauge!(
                "kv_scheduler_edge_cut",
                "Co-access weight crossing partition boundaries after the last cut"
            )
            .unwrap(),

            partition_members: register_gauge_vec!(
                "kv_scheduler_partition_members",
                "Number of keys owned by each partition",
                &["partition"]
            )
            .unwrap(),

            queue_depth: register_gauge_vec!(
                "kv_scheduler_queue_depth",
                "Requests waiting in each partition queue",
                &["partition"]
            )
            .unwrap(),

            execution_duration: register_histogram_vec!(
                "kv_scheduler_execution_duration_microseconds",
                "Sampled request execution latency in microseconds",
                &["kind"],
                vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0]
            )
            .unwrap(),
        }
    }

    /// Renders the registry in the Prometheus text format.
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let families = prometheus::gather();
        let mut buffer = Vec::new();
        if encoder.encode(&families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once() {
        METRICS.requests_total.with_label_values(&["read"]).inc();
        METRICS.executed_total.with_label_values(&["0"]).inc();

        let text = METRICS.gather();
        assert!(text.contains("kv_scheduler_requests_total"));
    }
}
