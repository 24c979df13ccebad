/// CLI Interface Module
///
/// Entry point when the scheduler runs as a standalone process: parses the
/// configuration surface, pre-populates the store, drives the request stream
/// through the scheduler and reports throughput on the way out.
///
/// The upstream consensus feed and the reply transport are not part of this
/// crate, so the CLI stands in for both: requests come from a file or a
/// synthetic generator, replies drain into a counting loop.

use crate::application::services::{Scheduler, SchedulerConfig};
use crate::domain::partitioning::CutMethod;
use crate::infrastructure::network::ChannelReplySink;
use crate::infrastructure::observability::{HealthStatus, ObservabilityServer};
use crate::infrastructure::workload::{
    self, generate_requests, initial_load, KeyDistribution, WorkloadSpec,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Key-partitioned request scheduler over an in-memory KV store.
#[derive(Parser, Debug, Clone)]
#[command(name = "kv-scheduler")]
#[command(version)]
#[command(about = "Workload-adaptive key-partitioned request scheduler", long_about = None)]
pub struct CliConfig {
    /// Number of partitions (0 = auto-detect CPU core count)
    #[arg(short = 'n', long)]
    pub partitions: usize,

    /// Repartition method
    #[arg(short = 'm', long, default_value = "ROUND_ROBIN")]
    pub method: String,

    /// Requests between repartitions (0 disables repartitioning)
    #[arg(short = 'i', long, default_value_t = 0)]
    pub repartition_interval: u64,

    /// Request file with type,key,args triples
    #[arg(short = 'r', long)]
    pub requests: Option<PathBuf>,

    /// Pre-create keys [0, N) with the template value
    #[arg(long, default_value_t = 0)]
    pub initial_keys: usize,

    /// Generate a synthetic uniform workload of N requests when no request
    /// file is given
    #[arg(short = 'g', long, default_value_t = 0)]
    pub generate: usize,

    /// Sampling rate for per-request latency logs, in percent
    #[arg(long, default_value_t = 0)]
    pub print_percentage: u32,

    /// Queue capacity per partition
    #[arg(short = 'q', long, default_value_t = 10_000)]
    pub queue_capacity: usize,

    /// Port for the Prometheus/health HTTP server (0 disables it)
    #[arg(long, default_value_t = 0)]
    pub metrics_port: u16,

    /// Log level
    #[arg(short = 'l', long, default_value = "info", value_parser = ["trace", "debug", "info", "warn", "error"])]
    pub log_level: String,

    /// Print the resolved configuration and exit
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

/// Runs the CLI application. Returns the process exit code: 0 on a clean
/// drain, 1 on configuration, workload or solver errors.
pub fn run() -> i32 {
    let config = CliConfig::parse();
    execute(config)
}

fn execute(config: CliConfig) -> i32 {
    init_logging(&config.log_level);

    let method: CutMethod = match config.method.parse() {
        Ok(method) => method,
        Err(error) => {
            tracing::error!(%error, "invalid configuration");
            return 1;
        }
    };

    let n_partitions = if config.partitions == 0 {
        let cpus = num_cpus::get();
        tracing::info!(cpus, "auto-detected partition count");
        cpus
    } else {
        config.partitions
    };

    let mut scheduler_config = SchedulerConfig::new(n_partitions);
    scheduler_config.cut_method = method;
    scheduler_config.repartition_interval = config.repartition_interval;
    scheduler_config.queue_capacity = config.queue_capacity;
    scheduler_config.print_percentage = config.print_percentage;

    tracing::info!(
        partitions = n_partitions,
        method = method.label(),
        interval = config.repartition_interval,
        initial_keys = config.initial_keys,
        "resolved configuration"
    );
    if config.dry_run {
        return 0;
    }

    let requests = match &config.requests {
        Some(path) => match workload::load_requests(path) {
            Ok(requests) => requests,
            Err(error) => {
                tracing::error!(%error, "failed to load request file");
                return 1;
            }
        },
        None => {
            let spec = WorkloadSpec {
                n_requests: config.generate,
                write_ratio: 0.5,
                scan_ratio: 0.05,
                scan_length: 4,
                keys: KeyDistribution::Uniform {
                    min: 0,
                    max: config.initial_keys.max(1) as i32 - 1,
                },
                seed: 42,
            };
            generate_requests(&spec)
        }
    };

    let (sink, replies) = ChannelReplySink::new();
    let mut scheduler = match Scheduler::new(scheduler_config, Arc::new(sink)) {
        Ok(scheduler) => scheduler,
        Err(error) => {
            tracing::error!(%error, "failed to start scheduler");
            return 1;
        }
    };

    let health = if config.metrics_port != 0 {
        let server = ObservabilityServer::new(config.metrics_port);
        let checker = server.health_checker();
        server.spawn();
        checker.set_status(HealthStatus::Healthy);
        Some(checker)
    } else {
        None
    };

    // Drain replies concurrently so full partition queues never deadlock the
    // admission loop.
    let drain = thread::Builder::new()
        .name("reply-drain".to_string())
        .spawn(move || {
            let mut count: u64 = 0;
            while replies.recv().is_ok() {
                count += 1;
            }
            count
        })
        .expect("failed to spawn reply drain thread");

    let started = Instant::now();
    for request in initial_load(config.initial_keys) {
        scheduler.schedule_and_answer(request);
    }
    for request in requests {
        scheduler.schedule_and_answer(request);
    }

    let admitted = scheduler.dispatched_count();
    if let Some(checker) = &health {
        checker.set_status(HealthStatus::Degraded);
    }
    let timestamp_logs = scheduler.shutdown();
    let elapsed = started.elapsed();
    let replied = drain.join().unwrap_or(0);

    let throughput = if elapsed.as_secs_f64() > 0.0 {
        (replied as f64 / elapsed.as_secs_f64()) as u64
    } else {
        0
    };
    tracing::info!(
        admitted,
        replied,
        elapsed_ms = elapsed.as_millis() as u64,
        requests_per_sec = throughput,
        recorded_timestamps = timestamp_logs.iter().map(Vec::len).sum::<usize>(),
        "drained cleanly"
    );

    0
}

/// Initialises the tracing subscriber; `RUST_LOG` wins over `--log-level`.
fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // A second init in the same process (tests) is fine to ignore.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
