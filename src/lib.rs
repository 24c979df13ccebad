// Global allocator: jemalloc noticeably outperforms the system allocator
// under many concurrent partition workers.
#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

// ===================================================================
// Layered Architecture
// ===================================================================
//
// Dependencies flow one way:
// interfaces → application → domain ← infrastructure

/// Domain Layer - storage, workload graph, graph-cut engines
pub mod domain;

/// Application Layer - scheduler, partition workers, pattern tracker
pub mod application;

/// Infrastructure Layer - wire codecs, reply sink, workload input
pub mod infrastructure;

/// Shared - protocol types and cross-layer utilities
pub mod shared;

/// Interfaces - external entry points (CLI)
pub mod interfaces;

// ===================================================================
// Convenience Re-exports
// ===================================================================

// Domain core types
pub use domain::{CutMethod, Storage, WorkloadGraph};

// Application services
pub use application::{Scheduler, SchedulerConfig, SchedulerError};

// Infrastructure seams
pub use infrastructure::network::{ChannelReplySink, LogReplySink, ReplySink};

// Shared protocol
pub use shared::protocol::{ClientMessage, Key, ReplyMessage, RequestType};
