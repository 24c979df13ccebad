/// Infrastructure Layer - Technical Implementations
///
/// Everything that touches the outside world: the wire codecs and the reply
/// sink seam towards the transport, and the workload file loaders. The
/// domain layer never depends on anything in here.

pub mod network;
pub mod observability;
pub mod workload;

// Re-export key types
pub use network::{ChannelReplySink, Codec, CodecError, LogReplySink, ReplySink};
pub use observability::{HealthChecker, HealthStatus, ObservabilityServer};
pub use workload::{load_requests, WorkloadError};
