/// Application Services
///
/// The threaded machinery around the domain logic: partition workers, the
/// pattern tracker, and the scheduler that wires them together.

pub mod partition;
pub mod pattern_tracker;
pub mod scheduler;

// Re-export main types
pub use partition::{Command, Partition};
pub use pattern_tracker::{AccessSample, PatternTracker};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerError};
