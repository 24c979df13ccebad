/// Application Layer - Services
///
/// Orchestrates the domain layer into the running system: one scheduler
/// thread feeding K partition workers and one pattern tracker. Depends on
/// the domain layer and on the infrastructure seams (reply sink), never on
/// concrete transports.

pub mod services;

// Re-export key services
pub use services::{Scheduler, SchedulerConfig, SchedulerError};
