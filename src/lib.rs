//! # Endpoint Monitor
//!
//! A distributed endpoint-availability monitor: independent per-endpoint
//! probing (HTTP, ping, TCP, Kafka producer/consumer), certificate and
//! domain-expiry sub-checks, and a primary/dependent/standalone
//! coordination plane that aggregates multi-location probe results into a
//! single per-endpoint consensus status.

pub mod aggregator;
pub mod certcheck;
pub mod clock;
pub mod error;
pub mod failover;
pub mod kafka_pool;
pub mod logger;
pub mod notifier;
pub mod probe;
pub mod reaper;
pub mod role;
pub mod scheduler;
pub mod services;
pub mod store;
pub mod sync;
pub mod types;
pub mod uptime;

pub use error::{MonitorError, MonitorResult};
pub use services::{Services, StartupConfig};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
