//! Runtime core: registry, lifecycle and supervision.
//!
//! The public API of this module is [`Orchestrator`] (built with
//! [`OrchestratorBuilder`]) plus the value types it returns.
//!
//! Internal modules:
//! - [`orchestrator`]: registry owner, registration and introspection;
//! - [`lifecycle`]: start/stop/restart, coalescing and bulk operations;
//! - [`health`]: periodic and on-demand health probes;
//! - [`recovery`]: bounded restart loop with backoff;
//! - [`registry`], [`store`], [`instance`]: the shared tables;
//! - [`metrics`]: counters and snapshots;
//! - [`shutdown`]: OS termination signals.

mod builder;
mod config;
mod health;
mod instance;
mod lifecycle;
mod metrics;
mod orchestrator;
mod recovery;
mod registry;
mod shutdown;
mod store;

pub use builder::OrchestratorBuilder;
pub use config::OrchestratorConfig;
pub use health::{HealthOutcome, HealthReport};
pub use instance::ServiceInfo;
pub use lifecycle::BulkReport;
pub use metrics::Metrics;
pub use orchestrator::Orchestrator;
