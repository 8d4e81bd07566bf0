//! # depvisor
//!
//! **Depvisor** is a dependency-aware service lifecycle manager for tokio
//! applications.
//!
//! Services are declared as named definitions with a factory and a list of
//! dependencies. The orchestrator resolves the dependency graph, starts
//! services dependencies-first, stops them dependents-first, rejects cycles,
//! polls health and restarts failed services with bounded backoff.
//!
//! ## Architecture
//! ```text
//!   ServiceDefinition   ServiceDefinition   ServiceDefinition
//!     (db)                (cache → db)        (api → db, cache)
//!          │                   │                    │
//!          ▼                   ▼                    ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Orchestrator                                                     │
//! │  - Registry: definitions, instances, DependencyGraph, order       │
//! │  - Lifecycle: start (coalesced) / stop (cascading) / restart      │
//! │  - Health loop (interval, timeout per probe)                      │
//! │  - Recovery loops (retry budget, linear backoff)                  │
//! └──────┬────────────────────────────────────────────────────────────┘
//!        │ publish(Event)
//!        ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                     Bus (broadcast channel)                       │
//! │             (capacity: OrchestratorConfig::bus_capacity)          │
//! └───────────────┬───────────────────────────────────┬───────────────┘
//!                 ▼                                   ▼
//!       subscriber listener                 Orchestrator::subscribe()
//!                 ▼
//!           SubscriberSet (per-subscriber queues)
//!       ┌─────────┼─────────┐
//!       ▼         ▼         ▼
//!    worker1   worker2   workerN
//! ```
//!
//! ### Lifecycle
//! ```text
//! register ──► registered ──► starting ──► started ──► stopping ──► stopped
//!                                │                        │
//!                                └────────► error ◄───────┘
//!                                             │
//!                                  recovery: sleep(retry_delay × n), restart
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                                  |
//! |-------------------|----------------------------------------------------------|-----------------------------------------------------|
//! | **Definitions**   | Declarative descriptors with factories and dependencies. | [`ServiceDefinition`], [`Factory`], [`Dependencies`] |
//! | **Capabilities**  | Optional async start/stop/health hooks.                  | [`Service`], [`Startable`], [`Stoppable`], [`HealthCheckable`] |
//! | **Orchestration** | Ordered start/stop, coalescing, recovery, health.        | [`Orchestrator`], [`OrchestratorBuilder`]           |
//! | **Graph**         | Cycle detection and topological order.                   | [`DependencyGraph`]                                 |
//! | **Subscriber API**| Hook into lifecycle events.                              | [`Subscribe`], [`Event`], [`EventKind`]             |
//! | **Policies**      | Backoff growth and jitter for recovery.                  | [`BackoffPolicy`], [`JitterPolicy`]                 |
//! | **Errors**        | Typed errors for registration and lifecycle.             | [`OrchestratorError`], [`ServiceError`]             |
//! | **Configuration** | Centralized runtime settings.                            | [`OrchestratorConfig`]                              |
//!
//! ## Optional features
//! - `logging`: exports the built-in [`LogWriter`] subscriber _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use depvisor::{Dependencies, Orchestrator, OrchestratorConfig, Service, ServiceDefinition, ServiceError};
//!
//! struct Db { url: String }
//! impl Service for Db {}
//!
//! struct Api { db: Arc<Db> }
//! impl Service for Api {}
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orch = Orchestrator::builder(OrchestratorConfig::default()).build();
//!
//!     orch.register(
//!         ServiceDefinition::builder("db")
//!             .config(serde_json::json!({ "url": "postgres://localhost/app" }))
//!             .factory(|_deps: Dependencies, cfg: serde_json::Value| async move {
//!                 let url = cfg["url"].as_str().unwrap_or_default().to_string();
//!                 Ok::<_, ServiceError>(Db { url })
//!             })
//!             .build()?,
//!     )
//!     .await?;
//!
//!     orch.register(
//!         ServiceDefinition::builder("api")
//!             .dependency("db")
//!             .factory(|deps: Dependencies, _cfg: serde_json::Value| async move {
//!                 Ok::<_, ServiceError>(Api { db: deps.require::<Db>("db")? })
//!             })
//!             .build()?,
//!     )
//!     .await?;
//!
//!     // Starts "db" first, then "api".
//!     orch.start("api").await?;
//!     let api = orch.get_as::<Api>("api").await.expect("api is started");
//!     assert_eq!(api.db.url, "postgres://localhost/app");
//!
//!     // Stops "api" first, then "db".
//!     orch.destroy().await;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
pub mod events;
mod graph;
mod policies;
mod services;
pub mod subscribers;

// ---- Public re-exports ----

pub use crate::core::{
    BulkReport, HealthOutcome, HealthReport, Metrics, Orchestrator, OrchestratorBuilder,
    OrchestratorConfig, ServiceInfo,
};
pub use error::{OrchestratorError, ServiceError};
pub use events::{Event, EventKind};
pub use graph::DependencyGraph;
pub use policies::{BackoffPolicy, Growth, JitterPolicy};
pub use services::{
    AsAny, BoxServiceFuture, DefinitionBuilder, Dependencies, Factory, FactoryFn, FactoryRef,
    HealthCheckable, HealthStatus, Service, ServiceDefinition, ServiceRef, ServiceStatus,
    Startable, Stoppable, downcast_service,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::embedded::LogWriter;
