//! # Orchestrator: registry owner, event source and public API.
//!
//! The [`Orchestrator`] owns the registry (definitions, instances, graph and
//! startup order), the event bus, the subscriber fan-out and the background
//! supervision loops. Lifecycle operations live in `lifecycle.rs`, health
//! polling in `health.rs` and the retry loop in `recovery.rs`; this file holds
//! construction, registration and introspection.
//!
//! ## Architecture
//! ```text
//! register(def) ──► Registry { definitions, instances, graph, order }
//!                         ▲            ▲
//! start/stop/restart ─────┘            │
//!        │                             │
//!        ├── publish(Event) ──► Bus ──► listener ──► SubscriberSet ──► Subscribe::on_event
//!        │                          └─► Orchestrator::subscribe() receivers
//!        │
//!        └── failure ──► recovery loop (sleep backoff, restart)
//!                              ▲
//! health loop (interval) ──────┘  unhealthy / failed probe
//! ```
//!
//! ## Cancellation tokens
//! ```text
//! runtime_token          subscriber listener
//!   └─ supervision       recovery loops
//!        └─ health       health loop (replaced on update_config)
//! ```
//! `destroy()` cancels supervision first, stops every service, then cancels
//! the runtime token so the stop events still reach subscribers.
//!
//! ## Example
//! ```rust
//! use depvisor::{Dependencies, Orchestrator, OrchestratorConfig, Service, ServiceDefinition, ServiceError};
//!
//! struct Db;
//! impl Service for Db {}
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orch = Orchestrator::new(OrchestratorConfig::default());
//!
//!     orch.register(
//!         ServiceDefinition::builder("db")
//!             .factory(|_deps: Dependencies, _cfg: serde_json::Value| async { Ok::<_, ServiceError>(Db) })
//!             .build()?,
//!     )
//!     .await?;
//!
//!     orch.start("db").await?;
//!     assert!(orch.is_started("db").await);
//!
//!     orch.destroy().await;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use indexmap::IndexMap;
use tokio::sync::{RwLock as AsyncRwLock, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::builder::OrchestratorBuilder;
use super::config::OrchestratorConfig;
use super::instance::ServiceInfo;
use super::lifecycle::BulkReport;
use super::metrics::{Counter, Metrics, MetricsRecorder};
use super::registry::Registry;
use super::shutdown;
use crate::error::OrchestratorError;
use crate::events::{Bus, Event, EventKind};
use crate::services::{Service, ServiceDefinition, ServiceRef, ServiceStatus, downcast_service};
use crate::subscribers::SubscriberSet;

/// Dependency-aware service lifecycle manager.
///
/// Always handled through `Arc<Orchestrator>`; build one with
/// [`Orchestrator::new`] or [`OrchestratorBuilder`].
pub struct Orchestrator {
    cfg: RwLock<OrchestratorConfig>,
    pub(crate) bus: Bus,
    subs: Arc<SubscriberSet>,
    pub(crate) registry: AsyncRwLock<Registry>,
    pub(crate) metrics: MetricsRecorder,
    runtime_token: CancellationToken,
    pub(crate) supervision: CancellationToken,
    health_token: Mutex<CancellationToken>,
    me: Weak<Orchestrator>,
}

impl Orchestrator {
    /// Builds an orchestrator without subscribers.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(cfg: OrchestratorConfig) -> Arc<Self> {
        OrchestratorBuilder::new(cfg).build()
    }

    /// Returns a builder for an orchestrator with subscribers.
    pub fn builder(cfg: OrchestratorConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: OrchestratorConfig,
        bus: Bus,
        subs: Arc<SubscriberSet>,
        runtime_token: CancellationToken,
        me: Weak<Orchestrator>,
    ) -> Self {
        let supervision = runtime_token.child_token();
        let health_token = supervision.child_token();
        Self {
            metrics: MetricsRecorder::new(cfg.enable_metrics),
            cfg: RwLock::new(cfg),
            bus,
            subs,
            registry: AsyncRwLock::new(Registry::default()),
            runtime_token,
            supervision,
            health_token: Mutex::new(health_token),
            me,
        }
    }

    /// Strong handle to `self` for spawned tasks.
    pub(crate) fn handle(&self) -> Option<Arc<Self>> {
        self.me.upgrade()
    }

    pub(crate) fn weak(&self) -> Weak<Self> {
        self.me.clone()
    }

    /// Forwards bus events to the subscriber set until the runtime token is cancelled.
    pub(crate) fn subscriber_listener(&self) {
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        let token = self.runtime_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "subscriber listener lagged behind the bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
    }

    /// Replaces the health-loop token and returns the new one.
    pub(crate) fn renew_health_token(&self) -> CancellationToken {
        let fresh = self.supervision.child_token();
        let mut slot = self.health_token.lock().unwrap_or_else(PoisonError::into_inner);
        let old = std::mem::replace(&mut *slot, fresh.clone());
        old.cancel();
        fresh
    }

    /// Current configuration.
    pub fn config(&self) -> OrchestratorConfig {
        self.cfg
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the configuration, publishes `ConfigUpdated` and restarts the health loop.
    ///
    /// Running recovery loops pick up the new values on their next pass.
    pub fn update_config(&self, cfg: OrchestratorConfig) {
        self.metrics.set_enabled(cfg.enable_metrics);
        *self.cfg.write().unwrap_or_else(PoisonError::into_inner) = cfg;
        self.bus.publish(Event::new(EventKind::ConfigUpdated));
        debug!("configuration updated");
        self.spawn_health_loop();
    }

    /// New receiver for every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    // ---- registration ----

    /// Registers a definition.
    ///
    /// Missing dependencies are legal and reported with `UnknownDependency`.
    /// With cycle detection enabled a cycle through the new definition fails
    /// with [`OrchestratorError::CircularDependency`]; the definition stays
    /// registered in that case. An `auto_start` definition is started right
    /// away and a failure is reported as `AutoStartFailed` instead of being
    /// returned.
    pub async fn register(&self, def: ServiceDefinition) -> Result<(), OrchestratorError> {
        let detect = self.config().enable_circular_dependency_detection;
        let name = def.name().to_string();
        let auto_start = def.auto_start();

        let (missing, cycle) = {
            let mut reg = self.registry.write().await;
            if reg.definitions.contains(&name) {
                return Err(OrchestratorError::AlreadyRegistered { name });
            }
            reg.link(&def);
            reg.definitions.insert(def)?;
            reg.recompute_order();

            let missing = reg.graph.missing_dependencies(&name);
            let cycle = if detect {
                reg.graph.detect_cycle_from(&name).err()
            } else {
                None
            };
            (missing, cycle)
        };
        self.metrics.incr(Counter::Registered);

        for dep in missing {
            self.bus.publish(
                Event::new(EventKind::UnknownDependency)
                    .with_service(name.as_str())
                    .with_dependency(dep),
            );
        }
        self.bus
            .publish(Event::new(EventKind::ServiceRegistered).with_service(name.as_str()));
        debug!(service = %name, "registered");

        if let Some(err) = cycle {
            warn!(service = %name, error = %err, "circular dependency");
            self.bus.publish(
                Event::new(EventKind::CircularDependencyDetected)
                    .with_service(name.as_str())
                    .with_reason(err.to_string()),
            );
            return Err(err);
        }

        if !auto_start {
            return Ok(());
        }
        if let Err(err) = self.start(&name).await {
            warn!(service = %name, error = %err, "auto start failed");
            self.bus.publish(
                Event::new(EventKind::AutoStartFailed)
                    .with_service(name.as_str())
                    .with_reason(err.to_string()),
            );
        }
        Ok(())
    }

    /// Removes a definition, its instance and every edge that names it.
    ///
    /// Rejected with [`OrchestratorError::IllegalState`] while the service is
    /// starting, started or stopping; nothing changes in that case.
    pub async fn unregister(&self, name: &str) -> Result<(), OrchestratorError> {
        {
            let mut reg = self.registry.write().await;
            let status = reg
                .status_of(name)
                .ok_or_else(|| OrchestratorError::NotRegistered {
                    name: name.to_string(),
                })?;
            if matches!(
                status,
                ServiceStatus::Started | ServiceStatus::Starting | ServiceStatus::Stopping
            ) {
                return Err(OrchestratorError::IllegalState {
                    name: name.to_string(),
                    status,
                    action: "unregister",
                });
            }
            reg.definitions.remove(name);
            reg.unlink(name);
            reg.recompute_order();
        }
        self.metrics.incr(Counter::Unregistered);
        self.bus
            .publish(Event::new(EventKind::ServiceUnregistered).with_service(name));
        debug!(service = %name, "unregistered");
        Ok(())
    }

    /// Stops every service, ends background loops and clears all tables.
    ///
    /// The orchestrator is inert afterwards.
    pub async fn destroy(&self) -> BulkReport {
        self.supervision.cancel();
        let report = self.stop_all().await;
        {
            let mut reg = self.registry.write().await;
            *reg = Registry::default();
        }
        self.runtime_token.cancel();
        debug!("orchestrator destroyed");
        report
    }

    /// Waits for a termination signal (or `destroy()` from elsewhere), then destroys.
    pub async fn run_until_signal(&self) -> std::io::Result<BulkReport> {
        tokio::select! {
            res = shutdown::wait_for_shutdown_signal() => {
                res?;
                debug!("shutdown signal received");
                Ok(self.destroy().await)
            }
            _ = self.runtime_token.cancelled() => Ok(BulkReport::default()),
        }
    }

    // ---- introspection ----

    /// Product of a started service.
    pub async fn get(&self, name: &str) -> Option<ServiceRef> {
        let reg = self.registry.read().await;
        reg.instances.get(name)?.product().cloned()
    }

    /// Product of a started service, downcast to its concrete type.
    pub async fn get_as<T: Service>(&self, name: &str) -> Option<Arc<T>> {
        self.get(name).await.and_then(downcast_service::<T>)
    }

    /// Returns `true` if a definition with this name is registered.
    pub async fn has(&self, name: &str) -> bool {
        self.registry.read().await.definitions.contains(name)
    }

    pub async fn is_started(&self, name: &str) -> bool {
        self.status(name).await == Some(ServiceStatus::Started)
    }

    /// Lifecycle status, `None` if not registered.
    pub async fn status(&self, name: &str) -> Option<ServiceStatus> {
        self.registry.read().await.status_of(name)
    }

    /// Registered names in registration order.
    pub async fn services(&self) -> Vec<String> {
        let reg = self.registry.read().await;
        reg.definitions.names().map(str::to_string).collect()
    }

    /// Started names in startup order.
    pub async fn started_services(&self) -> Vec<String> {
        let reg = self.registry.read().await;
        reg.order
            .iter()
            .filter(|n| reg.status_of(n) == Some(ServiceStatus::Started))
            .cloned()
            .collect()
    }

    pub async fn service_info(&self, name: &str) -> Option<ServiceInfo> {
        self.registry.read().await.info(name)
    }

    /// Depends-on edges of every registered service.
    pub async fn dependency_graph(&self) -> IndexMap<String, Vec<String>> {
        self.registry.read().await.graph.snapshot()
    }

    /// Registered names, dependencies first.
    pub async fn startup_order(&self) -> Vec<String> {
        self.registry.read().await.order.clone()
    }

    pub async fn metrics(&self) -> Metrics {
        let reg = self.registry.read().await;
        self.metrics.snapshot(
            reg.instances.count_with(ServiceStatus::Started),
            reg.definitions.len(),
        )
    }
}
