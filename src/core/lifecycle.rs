//! # Lifecycle controller: start, stop, restart and bulk operations.
//!
//! ## State machine
//! ```text
//! registered ──► starting ──► started ──► stopping ──► stopped
//!                   │                         │           │
//!                   └──────► error ◄──────────┘           │
//!                              │                          │
//!                              └──── start / restart ◄────┘
//! ```
//!
//! ## Start
//! ```text
//! start(name)
//!   ├─ started   → existing product
//!   ├─ starting  → await the in-flight attempt (watch signal)
//!   ├─ stopping  → IllegalState
//!   └─ otherwise → status = starting, spawn attempt:
//!                    for dep in dependencies: start(dep)    (recursive, records dependent)
//!                    factory(deps, config)
//!                    Startable::start()
//!                    status = started | error
//!                    send outcome to every waiter
//! ```
//! The attempt runs in its own task, so dropping the caller's future never
//! cancels a start that other callers may be waiting on. An attempt whose
//! dependency was stopped while it ran fails with `DependencyFailed` and its
//! product is stopped and dropped.
//!
//! ## Stop
//! Dependents recorded on the instance are stopped first; their failures are
//! logged and published but do not abort the stop. The `Stoppable` hook is
//! raced against `shutdown_timeout`. The product is dropped whether the stop
//! succeeds or fails.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::instance::{StartOutcome, StartSignal};
use super::metrics::Counter;
use super::orchestrator::Orchestrator;
use crate::error::{OrchestratorError, ServiceError};
use crate::events::{Event, EventKind};
use crate::services::{Dependencies, ServiceDefinition, ServiceRef, ServiceStatus};

/// Who asked for a start; decides whether a failure is handed to recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartMode {
    /// Top-level start requested by a caller.
    Requested,
    /// Nested start of a dependency.
    Dependency,
    /// Restart driven by the recovery loop.
    Recovery,
}

/// Outcome of `start_all` / `stop_all`.
#[derive(Debug, Clone, Default)]
pub struct BulkReport {
    /// Names the operation succeeded for, in processing order.
    pub succeeded: Vec<String>,
    /// Names the operation failed for, with the error.
    pub failed: Vec<(String, OrchestratorError)>,
}

impl BulkReport {
    /// Returns `true` if nothing failed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

enum Plan {
    Ready(ServiceRef),
    Join(StartSignal),
    Lead {
        tx: watch::Sender<Option<StartOutcome>>,
        rx: StartSignal,
        def: ServiceDefinition,
    },
}

fn abandoned(name: &str) -> OrchestratorError {
    OrchestratorError::StartFailed {
        name: name.to_string(),
        source: ServiceError::fail("start attempt abandoned"),
    }
}

/// Waits until the attempt publishes its outcome.
async fn await_outcome(name: &str, mut rx: StartSignal) -> StartOutcome {
    match rx.wait_for(Option::is_some).await {
        Ok(outcome) => match &*outcome {
            Some(res) => res.clone(),
            None => Err(abandoned(name)),
        },
        Err(_) => Err(abandoned(name)),
    }
}

fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Orchestrator {
    /// Starts a service and, first, every dependency it declares.
    ///
    /// Idempotent: a started service returns its product without running the
    /// factory again; concurrent calls for a starting service share one
    /// attempt. Resets the recovery budget of the service.
    pub async fn start(&self, name: &str) -> Result<ServiceRef, OrchestratorError> {
        self.reset_recovery(name).await;
        self.start_inner(name, &[], StartMode::Requested).await
    }

    /// Stops a service after stopping everything that resolved it as a dependency.
    ///
    /// No-op unless the service is started. Ends a running recovery loop.
    pub async fn stop(&self, name: &str) -> Result<(), OrchestratorError> {
        self.reset_recovery(name).await;
        self.stop_inner(name).await
    }

    /// Stops then starts a service. Resets the recovery budget.
    pub async fn restart(&self, name: &str) -> Result<ServiceRef, OrchestratorError> {
        self.reset_recovery(name).await;
        self.restart_inner(name, StartMode::Requested).await
    }

    /// Starts every registered service in startup order.
    pub async fn start_all(&self) -> BulkReport {
        self.start_where(|_| true).await
    }

    /// Starts the registered services accepted by `filter`, in startup order.
    ///
    /// A failure is published as `BulkStartError` and does not stop the walk.
    pub async fn start_where<F>(&self, filter: F) -> BulkReport
    where
        F: Fn(&ServiceDefinition) -> bool,
    {
        let names: Vec<String> = {
            let reg = self.registry.read().await;
            reg.order
                .iter()
                .filter(|n| reg.definitions.get(n).is_some_and(&filter))
                .cloned()
                .collect()
        };

        let mut report = BulkReport::default();
        for name in names {
            match self.start(&name).await {
                Ok(_) => report.succeeded.push(name),
                Err(err) => {
                    self.bus.publish(
                        Event::new(EventKind::BulkStartError)
                            .with_service(name.as_str())
                            .with_reason(err.to_string()),
                    );
                    report.failed.push((name, err));
                }
            }
        }
        report
    }

    /// Stops every started service in reverse startup order.
    ///
    /// A failure is published as `BulkStopError` and does not stop the walk.
    pub async fn stop_all(&self) -> BulkReport {
        let names: Vec<String> = self.registry.read().await.order.clone();

        let mut report = BulkReport::default();
        for name in names.into_iter().rev() {
            if self.status(&name).await != Some(ServiceStatus::Started) {
                continue;
            }
            match self.stop(&name).await {
                Ok(()) => report.succeeded.push(name),
                Err(err) => {
                    self.bus.publish(
                        Event::new(EventKind::BulkStopError)
                            .with_service(name.as_str())
                            .with_reason(err.to_string()),
                    );
                    report.failed.push((name, err));
                }
            }
        }
        report
    }

    pub(crate) async fn restart_inner(
        &self,
        name: &str,
        mode: StartMode,
    ) -> Result<ServiceRef, OrchestratorError> {
        self.stop_inner(name).await?;
        self.start_inner(name, &[], mode).await
    }

    /// Resolves `name` to a started product. `chain` holds the services whose
    /// attempts are waiting on this one.
    pub(crate) fn start_inner<'a>(
        &'a self,
        name: &'a str,
        chain: &'a [String],
        mode: StartMode,
    ) -> BoxFuture<'a, StartOutcome> {
        async move {
            if let Some(pos) = chain.iter().position(|n| n == name) {
                let mut path = chain[pos..].to_vec();
                path.push(name.to_string());
                return Err(OrchestratorError::CircularDependency {
                    service: name.to_string(),
                    path,
                });
            }
            let Some(this) = self.handle() else {
                return Err(abandoned(name));
            };

            let plan = {
                let mut reg = self.registry.write().await;
                let def = reg
                    .definitions
                    .get(name)
                    .cloned()
                    .ok_or_else(|| OrchestratorError::NotRegistered {
                        name: name.to_string(),
                    })?;
                let inst = reg.instances.get_or_create(name);
                let status = inst.status;
                match status {
                    ServiceStatus::Started => match inst.service.clone() {
                        Some(svc) => Plan::Ready(svc),
                        None => return Err(abandoned(name)),
                    },
                    ServiceStatus::Starting => match inst.inflight.clone() {
                        Some(rx) => Plan::Join(rx),
                        None => return Err(abandoned(name)),
                    },
                    ServiceStatus::Stopping => {
                        return Err(OrchestratorError::IllegalState {
                            name: name.to_string(),
                            status,
                            action: "start",
                        });
                    }
                    _ => {
                        let (tx, rx) = watch::channel(None);
                        inst.status = ServiceStatus::Starting;
                        inst.error = None;
                        inst.inflight = Some(rx.clone());
                        Plan::Lead { tx, rx, def }
                    }
                }
            };

            match plan {
                Plan::Ready(svc) => Ok(svc),
                Plan::Join(rx) => {
                    debug!(service = %name, "joining in-flight start");
                    await_outcome(name, rx).await
                }
                Plan::Lead { tx, rx, def } => {
                    self.bus
                        .publish(Event::new(EventKind::ServiceStarting).with_service(name));
                    debug!(service = %name, "starting");

                    let mut chain = chain.to_vec();
                    chain.push(name.to_string());
                    tokio::spawn(this.run_attempt(def, chain, mode, tx));
                    await_outcome(name, rx).await
                }
            }
        }
        .boxed()
    }

    /// Runs one start attempt to completion and publishes its outcome.
    fn run_attempt(
        self: Arc<Self>,
        def: ServiceDefinition,
        chain: Vec<String>,
        mode: StartMode,
        tx: watch::Sender<Option<StartOutcome>>,
    ) -> BoxFuture<'static, ()> {
        async move {
            let name = def.name().to_string();
            let began = Instant::now();

            let outcome = match AssertUnwindSafe(self.create(&def, &chain))
                .catch_unwind()
                .await
            {
                Ok(res) => res,
                Err(payload) => Err(OrchestratorError::StartFailed {
                    name: name.clone(),
                    source: ServiceError::fail(format!(
                        "panicked: {}",
                        panic_reason(&*payload)
                    )),
                }),
            };
            let outcome = match outcome {
                Ok(svc) => match self.commit_started(&def, &svc).await {
                    Ok(()) => Ok(svc),
                    Err(err) => {
                        self.discard(&name, &svc).await;
                        Err(err)
                    }
                },
                Err(err) => Err(err),
            };
            let elapsed = began.elapsed();

            match &outcome {
                Ok(_) => {
                    self.metrics.record_start(elapsed);
                    self.bus.publish(
                        Event::new(EventKind::ServiceStarted)
                            .with_service(name.as_str())
                            .with_duration(elapsed),
                    );
                    debug!(service = %name, ?elapsed, "started");
                }
                Err(err) => {
                    {
                        let mut reg = self.registry.write().await;
                        if let Some(inst) = reg.instances.get_mut(&name) {
                            inst.status = ServiceStatus::Error;
                            inst.service = None;
                            inst.started_instant = None;
                            inst.error = Some(err.clone());
                            inst.inflight = None;
                        }
                    }
                    self.metrics.incr(Counter::Errored);
                    let mut ev = Event::new(EventKind::ServiceStartFailed)
                        .with_service(name.as_str())
                        .with_reason(err.to_string())
                        .with_duration(elapsed);
                    if let OrchestratorError::DependencyFailed { dependency, .. } = err {
                        ev = ev.with_dependency(dependency.as_str());
                    }
                    self.bus.publish(ev);
                    warn!(service = %name, error = %err, "start failed");

                    if mode == StartMode::Requested && self.config().enable_auto_recovery {
                        self.schedule_recovery(&name);
                    }
                }
            }
            tx.send_replace(Some(outcome));
        }
        .boxed()
    }

    /// Marks the attempt `started` unless a dependency stopped while the
    /// factory ran. Check and transition happen under one write lock.
    async fn commit_started(
        &self,
        def: &ServiceDefinition,
        svc: &ServiceRef,
    ) -> Result<(), OrchestratorError> {
        let name = def.name();
        let mut reg = self.registry.write().await;

        for dep in def.dependencies() {
            let stale = match reg.status_of(dep) {
                Some(ServiceStatus::Started) => continue,
                Some(status) => OrchestratorError::IllegalState {
                    name: dep.clone(),
                    status,
                    action: "depend on",
                },
                None => OrchestratorError::NotRegistered { name: dep.clone() },
            };
            return Err(OrchestratorError::DependencyFailed {
                name: name.to_string(),
                dependency: dep.clone(),
                source: Box::new(stale),
            });
        }

        if let Some(inst) = reg.instances.get_mut(name) {
            inst.status = ServiceStatus::Started;
            inst.service = Some(Arc::clone(svc));
            inst.started_at = Some(SystemTime::now());
            inst.started_instant = Some(Instant::now());
            inst.error = None;
            inst.inflight = None;
            inst.start_count += 1;
        }
        Ok(())
    }

    /// Runs the stop hook of a product that never reached `started`.
    async fn discard(&self, name: &str, svc: &ServiceRef) {
        let Some(hook) = svc.as_stoppable() else {
            return;
        };
        let timeout = self.config().shutdown_timeout;
        match tokio::time::timeout(timeout, hook.stop()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(service = %name, error = %err, "discarded product failed to stop"),
            Err(_) => warn!(service = %name, ?timeout, "discarded product did not stop in time"),
        }
    }

    /// Resolves dependencies, then runs the factory and the start hook.
    async fn create(&self, def: &ServiceDefinition, chain: &[String]) -> StartOutcome {
        let name = def.name();
        let mut deps = Dependencies::default();

        for dep in def.dependencies() {
            match self.start_inner(dep, chain, StartMode::Dependency).await {
                Ok(svc) => {
                    deps.insert(dep.as_str(), svc);
                    let mut reg = self.registry.write().await;
                    if let Some(inst) = reg.instances.get_mut(dep) {
                        inst.dependents.insert(name.to_string());
                    }
                }
                Err(err) => {
                    return Err(OrchestratorError::DependencyFailed {
                        name: name.to_string(),
                        dependency: dep.clone(),
                        source: Box::new(err),
                    });
                }
            }
        }

        let svc = def
            .factory()
            .create(deps, def.config().clone())
            .await
            .map_err(|source| OrchestratorError::StartFailed {
                name: name.to_string(),
                source,
            })?;

        if let Some(hook) = svc.as_startable() {
            hook.start()
                .await
                .map_err(|source| OrchestratorError::StartFailed {
                    name: name.to_string(),
                    source,
                })?;
        }
        Ok(svc)
    }

    pub(crate) fn stop_inner<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<(), OrchestratorError>> {
        async move {
            let (svc, dependents) = {
                let mut reg = self.registry.write().await;
                if !reg.definitions.contains(name) {
                    return Err(OrchestratorError::NotRegistered {
                        name: name.to_string(),
                    });
                }
                let Some(inst) = reg.instances.get_mut(name) else {
                    return Ok(());
                };
                if inst.status != ServiceStatus::Started {
                    return Ok(());
                }
                inst.status = ServiceStatus::Stopping;
                let dependents: Vec<String> = inst.dependents.iter().cloned().collect();
                (inst.service.clone(), dependents)
            };
            self.bus
                .publish(Event::new(EventKind::ServiceStopping).with_service(name));
            debug!(service = %name, "stopping");

            for dependent in &dependents {
                if let Err(err) = self.stop_inner(dependent).await {
                    warn!(service = %name, dependent = %dependent, error = %err, "dependent failed to stop");
                }
            }

            let timeout = self.config().shutdown_timeout;
            let result = match svc.as_ref().and_then(|s| s.as_stoppable()) {
                Some(hook) => match tokio::time::timeout(timeout, hook.stop()).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(source)) => Err(OrchestratorError::StopFailed {
                        name: name.to_string(),
                        source,
                    }),
                    Err(_) => Err(OrchestratorError::StopTimeout {
                        name: name.to_string(),
                        timeout,
                    }),
                },
                None => Ok(()),
            };
            drop(svc);

            {
                let mut reg = self.registry.write().await;
                if let Some(inst) = reg.instances.get_mut(name) {
                    inst.service = None;
                    inst.started_instant = None;
                    match &result {
                        Ok(()) => {
                            inst.status = ServiceStatus::Stopped;
                            inst.stopped_at = Some(SystemTime::now());
                            inst.error = None;
                        }
                        Err(err) => {
                            inst.status = ServiceStatus::Error;
                            inst.error = Some(err.clone());
                        }
                    }
                }
            }

            match &result {
                Ok(()) => {
                    self.metrics.incr(Counter::Stopped);
                    self.bus
                        .publish(Event::new(EventKind::ServiceStopped).with_service(name));
                    debug!(service = %name, "stopped");
                }
                Err(err) => {
                    self.metrics.incr(Counter::Errored);
                    let mut ev = Event::new(EventKind::ServiceStopFailed)
                        .with_service(name)
                        .with_reason(err.to_string());
                    if let OrchestratorError::StopTimeout { timeout, .. } = err {
                        ev = ev.with_timeout(*timeout);
                    }
                    self.bus.publish(ev);
                    warn!(service = %name, error = %err, "stop failed");
                }
            }
            result
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::broadcast;

    use super::*;
    use crate::core::config::OrchestratorConfig;
    use crate::services::{Service, Startable, Stoppable};

    fn quiet() -> OrchestratorConfig {
        OrchestratorConfig {
            enable_health_checks: false,
            enable_auto_recovery: false,
            ..OrchestratorConfig::default()
        }
    }

    struct Num(u32);
    impl Service for Num {}

    /// Records stop order into a shared log.
    struct Tracked {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        stop_delay: Duration,
    }

    #[async_trait]
    impl Stoppable for Tracked {
        async fn stop(&self) -> Result<(), ServiceError> {
            tokio::time::sleep(self.stop_delay).await;
            self.log.lock().unwrap().push(self.name);
            Ok(())
        }
    }

    impl Service for Tracked {
        fn as_stoppable(&self) -> Option<&dyn Stoppable> {
            Some(self)
        }
    }

    struct FailingHook;

    #[async_trait]
    impl Startable for FailingHook {
        async fn start(&self) -> Result<(), ServiceError> {
            Err(ServiceError::fail("port in use"))
        }
    }

    impl Service for FailingHook {
        fn as_startable(&self) -> Option<&dyn Startable> {
            Some(self)
        }
    }

    fn unit(name: &str, deps: &[&str]) -> ServiceDefinition {
        ServiceDefinition::builder(name)
            .depends_on(deps.iter().copied())
            .factory(|_d: Dependencies, _c: serde_json::Value| async { Ok::<_, ServiceError>(Num(0)) })
            .build()
            .unwrap()
    }

    fn tracked(
        name: &'static str,
        deps: &[&str],
        log: &Arc<Mutex<Vec<&'static str>>>,
        stop_delay: Duration,
    ) -> ServiceDefinition {
        let log = Arc::clone(log);
        ServiceDefinition::builder(name)
            .depends_on(deps.iter().copied())
            .factory(move |_d: Dependencies, _c: serde_json::Value| {
                let log = Arc::clone(&log);
                async move {
                    Ok::<_, ServiceError>(Tracked {
                        name,
                        log,
                        stop_delay,
                    })
                }
            })
            .build()
            .unwrap()
    }

    fn kinds_for(rx: &mut broadcast::Receiver<Event>, service: &str) -> Vec<EventKind> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if ev.is_for(service) {
                out.push(ev.kind);
            }
        }
        out
    }

    #[tokio::test]
    async fn test_dependency_product_is_passed_to_factory() {
        let orch = Orchestrator::new(quiet());
        orch.register(
            ServiceDefinition::builder("a")
                .factory(|_d: Dependencies, _c: serde_json::Value| async { Ok::<_, ServiceError>(Num(1)) })
                .build()
                .unwrap(),
        )
        .await
        .unwrap();
        orch.register(
            ServiceDefinition::builder("b")
                .dependency("a")
                .factory(|deps: Dependencies, _c: serde_json::Value| async move {
                    let a = deps.require::<Num>("a")?;
                    Ok::<_, ServiceError>(Num(a.0 * 2))
                })
                .build()
                .unwrap(),
        )
        .await
        .unwrap();

        orch.start("b").await.unwrap();

        assert_eq!(orch.get_as::<Num>("b").await.unwrap().0, 2);
        assert_eq!(orch.status("a").await, Some(ServiceStatus::Started));
        assert_eq!(orch.service_info("a").await.unwrap().dependents, ["b"]);
        assert_eq!(orch.started_services().await, ["a", "b"]);
    }

    #[tokio::test]
    async fn test_failing_factory_sets_error_status() {
        let orch = Orchestrator::new(quiet());
        let mut rx = orch.subscribe();
        orch.register(
            ServiceDefinition::builder("x")
                .factory(|_d: Dependencies, _c: serde_json::Value| async {
                    Err::<Num, _>(ServiceError::fail("boom"))
                })
                .build()
                .unwrap(),
        )
        .await
        .unwrap();

        let err = orch.start("x").await.unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert_eq!(orch.status("x").await, Some(ServiceStatus::Error));
        assert!(orch.get("x").await.is_none());
        assert!(orch.service_info("x").await.unwrap().error.unwrap().contains("boom"));
        assert_eq!(
            kinds_for(&mut rx, "x"),
            [
                EventKind::ServiceRegistered,
                EventKind::ServiceStarting,
                EventKind::ServiceStartFailed
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_start_hook_discards_product() {
        let orch = Orchestrator::new(quiet());
        orch.register(
            ServiceDefinition::builder("srv")
                .factory(|_d: Dependencies, _c: serde_json::Value| async { Ok::<_, ServiceError>(FailingHook) })
                .build()
                .unwrap(),
        )
        .await
        .unwrap();

        let err = orch.start("srv").await.unwrap_err();
        assert_eq!(err.as_label(), "start_failed");
        assert!(orch.get("srv").await.is_none());
    }

    #[tokio::test]
    async fn test_missing_dependency_fails_dependent() {
        let orch = Orchestrator::new(quiet());
        orch.register(unit("api", &["db"])).await.unwrap();

        let err = orch.start("api").await.unwrap_err();
        match &err {
            OrchestratorError::DependencyFailed { dependency, .. } => assert_eq!(dependency, "db"),
            other => panic!("expected dependency failure, got {other:?}"),
        }
        assert_eq!(err.root_cause().as_label(), "not_registered");
        assert_eq!(orch.status("api").await, Some(ServiceStatus::Error));
    }

    #[tokio::test]
    async fn test_concurrent_starts_share_one_factory_call() {
        let orch = Orchestrator::new(quiet());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        orch.register(
            ServiceDefinition::builder("slow")
                .factory(move |_d: Dependencies, _c: serde_json::Value| {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, ServiceError>(Num(7))
                    }
                })
                .build()
                .unwrap(),
        )
        .await
        .unwrap();

        let (a, b, c) = tokio::join!(orch.start("slow"), orch.start("slow"), orch.start("slow"));
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b) && Arc::ptr_eq(&b, &c));
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let orch = Orchestrator::new(quiet());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        orch.register(
            ServiceDefinition::builder("once")
                .factory(move |_d: Dependencies, _c: serde_json::Value| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, ServiceError>(Num(1)) }
                })
                .build()
                .unwrap(),
        )
        .await
        .unwrap();

        let first = orch.start("once").await.unwrap();
        let second = orch.start("once").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dependents_stop_before_dependency() {
        let orch = Orchestrator::new(quiet());
        let log = Arc::new(Mutex::new(Vec::new()));
        orch.register(tracked("db", &[], &log, Duration::ZERO)).await.unwrap();
        orch.register(tracked("api", &["db"], &log, Duration::from_millis(20)))
            .await
            .unwrap();
        orch.register(tracked("web", &["api"], &log, Duration::from_millis(10)))
            .await
            .unwrap();

        orch.start("web").await.unwrap();
        orch.stop("db").await.unwrap();

        assert_eq!(*log.lock().unwrap(), ["web", "api", "db"]);
        for name in ["db", "api", "web"] {
            assert_eq!(orch.status(name).await, Some(ServiceStatus::Stopped));
            assert!(orch.get(name).await.is_none());
        }
    }

    #[tokio::test]
    async fn test_dependency_stopped_mid_start_fails_dependent() {
        let orch = Orchestrator::new(quiet());
        let log = Arc::new(Mutex::new(Vec::new()));
        orch.register(unit("a", &[])).await.unwrap();
        let slow_log = Arc::clone(&log);
        orch.register(
            ServiceDefinition::builder("b")
                .dependency("a")
                .factory(move |_d: Dependencies, _c: serde_json::Value| {
                    let log = Arc::clone(&slow_log);
                    async move {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<_, ServiceError>(Tracked {
                            name: "b",
                            log,
                            stop_delay: Duration::ZERO,
                        })
                    }
                })
                .build()
                .unwrap(),
        )
        .await
        .unwrap();

        let starter = Arc::clone(&orch);
        let pending = tokio::spawn(async move { starter.start("b").await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        orch.stop("a").await.unwrap();

        let err = pending.await.unwrap().unwrap_err();
        match &err {
            OrchestratorError::DependencyFailed { dependency, .. } => assert_eq!(dependency, "a"),
            other => panic!("expected dependency failure, got {other:?}"),
        }
        assert_eq!(orch.status("a").await, Some(ServiceStatus::Stopped));
        assert_eq!(orch.status("b").await, Some(ServiceStatus::Error));
        assert!(orch.get("b").await.is_none());
        assert_eq!(*log.lock().unwrap(), ["b"]);
    }

    #[tokio::test]
    async fn test_stop_of_unstarted_service_is_noop() {
        let orch = Orchestrator::new(quiet());
        let mut rx = orch.subscribe();
        orch.register(unit("idle", &[])).await.unwrap();

        orch.stop("idle").await.unwrap();
        assert_eq!(orch.status("idle").await, Some(ServiceStatus::Registered));
        assert_eq!(kinds_for(&mut rx, "idle"), [EventKind::ServiceRegistered]);
        assert!(orch.stop("ghost").await.is_err());
    }

    #[tokio::test]
    async fn test_stop_timeout_fails_and_clears_product() {
        let orch = Orchestrator::new(OrchestratorConfig {
            shutdown_timeout: Duration::from_millis(20),
            ..quiet()
        });
        let log = Arc::new(Mutex::new(Vec::new()));
        orch.register(tracked("stuck", &[], &log, Duration::from_secs(5)))
            .await
            .unwrap();
        let mut rx = orch.subscribe();

        orch.start("stuck").await.unwrap();
        let err = orch.stop("stuck").await.unwrap_err();

        assert!(matches!(err, OrchestratorError::StopTimeout { .. }));
        assert_eq!(orch.status("stuck").await, Some(ServiceStatus::Error));
        assert!(orch.get("stuck").await.is_none());
        let failed = std::iter::from_fn(|| rx.try_recv().ok())
            .find(|e| e.kind == EventKind::ServiceStopFailed)
            .unwrap();
        assert_eq!(failed.timeout_ms, Some(20));
    }

    #[tokio::test]
    async fn test_restart_creates_new_product() {
        let orch = Orchestrator::new(quiet());
        let mut rx = orch.subscribe();
        orch.register(unit("svc", &[])).await.unwrap();

        let first = orch.start("svc").await.unwrap();
        let second = orch.restart("svc").await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(orch.status("svc").await, Some(ServiceStatus::Started));
        assert_eq!(orch.service_info("svc").await.unwrap().start_count, 2);
        assert_eq!(
            kinds_for(&mut rx, "svc"),
            [
                EventKind::ServiceRegistered,
                EventKind::ServiceStarting,
                EventKind::ServiceStarted,
                EventKind::ServiceStopping,
                EventKind::ServiceStopped,
                EventKind::ServiceStarting,
                EventKind::ServiceStarted,
            ]
        );
    }

    #[tokio::test]
    async fn test_unregister_started_is_rejected_without_side_effects() {
        let orch = Orchestrator::new(quiet());
        orch.register(unit("db", &[])).await.unwrap();
        orch.register(unit("api", &["db"])).await.unwrap();
        orch.start("api").await.unwrap();
        let mut rx = orch.subscribe();

        let err = orch.unregister("db").await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::IllegalState {
                status: ServiceStatus::Started,
                ..
            }
        ));
        assert!(orch.has("db").await);
        assert!(orch.is_started("db").await);
        assert_eq!(orch.startup_order().await, ["db", "api"]);
        assert!(rx.try_recv().is_err());

        orch.stop("db").await.unwrap();
        orch.unregister("api").await.unwrap();
        assert!(orch.service_info("db").await.unwrap().dependents.is_empty());
    }

    #[tokio::test]
    async fn test_chain_cycle_fails_instead_of_waiting() {
        let orch = Orchestrator::new(OrchestratorConfig {
            enable_circular_dependency_detection: false,
            ..quiet()
        });
        orch.register(unit("a", &["b"])).await.unwrap();
        orch.register(unit("b", &["a"])).await.unwrap();

        let err = tokio::time::timeout(Duration::from_secs(1), orch.start("a"))
            .await
            .expect("start must not hang")
            .unwrap_err();
        assert_eq!(err.root_cause().as_label(), "circular_dependency");
        assert_eq!(orch.status("a").await, Some(ServiceStatus::Error));
        assert_eq!(orch.status("b").await, Some(ServiceStatus::Error));
    }

    #[tokio::test]
    async fn test_bulk_start_reports_failures_and_continues() {
        let orch = Orchestrator::new(quiet());
        orch.register(unit("db", &[])).await.unwrap();
        orch.register(
            ServiceDefinition::builder("bad")
                .factory(|_d: Dependencies, _c: serde_json::Value| async {
                    Err::<Num, _>(ServiceError::fail("nope"))
                })
                .build()
                .unwrap(),
        )
        .await
        .unwrap();
        orch.register(unit("api", &["db"])).await.unwrap();
        let mut rx = orch.subscribe();

        let report = orch.start_all().await;
        assert_eq!(report.succeeded, ["db", "api"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "bad");
        assert!(kinds_for(&mut rx, "bad").contains(&EventKind::BulkStartError));

        let stopped = orch.stop_all().await;
        assert!(stopped.is_success());
        assert_eq!(stopped.succeeded, ["api", "db"]);
        assert!(orch.started_services().await.is_empty());
    }

    #[tokio::test]
    async fn test_start_where_filters_by_definition() {
        let orch = Orchestrator::new(quiet());
        orch.register(unit("db", &[])).await.unwrap();
        orch.register(unit("cache", &[])).await.unwrap();

        let report = orch.start_where(|d| d.name() == "cache").await;
        assert_eq!(report.succeeded, ["cache"]);
        assert!(!orch.is_started("db").await);
    }

    #[tokio::test]
    async fn test_auto_start_failure_is_published_not_returned() {
        let orch = Orchestrator::new(quiet());
        let mut rx = orch.subscribe();

        orch.register(
            ServiceDefinition::builder("eager")
                .auto_start(true)
                .factory(|_d: Dependencies, _c: serde_json::Value| async {
                    Err::<Num, _>(ServiceError::fail("boom"))
                })
                .build()
                .unwrap(),
        )
        .await
        .unwrap();

        assert!(kinds_for(&mut rx, "eager").contains(&EventKind::AutoStartFailed));
        assert_eq!(orch.status("eager").await, Some(ServiceStatus::Error));
    }

    #[tokio::test]
    async fn test_panicking_factory_becomes_start_failure() {
        let orch = Orchestrator::new(quiet());
        orch.register(
            ServiceDefinition::builder("panicky")
                .factory(|_d: Dependencies, _c: serde_json::Value| async {
                    if true {
                        panic!("kaboom");
                    }
                    Ok::<_, ServiceError>(Num(0))
                })
                .build()
                .unwrap(),
        )
        .await
        .unwrap();

        let err = orch.start("panicky").await.unwrap_err();
        assert!(err.to_string().contains("kaboom"));
        assert_eq!(orch.status("panicky").await, Some(ServiceStatus::Error));
    }
}
