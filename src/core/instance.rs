//! # Runtime records of managed services.
//!
//! [`ServiceInstance`] is the mutable record kept for every service that has
//! been started at least once; [`InstanceTracker`] owns them, keyed by name.
//!
//! ## Rules
//! - Exactly one instance per name; it is created on the first start attempt
//!   and reused by every later attempt.
//! - The product is held only while the service is `started` (and while a
//!   stop is in flight); it is dropped on every stop, successful or not.
//! - `inflight` is set only while `status == Starting`; concurrent callers clone
//!   the receiver and await the single outcome.

use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime};

use indexmap::IndexSet;
use serde::Serialize;
use tokio::sync::watch;

use crate::error::OrchestratorError;
use crate::services::{HealthStatus, ServiceRef, ServiceStatus};

/// Outcome of one start attempt, shared with every coalesced caller.
pub(crate) type StartOutcome = Result<ServiceRef, OrchestratorError>;

/// Completion signal of an in-flight start: `None` until resolved.
pub(crate) type StartSignal = watch::Receiver<Option<StartOutcome>>;

/// Mutable runtime record of one service.
pub(crate) struct ServiceInstance {
    pub service: Option<ServiceRef>,
    pub status: ServiceStatus,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub started_instant: Option<Instant>,
    pub stopped_at: Option<SystemTime>,
    /// Services that resolved this one as a dependency.
    pub dependents: IndexSet<String>,
    pub error: Option<OrchestratorError>,
    pub inflight: Option<StartSignal>,
    pub recovery: RecoveryMeta,
    pub health: HealthMeta,
    pub start_count: u64,
}

/// Retry bookkeeping of the recovery supervisor.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecoveryMeta {
    pub retry_count: u32,
    pub last_attempt: Option<SystemTime>,
    /// A recovery loop currently owns this service.
    pub active: bool,
    /// Bumped by explicit starts; a loop that sees a newer epoch exits.
    pub epoch: u64,
}

impl RecoveryMeta {
    /// Resets the budget and detaches any running loop.
    pub fn reset(&mut self) {
        self.retry_count = 0;
        self.active = false;
        self.epoch += 1;
    }
}

/// Last observation of the health supervisor.
#[derive(Debug, Clone, Default)]
pub(crate) struct HealthMeta {
    pub last: Option<HealthStatus>,
    pub last_checked_at: Option<SystemTime>,
    pub checks: u64,
}

impl ServiceInstance {
    pub fn new() -> Self {
        Self {
            service: None,
            status: ServiceStatus::Registered,
            created_at: SystemTime::now(),
            started_at: None,
            started_instant: None,
            stopped_at: None,
            dependents: IndexSet::new(),
            error: None,
            inflight: None,
            recovery: RecoveryMeta::default(),
            health: HealthMeta::default(),
            start_count: 0,
        }
    }

    /// Time spent in the current `started` pass.
    pub fn uptime(&self) -> Option<Duration> {
        match self.status {
            ServiceStatus::Started => self.started_instant.map(|t| t.elapsed()),
            _ => None,
        }
    }

    /// Product of a started service.
    pub fn product(&self) -> Option<&ServiceRef> {
        match self.status {
            ServiceStatus::Started => self.service.as_ref(),
            _ => None,
        }
    }
}

/// Owner of all [`ServiceInstance`] records.
#[derive(Default)]
pub(crate) struct InstanceTracker {
    instances: HashMap<String, ServiceInstance>,
}

impl InstanceTracker {
    pub fn get(&self, name: &str) -> Option<&ServiceInstance> {
        self.instances.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ServiceInstance> {
        self.instances.get_mut(name)
    }

    /// Returns the instance, creating a fresh one on first use.
    pub fn get_or_create(&mut self, name: &str) -> &mut ServiceInstance {
        self.instances
            .entry(name.to_string())
            .or_insert_with(ServiceInstance::new)
    }

    pub fn remove(&mut self, name: &str) -> Option<ServiceInstance> {
        self.instances.remove(name)
    }

    /// Forgets `name` as a dependent of every other instance.
    pub fn forget_dependent(&mut self, name: &str) {
        for inst in self.instances.values_mut() {
            inst.dependents.shift_remove(name);
        }
    }

    pub fn count_with(&self, status: ServiceStatus) -> usize {
        self.instances.values().filter(|i| i.status == status).count()
    }
}

/// Read-only view of a service for introspection.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub status: ServiceStatus,
    pub singleton: bool,
    pub auto_start: bool,
    /// Declared dependencies.
    pub dependencies: Vec<String>,
    /// Services that resolved this one as a dependency.
    pub dependents: Vec<String>,
    pub created_at: Option<SystemTime>,
    pub started_at: Option<SystemTime>,
    pub stopped_at: Option<SystemTime>,
    /// Time spent in the current `started` pass.
    pub uptime: Option<Duration>,
    /// Message of the last failure, if the service is in `error`.
    pub error: Option<String>,
    pub retry_count: u32,
    pub last_recovery_attempt: Option<SystemTime>,
    pub recovering: bool,
    /// `Some(true)` healthy, `Some(false)` unhealthy or failed, `None` never checked.
    pub healthy: Option<bool>,
    pub last_health_check: Option<SystemTime>,
    pub health_checks: u64,
    pub start_count: u64,
    pub metadata: std::collections::BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_reuses_instance() {
        let mut tracker = InstanceTracker::default();
        tracker.get_or_create("db").start_count = 3;
        let inst = tracker.get_or_create("db");
        assert_eq!(inst.start_count, 3);
        assert_eq!(inst.status, ServiceStatus::Registered);
    }

    #[test]
    fn test_forget_dependent_everywhere() {
        let mut tracker = InstanceTracker::default();
        tracker.get_or_create("db").dependents.insert("api".into());
        tracker.get_or_create("cache").dependents.insert("api".into());
        tracker.forget_dependent("api");
        assert!(tracker.get("db").unwrap().dependents.is_empty());
        assert!(tracker.get("cache").unwrap().dependents.is_empty());
    }

    #[test]
    fn test_recovery_reset_detaches_loop() {
        let mut meta = RecoveryMeta {
            retry_count: 2,
            active: true,
            ..RecoveryMeta::default()
        };
        meta.reset();
        assert_eq!(meta.retry_count, 0);
        assert!(!meta.active);
        assert_eq!(meta.epoch, 1);
    }

    #[test]
    fn test_uptime_only_while_started() {
        let mut inst = ServiceInstance::new();
        inst.started_instant = Some(Instant::now());
        assert!(inst.uptime().is_none());
        inst.status = ServiceStatus::Started;
        assert!(inst.uptime().is_some());
    }
}
