//! # Registry: the orchestrator's shared tables.
//!
//! Bundles the definition store, the instance tracker, the dependency graph and
//! the cached startup order. The orchestrator keeps one `Registry` behind a
//! single lock, so every mutation that spans several tables is atomic.
//!
//! ## Rules
//! - The orchestrator is the only writer.
//! - A guard is never held across an `.await` that runs service code.
//! - `order` is recomputed after every change to definitions or edges.

use crate::core::instance::{InstanceTracker, ServiceInfo};
use crate::core::store::DefinitionStore;
use crate::graph::DependencyGraph;
use crate::services::{ServiceDefinition, ServiceStatus};

#[derive(Default)]
pub(crate) struct Registry {
    pub definitions: DefinitionStore,
    pub instances: InstanceTracker,
    pub graph: DependencyGraph,
    pub order: Vec<String>,
}

impl Registry {
    /// Adds the definition's node to the graph and re-links services that
    /// declared it before it existed.
    pub fn link(&mut self, def: &ServiceDefinition) {
        self.graph
            .insert(def.name(), def.dependencies().iter().cloned());
        for dependent in self.definitions.declared_dependents(def.name()) {
            self.graph.add_edge(&dependent, def.name());
        }
    }

    /// Drops the node, its edges and the instance; forgets it as a dependent.
    pub fn unlink(&mut self, name: &str) {
        self.graph.remove(name);
        self.instances.remove(name);
        self.instances.forget_dependent(name);
    }

    pub fn recompute_order(&mut self) {
        self.order = self.graph.order();
    }

    /// Status of a registered service; `None` if unknown.
    pub fn status_of(&self, name: &str) -> Option<ServiceStatus> {
        if !self.definitions.contains(name) {
            return None;
        }
        Some(
            self.instances
                .get(name)
                .map(|i| i.status)
                .unwrap_or(ServiceStatus::Registered),
        )
    }

    pub fn info(&self, name: &str) -> Option<ServiceInfo> {
        let def = self.definitions.get(name)?;
        let inst = self.instances.get(name);

        Some(ServiceInfo {
            name: def.name().to_string(),
            version: def.version().to_string(),
            status: inst.map(|i| i.status).unwrap_or(ServiceStatus::Registered),
            singleton: def.singleton(),
            auto_start: def.auto_start(),
            dependencies: def.dependencies().to_vec(),
            dependents: inst
                .map(|i| i.dependents.iter().cloned().collect())
                .unwrap_or_default(),
            created_at: inst.map(|i| i.created_at),
            started_at: inst.and_then(|i| i.started_at),
            stopped_at: inst.and_then(|i| i.stopped_at),
            uptime: inst.and_then(|i| i.uptime()),
            error: inst.and_then(|i| i.error.as_ref().map(ToString::to_string)),
            retry_count: inst.map(|i| i.recovery.retry_count).unwrap_or(0),
            last_recovery_attempt: inst.and_then(|i| i.recovery.last_attempt),
            recovering: inst.is_some_and(|i| i.recovery.active),
            healthy: inst.and_then(|i| i.health.last.as_ref().map(|h| h.is_healthy())),
            last_health_check: inst.and_then(|i| i.health.last_checked_at),
            health_checks: inst.map(|i| i.health.checks).unwrap_or(0),
            start_count: inst.map(|i| i.start_count).unwrap_or(0),
            metadata: def.metadata().clone(),
        })
    }
}
