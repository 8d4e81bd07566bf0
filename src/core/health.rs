//! # Health supervisor.
//!
//! Polls every started service that exposes [`HealthCheckable`] on a fixed
//! interval. Probes run concurrently and each one is raced against
//! `health_check_timeout`.
//!
//! ```text
//! interval tick ──► check_health()
//!                     ├─ Healthy             → bookkeeping only
//!                     ├─ Unhealthy / timeout → ServiceUnhealthy  ─┐
//!                     └─ Err(ServiceError)   → HealthCheckFailed ─┴─► schedule_recovery (if enabled)
//! ```
//!
//! Probes never change lifecycle status; only recovery does.

use std::time::{Duration, SystemTime};

use futures::future::join_all;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::metrics::Counter;
use super::orchestrator::Orchestrator;
use crate::events::{Event, EventKind};
use crate::services::{HealthStatus, ServiceRef};

/// Result of one probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HealthOutcome {
    Healthy,
    /// Reported unhealthy or exceeded the probe budget.
    Unhealthy { reason: String },
    /// The probe itself returned an error.
    Failed { error: String },
}

impl HealthOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthOutcome::Healthy)
    }
}

/// Probe result for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: HealthOutcome,
}

impl Orchestrator {
    /// Runs one health pass over the started services, in startup order.
    ///
    /// Services without a health hook are skipped.
    pub async fn check_health(&self) -> Vec<HealthReport> {
        let targets: Vec<(String, ServiceRef)> = {
            let reg = self.registry.read().await;
            reg.order
                .iter()
                .filter_map(|name| {
                    let svc = reg.instances.get(name)?.product()?;
                    svc.as_health_checkable()
                        .is_some()
                        .then(|| (name.clone(), svc.clone()))
                })
                .collect()
        };
        let budget = self.config().health_check_timeout;

        join_all(
            targets
                .into_iter()
                .map(|(name, svc)| self.probe(name, svc, budget)),
        )
        .await
    }

    async fn probe(&self, name: String, svc: ServiceRef, budget: Duration) -> HealthReport {
        let outcome = match svc.as_health_checkable() {
            Some(hook) => match tokio::time::timeout(budget, hook.health_check()).await {
                Ok(Ok(HealthStatus::Healthy)) => HealthOutcome::Healthy,
                Ok(Ok(HealthStatus::Unhealthy { reason })) => HealthOutcome::Unhealthy { reason },
                Ok(Err(err)) => HealthOutcome::Failed {
                    error: err.to_string(),
                },
                Err(_) => HealthOutcome::Unhealthy {
                    reason: format!("health check timed out after {budget:?}"),
                },
            },
            None => HealthOutcome::Healthy,
        };
        self.record_health(&name, &outcome).await;
        HealthReport { name, outcome }
    }

    async fn record_health(&self, name: &str, outcome: &HealthOutcome) {
        {
            let mut reg = self.registry.write().await;
            if let Some(inst) = reg.instances.get_mut(name) {
                inst.health.checks += 1;
                inst.health.last_checked_at = Some(SystemTime::now());
                inst.health.last = Some(match outcome {
                    HealthOutcome::Healthy => HealthStatus::Healthy,
                    HealthOutcome::Unhealthy { reason } => HealthStatus::unhealthy(reason.as_str()),
                    HealthOutcome::Failed { error } => HealthStatus::unhealthy(error.as_str()),
                });
            }
        }
        self.metrics.incr(Counter::HealthCheck);

        match outcome {
            HealthOutcome::Healthy => return,
            HealthOutcome::Unhealthy { reason } => {
                self.metrics.incr(Counter::HealthUnhealthy);
                self.bus.publish(
                    Event::new(EventKind::ServiceUnhealthy)
                        .with_service(name)
                        .with_reason(reason.as_str()),
                );
                warn!(service = %name, %reason, "unhealthy");
            }
            HealthOutcome::Failed { error } => {
                self.metrics.incr(Counter::HealthFailed);
                self.bus.publish(
                    Event::new(EventKind::HealthCheckFailed)
                        .with_service(name)
                        .with_reason(error.as_str()),
                );
                warn!(service = %name, %error, "health check failed");
            }
        }

        if self.config().enable_auto_recovery {
            self.schedule_recovery(name);
        }
    }

    /// (Re)starts the periodic health loop with the current configuration.
    pub(crate) fn spawn_health_loop(&self) {
        let token = self.renew_health_token();
        let Some(period) = self.config().health_interval() else {
            debug!("health loop disabled");
            return;
        };
        let me = self.weak();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(orch) = me.upgrade() else {
                    break;
                };
                orch.check_health().await;
            }
        });
    }
}
