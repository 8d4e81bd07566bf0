//! # Recovery supervisor: bounded restarts with backoff.
//!
//! A recovery loop is scheduled after a failed top-level start or an
//! unhealthy health report. At most one loop owns a service at a time.
//!
//! ```text
//! loop:
//!   retry_count += 1
//!   retry_count > max_retries ──► ServiceRecoveryGivenUp, release
//!   ServiceRecoveryAttempt(attempt, delay = backoff.next(retry_count))
//!   sleep(delay)                 (cancelled by destroy)
//!   restart(name)
//!     ├─ ok  ──► retry_count = 0, ServiceRecovered, release
//!     └─ err ──► ServiceRecoveryFailed, next pass
//! ```
//!
//! The loop ends early when the instance disappears (unregister) or when its
//! recovery epoch changes (explicit start, stop or restart).

use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, info, warn};

use super::lifecycle::StartMode;
use super::metrics::Counter;
use super::orchestrator::Orchestrator;
use crate::events::{Event, EventKind};

impl Orchestrator {
    /// Spawns a recovery loop for `name` unless one is already running.
    pub(crate) fn schedule_recovery(&self, name: &str) {
        let Some(this) = self.handle() else {
            return;
        };
        let name = name.to_string();
        tokio::spawn(async move { this.recovery_loop(name).await });
    }

    /// Resets the retry budget and detaches any running loop.
    pub(crate) async fn reset_recovery(&self, name: &str) {
        let mut reg = self.registry.write().await;
        if let Some(inst) = reg.instances.get_mut(name) {
            inst.recovery.reset();
        }
    }

    /// Claims the service for a new loop; returns the epoch the loop runs under.
    async fn claim_recovery(&self, name: &str) -> Option<u64> {
        let mut reg = self.registry.write().await;
        let inst = reg.instances.get_mut(name)?;
        if inst.recovery.active {
            return None;
        }
        inst.recovery.active = true;
        Some(inst.recovery.epoch)
    }

    /// Releases the claim if the loop still owns it.
    async fn release_recovery(&self, name: &str, epoch: u64, reset_budget: bool) {
        let mut reg = self.registry.write().await;
        if let Some(inst) = reg.instances.get_mut(name) {
            if inst.recovery.epoch == epoch {
                inst.recovery.active = false;
                if reset_budget {
                    inst.recovery.retry_count = 0;
                }
            }
        }
    }

    async fn owns_recovery(&self, name: &str, epoch: u64) -> bool {
        let reg = self.registry.read().await;
        reg.instances
            .get(name)
            .is_some_and(|i| i.recovery.active && i.recovery.epoch == epoch)
    }

    /// Increments the retry counter; `None` if the loop lost ownership.
    async fn next_retry(&self, name: &str, epoch: u64) -> Option<u32> {
        let mut reg = self.registry.write().await;
        let inst = reg.instances.get_mut(name)?;
        if !inst.recovery.active || inst.recovery.epoch != epoch {
            return None;
        }
        inst.recovery.retry_count += 1;
        inst.recovery.last_attempt = Some(SystemTime::now());
        Some(inst.recovery.retry_count)
    }

    async fn recovery_loop(self: Arc<Self>, name: String) {
        let Some(epoch) = self.claim_recovery(&name).await else {
            debug!(service = %name, "recovery already running");
            return;
        };
        let token = self.supervision.clone();

        loop {
            let cfg = self.config();
            let Some(retry) = self.next_retry(&name, epoch).await else {
                return;
            };

            if retry > cfg.max_retries {
                self.release_recovery(&name, epoch, false).await;
                self.metrics.incr(Counter::GivenUp);
                self.bus.publish(
                    Event::new(EventKind::ServiceRecoveryGivenUp)
                        .with_service(name.as_str())
                        .with_attempt(retry - 1)
                        .with_reason(format!("max retries ({}) exceeded", cfg.max_retries)),
                );
                warn!(service = %name, max_retries = cfg.max_retries, "recovery given up");
                return;
            }

            let delay = cfg.backoff().next(retry);
            self.bus.publish(
                Event::new(EventKind::ServiceRecoveryAttempt)
                    .with_service(name.as_str())
                    .with_attempt(retry)
                    .with_delay(delay),
            );
            debug!(service = %name, attempt = retry, ?delay, "recovery scheduled");

            tokio::select! {
                _ = token.cancelled() => {
                    self.release_recovery(&name, epoch, false).await;
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            if !self.owns_recovery(&name, epoch).await {
                return;
            }

            match self.restart_inner(&name, StartMode::Recovery).await {
                Ok(_) => {
                    self.release_recovery(&name, epoch, true).await;
                    self.metrics.incr(Counter::Recovered);
                    self.bus.publish(
                        Event::new(EventKind::ServiceRecovered)
                            .with_service(name.as_str())
                            .with_attempt(retry),
                    );
                    info!(service = %name, attempt = retry, "recovered");
                    return;
                }
                Err(err) => {
                    self.bus.publish(
                        Event::new(EventKind::ServiceRecoveryFailed)
                            .with_service(name.as_str())
                            .with_attempt(retry)
                            .with_reason(err.to_string()),
                    );
                    warn!(service = %name, attempt = retry, error = %err, "recovery attempt failed");
                }
            }
        }
    }
}
