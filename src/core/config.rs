//! # Orchestrator configuration.
//!
//! Provides [`OrchestratorConfig`] centralized settings for the orchestrator runtime.
//!
//! Config is used in three ways:
//! 1. **Construction**: `OrchestratorBuilder::new(config)`
//! 2. **Runtime reads**: every lifecycle/health/recovery decision reads the current value
//! 3. **Replacement**: `Orchestrator::update_config(config)` (publishes `ConfigUpdated`)
//!
//! ## Sentinel values
//! - `max_retries = 0` → recovery gives up immediately
//! - `health_check_interval = 0s` → health loop disabled (same as `enable_health_checks = false`)

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policies::{BackoffPolicy, JitterPolicy};

/// Global configuration for the orchestrator runtime.
///
/// All fields are public; every field has a default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Run the periodic health loop.
    pub enable_health_checks: bool,

    /// Period of the health loop.
    pub health_check_interval: Duration,

    /// Budget of a single health probe. A probe that exceeds it counts as unhealthy.
    pub health_check_timeout: Duration,

    /// Maintain counters returned by `Orchestrator::metrics`.
    pub enable_metrics: bool,

    /// Restart services after a failed start or an unhealthy report.
    pub enable_auto_recovery: bool,

    /// Recovery restarts attempted before giving up.
    pub max_retries: u32,

    /// Linear backoff step: the n-th recovery waits `retry_delay × n`.
    pub retry_delay: Duration,

    /// Cap for the recovery delay.
    pub max_retry_delay: Duration,

    /// Jitter applied to recovery delays.
    pub jitter: JitterPolicy,

    /// Budget of a single stop hook. Exceeding it fails the stop.
    pub shutdown_timeout: Duration,

    /// Check for cycles on every registration.
    pub enable_circular_dependency_detection: bool,

    /// Capacity of the event bus ring buffer (min 1).
    pub bus_capacity: usize,
}

impl OrchestratorConfig {
    /// Backoff policy used by the recovery supervisor.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::linear(self.retry_delay)
            .with_max(self.max_retry_delay)
            .with_jitter(self.jitter)
    }

    /// Health-loop period, `None` when the loop should not run.
    #[inline]
    pub fn health_interval(&self) -> Option<Duration> {
        if !self.enable_health_checks || self.health_check_interval == Duration::ZERO {
            None
        } else {
            Some(self.health_check_interval)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for OrchestratorConfig {
    /// Default configuration:
    ///
    /// - health checks every 30s, 5s probe budget
    /// - metrics and auto recovery enabled
    /// - 3 retries, linear 1s step capped at 60s, no jitter
    /// - 10s shutdown timeout
    /// - cycle detection enabled
    /// - bus capacity 1024
    fn default() -> Self {
        Self {
            enable_health_checks: true,
            health_check_interval: Duration::from_secs(30),
            health_check_timeout: Duration::from_secs(5),
            enable_metrics: true,
            enable_auto_recovery: true,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(60),
            jitter: JitterPolicy::None,
            shutdown_timeout: Duration::from_secs(10),
            enable_circular_dependency_detection: true,
            bus_capacity: 1024,
        }
    }
}
