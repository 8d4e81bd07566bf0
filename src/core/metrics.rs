//! # Orchestrator metrics.
//!
//! Lock-free counters updated by the lifecycle, health and recovery paths, and
//! a serializable [`Metrics`] snapshot.
//!
//! Rates and uptime are derived from an [`Instant`] captured when the
//! orchestrator was built, never from absolute wall-clock time.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Point-in-time view of the orchestrator counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metrics {
    /// Definitions registered since construction.
    pub registered: u64,
    /// Definitions removed since construction.
    pub unregistered: u64,
    /// Successful starts.
    pub started: u64,
    /// Successful stops.
    pub stopped: u64,
    /// Failed starts and stops.
    pub errored: u64,
    /// Services currently `started`.
    pub running: usize,
    /// Services currently registered.
    pub services: usize,
    /// Sum of successful start durations.
    pub total_start_time: Duration,
    /// `total_start_time / started`.
    pub average_start_time: Duration,
    /// Health probes executed.
    pub health_checks: u64,
    /// Probes that reported unhealthy or timed out.
    pub health_checks_unhealthy: u64,
    /// Probes that returned an error.
    pub health_checks_failed: u64,
    /// Probes per second since construction.
    pub health_check_rate: f64,
    /// Successful recoveries.
    pub recoveries: u64,
    /// Recovery loops that gave up.
    pub recoveries_given_up: u64,
    /// Time since construction.
    pub uptime: Duration,
}

/// Counter storage shared by the orchestrator internals.
pub(crate) struct MetricsRecorder {
    enabled: AtomicBool,
    created: Instant,
    registered: AtomicU64,
    unregistered: AtomicU64,
    started: AtomicU64,
    stopped: AtomicU64,
    errored: AtomicU64,
    start_time_us: AtomicU64,
    health_checks: AtomicU64,
    health_unhealthy: AtomicU64,
    health_failed: AtomicU64,
    recoveries: AtomicU64,
    given_up: AtomicU64,
}

/// Counter selector for [`MetricsRecorder::incr`].
#[derive(Debug, Clone, Copy)]
pub(crate) enum Counter {
    Registered,
    Unregistered,
    Stopped,
    Errored,
    HealthCheck,
    HealthUnhealthy,
    HealthFailed,
    Recovered,
    GivenUp,
}

impl MetricsRecorder {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            created: Instant::now(),
            registered: AtomicU64::new(0),
            unregistered: AtomicU64::new(0),
            started: AtomicU64::new(0),
            stopped: AtomicU64::new(0),
            errored: AtomicU64::new(0),
            start_time_us: AtomicU64::new(0),
            health_checks: AtomicU64::new(0),
            health_unhealthy: AtomicU64::new(0),
            health_failed: AtomicU64::new(0),
            recoveries: AtomicU64::new(0),
            given_up: AtomicU64::new(0),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    #[inline]
    fn on(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn incr(&self, counter: Counter) {
        if !self.on() {
            return;
        }
        let slot = match counter {
            Counter::Registered => &self.registered,
            Counter::Unregistered => &self.unregistered,
            Counter::Stopped => &self.stopped,
            Counter::Errored => &self.errored,
            Counter::HealthCheck => &self.health_checks,
            Counter::HealthUnhealthy => &self.health_unhealthy,
            Counter::HealthFailed => &self.health_failed,
            Counter::Recovered => &self.recoveries,
            Counter::GivenUp => &self.given_up,
        };
        slot.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_start(&self, elapsed: Duration) {
        if !self.on() {
            return;
        }
        let us = elapsed.as_micros().min(u128::from(u64::MAX)) as u64;
        self.started.fetch_add(1, Ordering::Relaxed);
        self.start_time_us.fetch_add(us, Ordering::Relaxed);
    }

    /// Builds a snapshot; `running` and `services` come from the registry.
    pub fn snapshot(&self, running: usize, services: usize) -> Metrics {
        let started = self.started.load(Ordering::Relaxed);
        let total = Duration::from_micros(self.start_time_us.load(Ordering::Relaxed));
        let average = if started == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(total.as_micros() as u64 / started)
        };
        let uptime = self.created.elapsed();
        let health_checks = self.health_checks.load(Ordering::Relaxed);
        let secs = uptime.as_secs_f64();
        let health_check_rate = if secs > 0.0 {
            health_checks as f64 / secs
        } else {
            0.0
        };

        Metrics {
            registered: self.registered.load(Ordering::Relaxed),
            unregistered: self.unregistered.load(Ordering::Relaxed),
            started,
            stopped: self.stopped.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
            running,
            services,
            total_start_time: total,
            average_start_time: average,
            health_checks,
            health_checks_unhealthy: self.health_unhealthy.load(Ordering::Relaxed),
            health_checks_failed: self.health_failed.load(Ordering::Relaxed),
            health_check_rate,
            recoveries: self.recoveries.load(Ordering::Relaxed),
            recoveries_given_up: self.given_up.load(Ordering::Relaxed),
            uptime,
        }
    }
}
