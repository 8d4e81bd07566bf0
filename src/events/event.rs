//! # Runtime events emitted by the orchestrator.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Registration events**: definitions added/removed, graph warnings
//! - **Lifecycle events**: start/stop flow of a single service
//! - **Supervision events**: health checks and recovery
//! - **Runtime events**: bulk operations, configuration, subscriber health
//!
//! The [`Event`] struct carries additional metadata such as timestamps, service name,
//! reasons, durations and recovery attempts.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use depvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ServiceRecoveryAttempt)
//!     .with_service("db")
//!     .with_attempt(2)
//!     .with_delay(Duration::from_millis(20));
//!
//! assert_eq!(ev.kind, EventKind::ServiceRecoveryAttempt);
//! assert_eq!(ev.service.as_deref(), Some("db"));
//! assert_eq!(ev.delay_ms, Some(20));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Registration events ===
    /// Definition registered.
    ///
    /// Sets: `service`
    ServiceRegistered,

    /// Definition removed.
    ///
    /// Sets: `service`
    ServiceUnregistered,

    /// A registered definition depends on a name that is not registered (yet).
    ///
    /// Sets: `service`, `dependency`
    UnknownDependency,

    /// Registration closed a cycle in the dependency graph.
    ///
    /// Sets: `service`, `reason` (cycle path)
    CircularDependencyDetected,

    // === Lifecycle events ===
    /// Start attempt began.
    ///
    /// Sets: `service`
    ServiceStarting,

    /// Service reached `started`.
    ///
    /// Sets: `service`, `duration_ms`
    ServiceStarted,

    /// Start attempt failed (factory, start hook or dependency).
    ///
    /// Sets: `service`, `reason`
    ServiceStartFailed,

    /// Automatic start during registration failed.
    ///
    /// Sets: `service`, `reason`
    AutoStartFailed,

    /// Stop began.
    ///
    /// Sets: `service`
    ServiceStopping,

    /// Service reached `stopped`.
    ///
    /// Sets: `service`
    ServiceStopped,

    /// Stop hook failed or exceeded the shutdown timeout.
    ///
    /// Sets: `service`, `reason`, `timeout_ms` (timeout only)
    ServiceStopFailed,

    // === Supervision events ===
    /// Health hook reported unhealthy or timed out.
    ///
    /// Sets: `service`, `reason`
    ServiceUnhealthy,

    /// Health hook returned an error.
    ///
    /// Sets: `service`, `reason`
    HealthCheckFailed,

    /// Recovery restart scheduled.
    ///
    /// Sets: `service`, `attempt`, `delay_ms`
    ServiceRecoveryAttempt,

    /// Recovery restart succeeded.
    ///
    /// Sets: `service`, `attempt`
    ServiceRecovered,

    /// Recovery restart failed; another attempt may follow.
    ///
    /// Sets: `service`, `attempt`, `reason`
    ServiceRecoveryFailed,

    /// Retry budget exhausted; service stays in `error`.
    ///
    /// Sets: `service`, `attempt`
    ServiceRecoveryGivenUp,

    // === Runtime events ===
    /// `start_all` failed for one service.
    ///
    /// Sets: `service`, `reason`
    BulkStartError,

    /// `stop_all` failed for one service.
    ///
    /// Sets: `service`, `reason`
    BulkStopError,

    /// Orchestrator configuration replaced.
    ConfigUpdated,

    /// Subscriber panicked during event processing.
    ///
    /// Sets: `service` (subscriber name), `reason`
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `service` (subscriber name), `reason`
    SubscriberOverflow,
}

impl EventKind {
    /// Returns a short stable label (kebab-case) used by log output.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::ServiceRegistered => "registered",
            EventKind::ServiceUnregistered => "unregistered",
            EventKind::UnknownDependency => "unknown-dependency",
            EventKind::CircularDependencyDetected => "circular-dependency",
            EventKind::ServiceStarting => "starting",
            EventKind::ServiceStarted => "started",
            EventKind::ServiceStartFailed => "start-failed",
            EventKind::AutoStartFailed => "auto-start-failed",
            EventKind::ServiceStopping => "stopping",
            EventKind::ServiceStopped => "stopped",
            EventKind::ServiceStopFailed => "stop-failed",
            EventKind::ServiceUnhealthy => "unhealthy",
            EventKind::HealthCheckFailed => "health-check-failed",
            EventKind::ServiceRecoveryAttempt => "recovery-attempt",
            EventKind::ServiceRecovered => "recovered",
            EventKind::ServiceRecoveryFailed => "recovery-failed",
            EventKind::ServiceRecoveryGivenUp => "recovery-given-up",
            EventKind::BulkStartError => "bulk-start-error",
            EventKind::BulkStopError => "bulk-stop-error",
            EventKind::ConfigUpdated => "config-updated",
            EventKind::SubscriberPanicked => "subscriber-panicked",
            EventKind::SubscriberOverflow => "subscriber-overflow",
        }
    }

    /// Returns `true` for kinds that report a failure.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            EventKind::ServiceStartFailed
                | EventKind::AutoStartFailed
                | EventKind::ServiceStopFailed
                | EventKind::ServiceUnhealthy
                | EventKind::HealthCheckFailed
                | EventKind::ServiceRecoveryFailed
                | EventKind::ServiceRecoveryGivenUp
                | EventKind::CircularDependencyDetected
                | EventKind::BulkStartError
                | EventKind::BulkStopError
                | EventKind::SubscriberPanicked
                | EventKind::SubscriberOverflow
        )
    }
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the service, if applicable.
    pub service: Option<Arc<str>>,
    /// Dependency name (for `UnknownDependency`).
    pub dependency: Option<Arc<str>>,
    /// Human-readable reason (errors, cycle path, overflow details).
    pub reason: Option<Arc<str>>,
    /// Start duration in milliseconds (compact).
    pub duration_ms: Option<u32>,
    /// Timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Recovery delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Recovery attempt (starting from 1).
    pub attempt: Option<u32>,
}

#[inline]
fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            service: None,
            dependency: None,
            reason: None,
            duration_ms: None,
            timeout_ms: None,
            delay_ms: None,
            attempt: None,
        }
    }

    /// Attaches a service name.
    #[inline]
    pub fn with_service(mut self, service: impl Into<Arc<str>>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Attaches a dependency name.
    #[inline]
    pub fn with_dependency(mut self, dependency: impl Into<Arc<str>>) -> Self {
        self.dependency = Some(dependency.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a start duration (stored as milliseconds).
    #[inline]
    pub fn with_duration(mut self, d: Duration) -> Self {
        self.duration_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a timeout (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a recovery delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a recovery attempt number.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_service(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_service(subscriber)
            .with_reason(info)
    }

    /// Returns `true` if the event concerns the given service.
    #[inline]
    pub fn is_for(&self, service: &str) -> bool {
        self.service.as_deref() == Some(service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let a = Event::new(EventKind::ServiceStarting);
        let b = Event::new(EventKind::ServiceStarted);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_durations_saturate() {
        let ev = Event::new(EventKind::ServiceStarted).with_duration(Duration::from_secs(u64::MAX));
        assert_eq!(ev.duration_ms, Some(u32::MAX));
    }

    #[test]
    fn test_overflow_event_names_subscriber() {
        let ev = Event::subscriber_overflow("metrics", "full");
        assert!(ev.is_for("metrics"));
        assert!(ev.kind.is_failure());
        assert_eq!(ev.reason.as_deref(), Some("subscriber=metrics reason=full"));
    }
}
