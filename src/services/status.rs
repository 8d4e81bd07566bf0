//! # Lifecycle states of a managed service.
//!
//! ```text
//! registered ──► starting ──► started ──► stopping ──► stopped
//!                   │                        │
//!                   └────────► error ◄───────┘
//! ```
//!
//! `stopped` and `error` both permit a later start/restart.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Definition known, never started.
    Registered,
    /// Start in flight.
    Starting,
    /// Running; product available.
    Started,
    /// Stop in flight.
    Stopping,
    /// Stopped cleanly.
    Stopped,
    /// Last start or stop failed.
    Error,
}

impl ServiceStatus {
    /// Returns the lowercase label used in messages and serialized output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Registered => "registered",
            ServiceStatus::Starting => "starting",
            ServiceStatus::Started => "started",
            ServiceStatus::Stopping => "stopping",
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::Error => "error",
        }
    }

    /// Returns `true` if a new start attempt may begin from this state.
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            ServiceStatus::Registered | ServiceStatus::Stopped | ServiceStatus::Error
        )
    }

    /// Returns `true` while a start or stop is in flight.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, ServiceStatus::Starting | ServiceStatus::Stopping)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restartable_states() {
        assert!(ServiceStatus::Stopped.can_start());
        assert!(ServiceStatus::Error.can_start());
        assert!(!ServiceStatus::Started.can_start());
        assert!(!ServiceStatus::Stopping.can_start());
    }

    #[test]
    fn test_serializes_lowercase() {
        let s = serde_json::to_string(&ServiceStatus::Started).unwrap();
        assert_eq!(s, "\"started\"");
    }
}
