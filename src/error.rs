//! Error types used by the orchestrator and by managed services.
//!
//! This module defines two main error enums:
//!
//! - [`OrchestratorError`]: errors raised by orchestration operations
//!   (registration, lifecycle transitions, dependency resolution).
//! - [`ServiceError`]: errors raised by service factories and lifecycle hooks.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics.
//! Both are `Clone`: a single start outcome is shared between every caller that
//! coalesced onto the same in-flight attempt.

use std::time::Duration;
use thiserror::Error;

use crate::services::ServiceStatus;

/// # Errors produced by service factories and lifecycle hooks.
///
/// Factories and hooks return this type. Anything convertible from
/// [`anyhow::Error`] can be propagated with `?`.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The operation failed.
    #[error("{reason}")]
    Fail {
        /// The underlying error message.
        reason: String,
    },

    /// The operation did not finish within its time budget.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The exceeded budget.
        timeout: Duration,
    },
}

impl ServiceError {
    /// Shorthand for [`ServiceError::Fail`].
    ///
    /// # Example
    /// ```
    /// use depvisor::ServiceError;
    ///
    /// let err = ServiceError::fail("boom");
    /// assert_eq!(err.to_string(), "boom");
    /// ```
    pub fn fail(reason: impl Into<String>) -> Self {
        ServiceError::Fail {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::Fail { .. } => "service_failed",
            ServiceError::Timeout { .. } => "service_timeout",
        }
    }
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        ServiceError::Fail {
            reason: format!("{err:#}"),
        }
    }
}

/// # Errors produced by the orchestrator.
///
/// Lifecycle operations (`start`, `stop`, `restart`) record the failure on the
/// instance, publish an event and then return the same error to the caller.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum OrchestratorError {
    /// A definition was built without a name.
    #[error("service name must not be empty")]
    EmptyName,

    /// A definition was built without a factory.
    #[error("service '{name}' has no factory")]
    MissingFactory {
        /// Definition name.
        name: String,
    },

    /// A definition with the same name is already registered.
    #[error("service '{name}' is already registered")]
    AlreadyRegistered {
        /// Duplicate name.
        name: String,
    },

    /// The dependency graph contains a cycle.
    #[error("circular dependency detected at '{service}': {}", path.join(" -> "))]
    CircularDependency {
        /// Service at which the traversal closed the cycle.
        service: String,
        /// Cycle path, first and last element are the same service.
        path: Vec<String>,
    },

    /// No definition exists for the name.
    #[error("service '{name}' is not registered")]
    NotRegistered {
        /// Requested name.
        name: String,
    },

    /// The operation is not allowed in the current lifecycle state.
    #[error("cannot {action} service '{name}' while it is {status}")]
    IllegalState {
        /// Service name.
        name: String,
        /// Status observed when the operation was rejected.
        status: ServiceStatus,
        /// Rejected operation.
        action: &'static str,
    },

    /// The factory or the start hook failed.
    #[error("service '{name}' failed to start: {source}")]
    StartFailed {
        /// Service name.
        name: String,
        /// Cause reported by the service.
        #[source]
        source: ServiceError,
    },

    /// A dependency could not be started.
    #[error("service '{name}' failed to start: dependency '{dependency}' unavailable: {source}")]
    DependencyFailed {
        /// Service name.
        name: String,
        /// Dependency that failed.
        dependency: String,
        /// Failure of the dependency.
        #[source]
        source: Box<OrchestratorError>,
    },

    /// The stop hook exceeded the shutdown timeout.
    #[error("service '{name}' did not stop within {timeout:?}")]
    StopTimeout {
        /// Service name.
        name: String,
        /// Configured shutdown timeout.
        timeout: Duration,
    },

    /// The stop hook failed.
    #[error("service '{name}' failed to stop: {source}")]
    StopFailed {
        /// Service name.
        name: String,
        /// Cause reported by the service.
        #[source]
        source: ServiceError,
    },
}

impl OrchestratorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use depvisor::OrchestratorError;
    ///
    /// let err = OrchestratorError::NotRegistered { name: "db".into() };
    /// assert_eq!(err.as_label(), "not_registered");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            OrchestratorError::EmptyName => "empty_name",
            OrchestratorError::MissingFactory { .. } => "missing_factory",
            OrchestratorError::AlreadyRegistered { .. } => "already_registered",
            OrchestratorError::CircularDependency { .. } => "circular_dependency",
            OrchestratorError::NotRegistered { .. } => "not_registered",
            OrchestratorError::IllegalState { .. } => "illegal_state",
            OrchestratorError::StartFailed { .. } => "start_failed",
            OrchestratorError::DependencyFailed { .. } => "dependency_failed",
            OrchestratorError::StopTimeout { .. } => "stop_timeout",
            OrchestratorError::StopFailed { .. } => "stop_failed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }

    /// Returns `true` for errors raised while registering a definition.
    pub fn is_registration(&self) -> bool {
        matches!(
            self,
            OrchestratorError::EmptyName
                | OrchestratorError::MissingFactory { .. }
                | OrchestratorError::AlreadyRegistered { .. }
        )
    }

    /// Walks `DependencyFailed` chains and returns the innermost error.
    ///
    /// # Example
    /// ```
    /// use depvisor::{OrchestratorError, ServiceError};
    ///
    /// let inner = OrchestratorError::StartFailed {
    ///     name: "db".into(),
    ///     source: ServiceError::fail("boom"),
    /// };
    /// let outer = OrchestratorError::DependencyFailed {
    ///     name: "api".into(),
    ///     dependency: "db".into(),
    ///     source: Box::new(inner),
    /// };
    /// assert_eq!(outer.root_cause().as_label(), "start_failed");
    /// ```
    pub fn root_cause(&self) -> &OrchestratorError {
        let mut cur = self;
        while let OrchestratorError::DependencyFailed { source, .. } = cur {
            cur = source;
        }
        cur
    }
}
