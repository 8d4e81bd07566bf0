//! # Managed service abstraction and optional lifecycle capabilities.
//!
//! A factory produces a [`Service`]. The orchestrator treats it as opaque and
//! only asks, through explicit capability accessors, whether it also supports:
//! - [`Startable`]: awaited once after construction, before `started`;
//! - [`Stoppable`]: awaited during stop, bounded by the shutdown timeout;
//! - [`HealthCheckable`]: polled by the health supervisor.
//!
//! The common handle type is [`ServiceRef`], an `Arc<dyn Service>`.
//!
//! # Example
//! ```
//! use async_trait::async_trait;
//! use depvisor::{Service, ServiceError, Stoppable};
//!
//! struct Pool;
//!
//! #[async_trait]
//! impl Stoppable for Pool {
//!     async fn stop(&self) -> Result<(), ServiceError> {
//!         // close connections...
//!         Ok(())
//!     }
//! }
//!
//! impl Service for Pool {
//!     fn as_stoppable(&self) -> Option<&dyn Stoppable> {
//!         Some(self)
//!     }
//! }
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ServiceError;

/// Shared handle to a service product.
pub type ServiceRef = Arc<dyn Service>;

/// Type-erasure helper so a [`ServiceRef`] can be downcast to its concrete type.
///
/// Implemented for every `Send + Sync + 'static` type.
pub trait AsAny: Any + Send + Sync {
    /// Converts the shared handle into `Arc<dyn Any>`.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A value produced by a service factory.
///
/// Every capability defaults to "not supported".
pub trait Service: AsAny {
    /// Start hook, if the service has one.
    fn as_startable(&self) -> Option<&dyn Startable> {
        None
    }

    /// Stop hook, if the service has one.
    fn as_stoppable(&self) -> Option<&dyn Stoppable> {
        None
    }

    /// Health hook, if the service has one.
    fn as_health_checkable(&self) -> Option<&dyn HealthCheckable> {
        None
    }
}

impl fmt::Debug for dyn Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service").finish_non_exhaustive()
    }
}

/// Async start hook.
#[async_trait]
pub trait Startable: Send + Sync {
    /// Finishes bringing the service up after its factory returned.
    async fn start(&self) -> Result<(), ServiceError>;
}

/// Async stop hook.
#[async_trait]
pub trait Stoppable: Send + Sync {
    /// Releases resources. Raced against the shutdown timeout.
    async fn stop(&self) -> Result<(), ServiceError>;
}

/// Result of a health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Service works as expected.
    Healthy,
    /// Service is reachable but reports a problem.
    Unhealthy {
        /// Reported problem.
        reason: String,
    },
}

impl HealthStatus {
    /// Shorthand for [`HealthStatus::Unhealthy`].
    pub fn unhealthy(reason: impl Into<String>) -> Self {
        HealthStatus::Unhealthy {
            reason: reason.into(),
        }
    }

    /// Returns `true` for [`HealthStatus::Healthy`].
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Async health probe.
#[async_trait]
pub trait HealthCheckable: Send + Sync {
    /// Probes the service. Raced against the health-check timeout.
    async fn health_check(&self) -> Result<HealthStatus, ServiceError>;
}

/// Downcasts a shared service handle to its concrete type.
///
/// Returns `None` when the product is of another type.
pub fn downcast_service<T: Service>(service: ServiceRef) -> Option<Arc<T>> {
    service.into_any().downcast::<T>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain(u32);
    impl Service for Plain {}

    struct Other;
    impl Service for Other {}

    #[test]
    fn test_downcast_to_concrete_type() {
        let svc: ServiceRef = Arc::new(Plain(7));
        let plain = downcast_service::<Plain>(svc.clone()).unwrap();
        assert_eq!(plain.0, 7);
        assert!(downcast_service::<Other>(svc).is_none());
    }

    #[test]
    fn test_handles_are_debug() {
        let svc: ServiceRef = Arc::new(Plain(1));
        let res: Result<ServiceRef, ()> = Ok(svc);
        assert_eq!(format!("{res:?}"), "Ok(Service { .. })");
        assert!(res.err().is_none());
    }

    #[test]
    fn test_capabilities_default_to_none() {
        let svc: ServiceRef = Arc::new(Plain(1));
        assert!(svc.as_startable().is_none());
        assert!(svc.as_stoppable().is_none());
        assert!(svc.as_health_checkable().is_none());
    }
}
