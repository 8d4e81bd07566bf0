//! # Service factories (`Factory`, `FactoryFn`) and resolved dependencies.
//!
//! [`FactoryFn`] wraps a closure `F: Fn(Dependencies, Value) -> Fut`, producing a
//! fresh future per invocation. Every start attempt calls the factory once with
//! the dependencies resolved for that attempt and the definition's config.
//!
//! ## Example
//! ```rust
//! use depvisor::{Dependencies, FactoryFn, FactoryRef, Service, ServiceError};
//!
//! struct Cache;
//! impl Service for Cache {}
//!
//! let f: FactoryRef = FactoryFn::arc(|_deps: Dependencies, _cfg: serde_json::Value| async move {
//!     Ok::<_, ServiceError>(Cache)
//! });
//! # let _ = f;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::error::ServiceError;
use crate::services::service::{Service, ServiceRef, downcast_service};

/// Boxed future returned by [`Factory::create`].
pub type BoxServiceFuture = Pin<Box<dyn Future<Output = Result<ServiceRef, ServiceError>> + Send>>;

/// Shared handle to a factory.
pub type FactoryRef = Arc<dyn Factory>;

/// Builds a service product from its resolved dependencies and config.
pub trait Factory: Send + Sync + 'static {
    /// Creates a new product. Called at most once per lifecycle pass.
    fn create(&self, deps: Dependencies, config: Value) -> BoxServiceFuture;
}

/// Function-backed factory.
pub struct FactoryFn<F> {
    f: F,
}

impl<F> FactoryFn<F> {
    /// Wraps a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Wraps a closure and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

impl<F, Fut, S> Factory for FactoryFn<F>
where
    F: Fn(Dependencies, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<S, ServiceError>> + Send + 'static,
    S: Service,
{
    fn create(&self, deps: Dependencies, config: Value) -> BoxServiceFuture {
        let fut = (self.f)(deps, config);
        Box::pin(async move { fut.await.map(|svc| Arc::new(svc) as ServiceRef) })
    }
}

/// Products of the dependencies of a service, keyed by name.
#[derive(Clone, Default)]
pub struct Dependencies {
    services: HashMap<String, ServiceRef>,
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("Dependencies").field("services", &names).finish()
    }
}

impl Dependencies {
    pub(crate) fn insert(&mut self, name: impl Into<String>, service: ServiceRef) {
        self.services.insert(name.into(), service);
    }

    /// Returns the product of the named dependency.
    pub fn get(&self, name: &str) -> Option<ServiceRef> {
        self.services.get(name).cloned()
    }

    /// Returns the product of the named dependency as its concrete type.
    pub fn get_as<T: Service>(&self, name: &str) -> Option<Arc<T>> {
        self.get(name).and_then(downcast_service::<T>)
    }

    /// Like [`get_as`](Self::get_as), but missing or mistyped dependencies become
    /// a [`ServiceError`] so factories can use `?`.
    pub fn require<T: Service>(&self, name: &str) -> Result<Arc<T>, ServiceError> {
        let svc = self
            .get(name)
            .ok_or_else(|| ServiceError::fail(format!("dependency '{name}' not resolved")))?;
        downcast_service::<T>(svc).ok_or_else(|| {
            ServiceError::fail(format!(
                "dependency '{name}' is not a {}",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Names of the resolved dependencies (unordered).
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Number of resolved dependencies.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns `true` if the service has no dependencies.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(u32);
    impl Service for Counter {}

    #[tokio::test]
    async fn test_factory_fn_boxes_product() {
        let f = FactoryFn::new(|deps: Dependencies, cfg: Value| async move {
            let base = deps.require::<Counter>("base")?;
            let add = cfg["add"].as_u64().unwrap_or(0) as u32;
            Ok::<_, ServiceError>(Counter(base.0 + add))
        });

        let mut deps = Dependencies::default();
        deps.insert("base", Arc::new(Counter(40)));

        let svc = f.create(deps, serde_json::json!({ "add": 2 })).await.unwrap();
        assert_eq!(downcast_service::<Counter>(svc).unwrap().0, 42);
    }

    #[test]
    fn test_require_reports_missing_dependency() {
        let deps = Dependencies::default();
        let err = deps.require::<Counter>("db").err().unwrap();
        assert_eq!(err, ServiceError::fail("dependency 'db' not resolved"));
    }
}
