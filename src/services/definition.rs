//! # Service definition and its builder.
//!
//! A [`ServiceDefinition`] is the static, declarative descriptor of a managed
//! service: name, version, dependencies, flags, factory, config and metadata.
//! It is immutable once registered.
//!
//! ## Rules
//! - The name must not be empty ([`OrchestratorError::EmptyName`]).
//! - A factory is mandatory ([`OrchestratorError::MissingFactory`]).
//! - Dependencies keep their declared order; duplicates are collapsed.
//! - Dependencies may name services that are not registered yet.
//!
//! ## Example
//! ```rust
//! use depvisor::{Dependencies, ServiceDefinition, Service, ServiceError};
//!
//! struct Api;
//! impl Service for Api {}
//!
//! let def = ServiceDefinition::builder("api")
//!     .version("2.1.0")
//!     .depends_on(["db", "cache"])
//!     .auto_start(true)
//!     .factory(|_deps: Dependencies, _cfg: serde_json::Value| async move {
//!         Ok::<_, ServiceError>(Api)
//!     })
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(def.dependencies(), ["db", "cache"]);
//! assert!(def.auto_start());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use serde_json::Value;

use crate::error::{OrchestratorError, ServiceError};
use crate::services::factory::{Dependencies, FactoryFn, FactoryRef};
use crate::services::service::Service;

/// Declarative descriptor of a managed service.
#[derive(Clone)]
pub struct ServiceDefinition {
    name: String,
    version: String,
    dependencies: Vec<String>,
    singleton: bool,
    auto_start: bool,
    factory: FactoryRef,
    config: Value,
    metadata: BTreeMap<String, String>,
}

impl fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("dependencies", &self.dependencies)
            .field("singleton", &self.singleton)
            .field("auto_start", &self.auto_start)
            .field("config", &self.config)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl ServiceDefinition {
    /// Creates a builder for the named service.
    pub fn builder(name: impl Into<String>) -> DefinitionBuilder {
        DefinitionBuilder::new(name)
    }

    /// Unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version string (informational).
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Declared dependencies, in declaration order.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Returns `true` if `name` is a declared dependency.
    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.iter().any(|d| d == name)
    }

    /// Singleton flag (informational; one product per name is always kept).
    pub fn singleton(&self) -> bool {
        self.singleton
    }

    /// Start automatically right after registration.
    pub fn auto_start(&self) -> bool {
        self.auto_start
    }

    /// Factory handle.
    pub fn factory(&self) -> &FactoryRef {
        &self.factory
    }

    /// Opaque configuration passed to the factory.
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Free-form metadata.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}

/// Builder for [`ServiceDefinition`] with fluent API.
pub struct DefinitionBuilder {
    name: String,
    version: String,
    dependencies: Vec<String>,
    singleton: bool,
    auto_start: bool,
    factory: Option<FactoryRef>,
    config: Value,
    metadata: BTreeMap<String, String>,
}

impl DefinitionBuilder {
    /// Creates a builder with defaults: version `1.0.0`, no dependencies,
    /// singleton, no auto start, `null` config.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: "1.0.0".to_string(),
            dependencies: Vec::new(),
            singleton: true,
            auto_start: false,
            factory: None,
            config: Value::Null,
            metadata: BTreeMap::new(),
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Appends one dependency.
    pub fn dependency(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.dependencies.contains(&name) {
            self.dependencies.push(name);
        }
        self
    }

    /// Appends several dependencies, preserving order.
    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self = self.dependency(name);
        }
        self
    }

    pub fn singleton(mut self, singleton: bool) -> Self {
        self.singleton = singleton;
        self
    }

    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    pub fn config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Sets the factory from a closure.
    pub fn factory<F, Fut, S>(mut self, f: F) -> Self
    where
        F: Fn(Dependencies, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, ServiceError>> + Send + 'static,
        S: Service,
    {
        self.factory = Some(FactoryFn::arc(f));
        self
    }

    /// Sets an existing factory handle.
    pub fn factory_ref(mut self, factory: FactoryRef) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Validates and builds the definition.
    pub fn build(self) -> Result<ServiceDefinition, OrchestratorError> {
        if self.name.trim().is_empty() {
            return Err(OrchestratorError::EmptyName);
        }
        let factory = self.factory.ok_or_else(|| OrchestratorError::MissingFactory {
            name: self.name.clone(),
        })?;

        Ok(ServiceDefinition {
            name: self.name,
            version: self.version,
            dependencies: self.dependencies,
            singleton: self.singleton,
            auto_start: self.auto_start,
            factory,
            config: self.config,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unit;
    impl Service for Unit {}

    fn unit_factory(b: DefinitionBuilder) -> DefinitionBuilder {
        b.factory(|_d: Dependencies, _c: Value| async { Ok::<_, ServiceError>(Unit) })
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = unit_factory(ServiceDefinition::builder("  ")).build().unwrap_err();
        assert!(matches!(err, OrchestratorError::EmptyName));
    }

    #[test]
    fn test_missing_factory_rejected() {
        let err = ServiceDefinition::builder("db").build().unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingFactory { name } if name == "db"));
    }

    #[test]
    fn test_duplicate_dependencies_collapse() {
        let def = unit_factory(ServiceDefinition::builder("api"))
            .depends_on(["db", "cache", "db"])
            .dependency("cache")
            .build()
            .unwrap();
        assert_eq!(def.dependencies(), ["db", "cache"]);
        assert!(def.depends_on("cache"));
        assert!(!def.depends_on("queue"));
    }

    #[test]
    fn test_defaults() {
        let def = unit_factory(ServiceDefinition::builder("x")).build().unwrap();
        assert_eq!(def.version(), "1.0.0");
        assert!(def.singleton());
        assert!(!def.auto_start());
        assert!(def.config().is_null());
    }
}
