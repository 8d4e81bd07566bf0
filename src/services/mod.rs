//! # Service abstractions and definitions.
//!
//! This module provides the service-related types:
//! - [`Service`] - opaque product with optional capabilities
//!   ([`Startable`], [`Stoppable`], [`HealthCheckable`])
//! - [`Factory`] / [`FactoryFn`] - how a product is built
//! - [`Dependencies`] - resolved dependency products passed to a factory
//! - [`ServiceDefinition`] - declarative descriptor bundling factory and metadata
//! - [`ServiceStatus`] - lifecycle state

mod definition;
mod factory;
mod service;
mod status;

pub use definition::{DefinitionBuilder, ServiceDefinition};
pub use factory::{BoxServiceFuture, Dependencies, Factory, FactoryFn, FactoryRef};
pub use service::{
    AsAny, HealthCheckable, HealthStatus, Service, ServiceRef, Startable, Stoppable,
    downcast_service,
};
pub use status::ServiceStatus;
