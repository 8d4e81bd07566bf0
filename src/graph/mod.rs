//! Dependency graph: adjacency sets, cycle detection and startup ordering.
//!
//! See [`DependencyGraph`].

mod dependency;

pub use dependency::DependencyGraph;
