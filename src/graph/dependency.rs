//! # Dependency graph with cycle detection and topological ordering.
//!
//! Nodes are registered service names, edges point from a service to the
//! services it depends on. Nodes and edges keep insertion order, which makes
//! every traversal (and therefore the startup order) reproducible.
//!
//! ## Algorithms
//! ```text
//! detect_cycle(): DFS, colors white → gray (on stack) → black (done)
//!                 edge into a gray node = back edge = cycle
//!
//! order():        same DFS, emit node after all its dependencies (post-order)
//!                 back edges are skipped, so the result is total even with a cycle
//! ```
//!
//! Edges pointing at names that are not nodes (forward references) are kept
//! but ignored by both traversals until the target is inserted.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};

use crate::error::OrchestratorError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    Gray,
    Black,
}

/// Directed depends-on graph keyed by service name.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: IndexMap<String, IndexSet<String>>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node or replaces its outgoing edges.
    pub fn insert<I, S>(&mut self, name: impl Into<String>, deps: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let deps = deps.into_iter().map(Into::into).collect();
        self.edges.insert(name.into(), deps);
    }

    /// Adds a single edge `from → to`; no-op if `from` is not a node.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        if let Some(deps) = self.edges.get_mut(from) {
            deps.insert(to.to_string());
        }
    }

    /// Removes the node and every edge that references it.
    ///
    /// Returns `true` if the node existed.
    pub fn remove(&mut self, name: &str) -> bool {
        let existed = self.edges.shift_remove(name).is_some();
        for deps in self.edges.values_mut() {
            deps.shift_remove(name);
        }
        existed
    }

    /// Returns `true` if `name` is a node.
    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    /// Outgoing edges of `name`, in declaration order.
    pub fn dependencies_of(&self, name: &str) -> Option<&IndexSet<String>> {
        self.edges.get(name)
    }

    /// Nodes that have an edge into `name`, in registration order.
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.contains(name))
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Edge targets of `name` that are not nodes.
    pub fn missing_dependencies(&self, name: &str) -> Vec<String> {
        self.edges
            .get(name)
            .map(|deps| {
                deps.iter()
                    .filter(|d| !self.edges.contains_key(d.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Node names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Copy of all edges, nodes and targets in insertion order.
    pub fn snapshot(&self) -> IndexMap<String, Vec<String>> {
        self.edges
            .iter()
            .map(|(n, deps)| (n.clone(), deps.iter().cloned().collect()))
            .collect()
    }

    /// Fails with [`OrchestratorError::CircularDependency`] on the first back edge.
    ///
    /// The reported service is the node the back edge points to; `path` walks
    /// the cycle and ends where it started.
    pub fn detect_cycle(&self) -> Result<(), OrchestratorError> {
        let mut colors: HashMap<&str, Color> = HashMap::with_capacity(self.edges.len());
        let mut stack: Vec<&str> = Vec::new();

        for name in self.edges.keys() {
            if !colors.contains_key(name.as_str()) {
                self.visit_for_cycle(name, &mut colors, &mut stack)?;
            }
        }
        Ok(())
    }

    /// Like [`detect_cycle`](Self::detect_cycle) but only walks what is
    /// reachable from `name`. Any new cycle created by inserting `name` passes
    /// through it, so this is enough after a registration.
    pub fn detect_cycle_from(&self, name: &str) -> Result<(), OrchestratorError> {
        let Some((key, _)) = self.edges.get_key_value(name) else {
            return Ok(());
        };
        let mut colors: HashMap<&str, Color> = HashMap::new();
        let mut stack: Vec<&str> = Vec::new();
        self.visit_for_cycle(key, &mut colors, &mut stack)
    }

    fn visit_for_cycle<'a>(
        &'a self,
        name: &'a str,
        colors: &mut HashMap<&'a str, Color>,
        stack: &mut Vec<&'a str>,
    ) -> Result<(), OrchestratorError> {
        colors.insert(name, Color::Gray);
        stack.push(name);

        if let Some(deps) = self.edges.get(name) {
            for dep in deps {
                if !self.edges.contains_key(dep.as_str()) {
                    continue;
                }
                match colors.get(dep.as_str()) {
                    Some(Color::Gray) => {
                        let start = stack.iter().position(|n| *n == dep).unwrap_or(0);
                        let mut path: Vec<String> =
                            stack[start..].iter().map(|n| n.to_string()).collect();
                        path.push(dep.clone());
                        return Err(OrchestratorError::CircularDependency {
                            service: dep.clone(),
                            path,
                        });
                    }
                    Some(Color::Black) => {}
                    None => self.visit_for_cycle(dep, colors, stack)?,
                }
            }
        }

        stack.pop();
        colors.insert(name, Color::Black);
        Ok(())
    }

    /// Topological order: every dependency precedes its dependents.
    ///
    /// Ties are broken by registration order. Unknown targets are skipped.
    pub fn order(&self) -> Vec<String> {
        let mut colors: HashMap<&str, Color> = HashMap::with_capacity(self.edges.len());
        let mut out = Vec::with_capacity(self.edges.len());

        for name in self.edges.keys() {
            if !colors.contains_key(name.as_str()) {
                self.visit_for_order(name, &mut colors, &mut out);
            }
        }
        out
    }

    fn visit_for_order<'a>(
        &'a self,
        name: &'a str,
        colors: &mut HashMap<&'a str, Color>,
        out: &mut Vec<String>,
    ) {
        colors.insert(name, Color::Gray);
        if let Some(deps) = self.edges.get(name) {
            for dep in deps {
                if self.edges.contains_key(dep.as_str()) && !colors.contains_key(dep.as_str()) {
                    self.visit_for_order(dep, colors, out);
                }
            }
        }
        colors.insert(name, Color::Black);
        out.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    fn assert_topological(graph: &DependencyGraph) {
        let order = graph.order();
        assert_eq!(order.len(), graph.len());
        for name in graph.names() {
            for dep in graph.dependencies_of(name).unwrap() {
                if graph.contains(dep) {
                    assert!(
                        pos(&order, dep) < pos(&order, name),
                        "{dep} must precede {name} in {order:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let mut g = DependencyGraph::new();
        g.insert("web", ["api", "assets"]);
        g.insert("api", ["db", "cache"]);
        g.insert("assets", Vec::<String>::new());
        g.insert("cache", ["db"]);
        g.insert("db", Vec::<String>::new());

        assert_topological(&g);
        assert_eq!(g.order(), ["db", "cache", "api", "assets", "web"]);
    }

    #[test]
    fn test_order_is_registration_order_without_edges() {
        let mut g = DependencyGraph::new();
        for n in ["c", "a", "b"] {
            g.insert(n, Vec::<String>::new());
        }
        assert_eq!(g.order(), ["c", "a", "b"]);
    }

    #[test]
    fn test_generated_dags_are_ordered() {
        // Node i depends on every j < i whose index divides i.
        for size in 1..30usize {
            let mut g = DependencyGraph::new();
            for i in (0..size).rev() {
                let deps: Vec<String> = (1..i).filter(|j| i % j == 0).map(|j| format!("n{j}")).collect();
                g.insert(format!("n{i}"), deps);
            }
            assert!(g.detect_cycle().is_ok());
            assert_topological(&g);
        }
    }

    #[test]
    fn test_cycle_is_reported_with_path() {
        let mut g = DependencyGraph::new();
        g.insert("a", ["b"]);
        g.insert("b", ["c"]);
        g.insert("c", ["a"]);

        match g.detect_cycle() {
            Err(OrchestratorError::CircularDependency { service, path }) => {
                assert_eq!(service, "a");
                assert_eq!(path, ["a", "b", "c", "a"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_from_new_node() {
        let mut g = DependencyGraph::new();
        g.insert("a", ["b"]);
        g.insert("b", Vec::<String>::new());
        assert!(g.detect_cycle_from("b").is_ok());

        g.insert("b", ["a"]);
        match g.detect_cycle_from("b") {
            Err(OrchestratorError::CircularDependency { path, .. }) => {
                assert_eq!(path, ["b", "a", "b"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
        assert!(g.detect_cycle_from("missing").is_ok());
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let mut g = DependencyGraph::new();
        g.insert("loop", ["loop"]);
        assert!(g.detect_cycle().is_err());
        assert_eq!(g.order(), ["loop"]);
    }

    #[test]
    fn test_cycle_does_not_corrupt_unrelated_order() {
        let mut g = DependencyGraph::new();
        g.insert("x", ["y"]);
        g.insert("y", Vec::<String>::new());
        g.insert("a", ["b"]);
        g.insert("b", ["c"]);
        g.insert("c", ["a"]);

        let order = g.order();
        assert_eq!(order.len(), 5);
        assert!(pos(&order, "y") < pos(&order, "x"));
    }

    #[test]
    fn test_forward_reference_is_ignored_until_registered() {
        let mut g = DependencyGraph::new();
        g.insert("api", ["db"]);
        assert_eq!(g.missing_dependencies("api"), ["db"]);
        assert_eq!(g.order(), ["api"]);

        g.insert("db", Vec::<String>::new());
        assert!(g.missing_dependencies("api").is_empty());
        assert_eq!(g.order(), ["db", "api"]);
    }

    #[test]
    fn test_remove_drops_incoming_edges() {
        let mut g = DependencyGraph::new();
        g.insert("db", Vec::<String>::new());
        g.insert("api", ["db"]);
        assert_eq!(g.dependents_of("db"), ["api"]);

        assert!(g.remove("db"));
        assert!(!g.remove("db"));
        assert!(g.dependencies_of("api").unwrap().is_empty());
        assert!(g.dependents_of("db").is_empty());
    }
}
