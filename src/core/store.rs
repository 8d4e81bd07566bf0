//! # Definition store.
//!
//! Immutable-after-registration [`ServiceDefinition`]s keyed by name, kept in
//! registration order.

use indexmap::IndexMap;

use crate::error::OrchestratorError;
use crate::services::ServiceDefinition;

#[derive(Default)]
pub(crate) struct DefinitionStore {
    definitions: IndexMap<String, ServiceDefinition>,
}

impl DefinitionStore {
    /// Adds a definition; fails on a duplicate name.
    pub fn insert(&mut self, def: ServiceDefinition) -> Result<(), OrchestratorError> {
        if self.definitions.contains_key(def.name()) {
            return Err(OrchestratorError::AlreadyRegistered {
                name: def.name().to_string(),
            });
        }
        self.definitions.insert(def.name().to_string(), def);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ServiceDefinition> {
        self.definitions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ServiceDefinition> {
        self.definitions.shift_remove(name)
    }

    /// Registered names that declare `name` as a dependency.
    pub fn declared_dependents(&self, name: &str) -> Vec<String> {
        self.definitions
            .values()
            .filter(|d| d.depends_on(name))
            .map(|d| d.name().to_string())
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::services::{Dependencies, Service};

    struct Unit;
    impl Service for Unit {}

    fn def(name: &str, deps: &[&str]) -> ServiceDefinition {
        ServiceDefinition::builder(name)
            .depends_on(deps.iter().copied())
            .factory(|_d: Dependencies, _c: serde_json::Value| async { Ok::<_, ServiceError>(Unit) })
            .build()
            .unwrap()
    }

    #[test]
    fn test_duplicate_rejected_and_original_kept() {
        let mut store = DefinitionStore::default();
        store.insert(def("db", &[])).unwrap();
        let err = store.insert(def("db", &["x"])).unwrap_err();
        assert!(matches!(err, OrchestratorError::AlreadyRegistered { .. }));
        assert!(store.get("db").unwrap().dependencies().is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_declared_dependents_in_registration_order() {
        let mut store = DefinitionStore::default();
        store.insert(def("web", &["db"])).unwrap();
        store.insert(def("db", &[])).unwrap();
        store.insert(def("jobs", &["db"])).unwrap();
        assert_eq!(store.declared_dependents("db"), ["web", "jobs"]);
    }
}
