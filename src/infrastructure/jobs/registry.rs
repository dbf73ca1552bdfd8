//! Job Definition Registry
//!
//! Process-wide mapping from job-type name to definition. Registrations
//! happen at startup; request handling only reads.

use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::interfaces::jobs::JobDefinition;
use crate::shared::error::DomainError;

/// Registry for job definitions
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<dyn JobDefinition>>>,
}

impl JobRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a job definition
    ///
    /// # Errors
    /// Returns `Duplicate` if a definition with the same name is already
    /// registered.
    pub fn register(&self, definition: Arc<dyn JobDefinition>) -> Result<(), DomainError> {
        let mut jobs = self.jobs.write().expect("job registry poisoned");
        let name = definition.name().to_string();
        if jobs.contains_key(&name) {
            return Err(DomainError::Duplicate(format!(
                "Job '{}' is already registered",
                name
            )));
        }
        jobs.insert(name, definition);
        Ok(())
    }

    /// Retrieves a definition by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn JobDefinition>> {
        self.jobs
            .read()
            .expect("job registry poisoned")
            .get(name)
            .cloned()
    }

    /// Lists all registered job names, sorted
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .jobs
            .read()
            .expect("job registry poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

/// Lazily initialised process-wide registry
static REGISTRY: OnceCell<Arc<JobRegistry>> = OnceCell::new();

/// Accessor for the global job registry
pub fn global_registry() -> Arc<JobRegistry> {
    REGISTRY
        .get_or_init(|| Arc::new(JobRegistry::new()))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::jobs::{JobContext, WorkItem};
    use crate::shared::error::JobError;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use serde_json::Value;

    struct NoopJob {
        name: String,
    }

    #[async_trait]
    impl JobDefinition for NoopJob {
        fn name(&self) -> &str {
            &self.name
        }

        async fn discover(&self, _ctx: &JobContext) -> Result<Vec<WorkItem>, JobError> {
            Ok(Vec::new())
        }

        async fn process(&self, _ctx: &JobContext, _item: &WorkItem) -> Result<Value, JobError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_register_and_get() {
        let registry = JobRegistry::new();
        registry
            .register(Arc::new(NoopJob { name: "scan".into() }))
            .unwrap();

        assert!(registry.get("scan").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.list_names(), vec!["scan"]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = JobRegistry::new();
        registry
            .register(Arc::new(NoopJob { name: "scan".into() }))
            .unwrap();
        let err = registry
            .register(Arc::new(NoopJob { name: "scan".into() }))
            .unwrap_err();
        assert_matches!(err, DomainError::Duplicate(_));
    }

    #[test]
    fn test_global_registry_is_shared() {
        let a = global_registry();
        let b = global_registry();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
