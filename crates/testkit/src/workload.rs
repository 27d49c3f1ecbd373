//! Workloads the driver can run by name.
//!
//! A workload is test-application code behind the [`Workload`] capability.
//! The [`WorkloadRegistry`] maps names to factories, and each EXECUTE_APP
//! gets a fresh instance.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bridge::protocol::SessionId;

tokio::task_local! {
    static WORKLOAD_LABEL: String;
}

/// Label of the workload running on the current task, if any.
pub fn current_label() -> Option<String> {
    WORKLOAD_LABEL.try_with(|label| label.clone()).ok()
}

/// Run `fut` with `label` as the current workload label.
///
/// The previous label (or its absence) is back in place as soon as `fut`
/// yields, returns or unwinds.
pub fn with_label<F: Future>(label: impl Into<String>, fut: F) -> impl Future<Output = F::Output> {
    WORKLOAD_LABEL.scope(label.into(), fut)
}

/// Per-call context handed to a workload.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    label: String,
    session: SessionId,
}

impl ExecutionContext {
    pub fn new(label: impl Into<String>, session: SessionId) -> Self {
        Self {
            label: label.into(),
            session,
        }
    }

    /// Label the driver attached to this execution.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn session(&self) -> SessionId {
        self.session
    }
}

/// A unit of test code invoked through EXECUTE_APP.
#[async_trait]
pub trait Workload: Send + Sync {
    async fn execute_app(&self, ctx: &ExecutionContext) -> anyhow::Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("unknown workload '{0}'")]
    UnknownWorkload(String),

    #[error("workload '{workload}' failed: {message}")]
    Failed { workload: String, message: String },

    #[error("workload '{workload}' panicked: {message}")]
    Panicked { workload: String, message: String },
}

type WorkloadFactory = Arc<dyn Fn() -> Box<dyn Workload> + Send + Sync>;

/// Name → factory table consulted by EXECUTE_APP.
#[derive(Clone, Default)]
pub struct WorkloadRegistry {
    factories: HashMap<String, WorkloadFactory>,
}

impl WorkloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `W` under `name`, constructed with `Default` on every run.
    pub fn with<W>(self, name: impl Into<String>) -> Self
    where
        W: Workload + Default + 'static,
    {
        self.with_factory(name, || Box::new(W::default()) as Box<dyn Workload>)
    }

    pub fn with_factory<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Workload> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Instantiate the workload registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<Box<dyn Workload>, ExecutionError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| ExecutionError::UnknownWorkload(name.to_string()))
    }
}

impl std::fmt::Debug for WorkloadRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkloadRegistry")
            .field("workloads", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Noop;

    #[async_trait]
    impl Workload for Noop {
        async fn execute_app(&self, _ctx: &ExecutionContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn resolve_unknown_name_fails() {
        let registry = WorkloadRegistry::new().with::<Noop>("Noop");
        assert!(registry.contains("Noop"));
        assert!(matches!(
            registry.resolve("Missing"),
            Err(ExecutionError::UnknownWorkload(ref name)) if name == "Missing"
        ));
    }

    #[test]
    fn factory_runs_per_resolve() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let registry = WorkloadRegistry::new().with_factory("Counted", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::new(Noop) as Box<dyn Workload>
        });

        registry.resolve("Counted").unwrap();
        registry.resolve("Counted").unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn names_are_sorted() {
        let registry = WorkloadRegistry::new()
            .with::<Noop>("b")
            .with::<Noop>("a");
        assert_eq!(registry.names(), ["a", "b"]);
    }

    #[tokio::test]
    async fn label_is_scoped_and_restored() {
        assert_eq!(current_label(), None);

        let outer = with_label("dispatcher", async {
            let inner = with_label("worker-thread-1", async { current_label() }).await;
            (inner, current_label())
        })
        .await;

        assert_eq!(outer.0.as_deref(), Some("worker-thread-1"));
        assert_eq!(outer.1.as_deref(), Some("dispatcher"));
        assert_eq!(current_label(), None);
    }
}
