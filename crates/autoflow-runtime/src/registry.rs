use async_trait::async_trait;
use autoflow_core::{
    BootConfig, ExecutionError, ExperimentDefinition, ExperimentExecutor, RunStatus,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A registered executor and what it is for.
#[derive(Clone)]
pub struct ExecutorEntry {
    pub kind: String,
    pub description: String,
    executor: Arc<dyn ExperimentExecutor>,
}

/// Registry of experiment executors, keyed by experiment kind.
///
/// The registry is itself an executor: it dispatches each experiment to the
/// entry matching its `kind`, or to the default kind when none is set.
pub struct ExecutorRegistry {
    entries: BTreeMap<String, ExecutorEntry>,
    default_kind: Option<String>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            default_kind: None,
        }
    }

    /// Register an executor. The first registration becomes the default
    /// kind unless one is set explicitly.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        description: impl Into<String>,
        executor: Arc<dyn ExperimentExecutor>,
    ) {
        let kind = kind.into();
        tracing::info!("Registering executor kind: {}", kind);
        if self.default_kind.is_none() {
            self.default_kind = Some(kind.clone());
        }
        self.entries.insert(
            kind.clone(),
            ExecutorEntry {
                kind,
                description: description.into(),
                executor,
            },
        );
    }

    pub fn with_default_kind(mut self, kind: impl Into<String>) -> Self {
        self.default_kind = Some(kind.into());
        self
    }

    pub fn default_kind(&self) -> Option<&str> {
        self.default_kind.as_deref()
    }

    pub fn list_kinds(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn describe(&self, kind: &str) -> Option<&str> {
        self.entries.get(kind).map(|e| e.description.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = &ExecutorEntry> {
        self.entries.values()
    }

    /// Resolve the executor an experiment would be dispatched to.
    pub fn resolve(
        &self,
        experiment: &ExperimentDefinition,
    ) -> Result<&Arc<dyn ExperimentExecutor>, ExecutionError> {
        let kind = experiment
            .kind()
            .or(self.default_kind.as_deref())
            .ok_or_else(|| {
                ExecutionError::Configuration(format!(
                    "experiment '{}' has no kind and no default executor is registered",
                    experiment.name()
                ))
            })?;

        self.entries
            .get(kind)
            .map(|e| &e.executor)
            .ok_or_else(|| ExecutionError::UnknownKind(kind.to_string()))
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExperimentExecutor for ExecutorRegistry {
    async fn execute(
        &self,
        experiment: &ExperimentDefinition,
        boot: &BootConfig,
    ) -> Result<RunStatus, ExecutionError> {
        let executor = self.resolve(experiment)?;
        executor.execute(experiment, boot).await
    }
}
