use crate::{ExecutionError, RunStatus, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What an executor should run. Opaque to the engine.
///
/// Built once and then attached to a node; there are no mutating accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDefinition {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default)]
    parameters: HashMap<String, Value>,
}

impl ExperimentDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            parameters: HashMap::new(),
        }
    }

    /// Selects the executor in an executor registry.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn parameters(&self) -> &HashMap<String, Value> {
        &self.parameters
    }

    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    /// Get a parameter or fail with a configuration error naming it.
    pub fn require_parameter(&self, key: &str) -> Result<&Value, ExecutionError> {
        self.parameters.get(key).ok_or_else(|| {
            ExecutionError::Configuration(format!(
                "experiment '{}' is missing parameter '{}'",
                self.name, key
            ))
        })
    }
}

/// Unit-wide settings handed to every execution of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BootConfig {
    settings: HashMap<String, Value>,
}

impl BootConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    pub fn settings(&self) -> &HashMap<String, Value> {
        &self.settings
    }
}

/// Runs one experiment and reports its verdict.
///
/// Implementations own their timeout and retry behavior; the engine awaits
/// the call for as long as it takes. An `Err` means no verdict could be
/// produced at all and is recorded as [`RunStatus::Error`].
#[async_trait]
pub trait ExperimentExecutor: Send + Sync {
    async fn execute(
        &self,
        experiment: &ExperimentDefinition,
        boot: &BootConfig,
    ) -> Result<RunStatus, ExecutionError>;
}
