//! Standard executor library
//!
//! Built-in experiment executors: a simulated one for dry runs and tests,
//! and one that runs an external command per experiment.

mod command;
mod simulated;

pub use command::{CommandExecutor, BOOT_ENV_PREFIX};
pub use simulated::SimulatedExecutor;
use autoflow_runtime::ExecutorRegistry;

use std::sync::Arc;

/// Register all standard executors with a registry. `simulated` is the
/// default kind.
pub fn register_all(registry: &mut ExecutorRegistry) {
    registry.register(
        simulated::KIND,
        "Replays statuses listed in the experiment parameters",
        Arc::new(SimulatedExecutor::new()),
    );
    registry.register(
        command::KIND,
        "Runs an external program; exit code 0 passes",
        Arc::new(CommandExecutor::new()),
    );
}

/// A registry with every standard executor.
pub fn default_registry() -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    register_all(&mut registry);
    registry
}
