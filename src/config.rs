//! Engine configuration.

use serde::{Deserialize, Serialize};

/// What a workflow's `max_concurrency` limit applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyScope {
    /// Bound the number of simultaneously active branches within one run.
    #[default]
    PerRun,
    /// Additionally bound the number of concurrently running runs per
    /// workflow; excess triggers stay pending and start FIFO.
    PerWorkflow,
}

/// Configuration for the workflow engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Guard against defective graphs driving a branch forever.
    #[serde(default = "default_max_steps")]
    pub max_steps_per_branch: u32,
    #[serde(default)]
    pub concurrency_scope: ConcurrencyScope,
}

fn default_max_steps() -> u32 {
    500
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_steps_per_branch: default_max_steps(),
            concurrency_scope: ConcurrencyScope::PerRun,
        }
    }
}
