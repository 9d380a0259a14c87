//! Orchestrator configuration

use crate::{OrchestratorError, OrchestratorResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// When checkpoints are written (only when a store is attached)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointPolicy {
    /// Save after every N cycles
    pub every_cycles: Option<u64>,
    /// Save once the run finishes
    pub on_finish: bool,
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self {
            every_cycles: None,
            on_finish: true,
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Upper bound on scan cycles per run
    pub max_cycles: u64,

    pub checkpoint: CheckpointPolicy,

    /// Fail the whole run on the first item failure
    pub abort_on_item_failure: bool,

    /// Upper bound on executions of any single item
    pub max_item_executions: Option<u32>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_cycles: 1000,
            checkpoint: CheckpointPolicy::default(),
            abort_on_item_failure: false,
            max_item_executions: None,
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from a TOML file; a missing file yields defaults
    pub fn load(path: impl AsRef<Path>) -> OrchestratorResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| OrchestratorError::Config(format!("{}: {e}", path.display())))?;
            Self::from_toml_str(&contents)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml_str(contents: &str) -> OrchestratorResult<Self> {
        let config: OrchestratorConfig =
            toml::from_str(contents).map_err(|e| OrchestratorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> OrchestratorResult<()> {
        if self.max_cycles == 0 {
            return Err(OrchestratorError::Config(
                "max_cycles must be at least 1".into(),
            ));
        }
        if self.checkpoint.every_cycles == Some(0) {
            return Err(OrchestratorError::Config(
                "checkpoint.every_cycles must be at least 1".into(),
            ));
        }
        if self.max_item_executions == Some(0) {
            return Err(OrchestratorError::Config(
                "max_item_executions must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
