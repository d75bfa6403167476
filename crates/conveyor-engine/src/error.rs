//! Engine error types.

use conveyor_config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to provision workspace: {0}")]
    Provisioning(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to launch step {step:?}: {source}")]
    Launch {
        step: String,
        source: conveyor_core::Error,
    },

    #[error(transparent)]
    Runtime(#[from] conveyor_core::Error),

    #[error("build queue is full")]
    Saturated,
}
