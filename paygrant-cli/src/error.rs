//! CLI-specific error types

use thiserror::Error;

use crate::config::ConfigError;
use crate::scenario::ScenarioError;

/// Errors that can occur during CLI operations
#[derive(Debug, Error)]
pub enum CliError {
    /// Grant or payment flow failure
    #[error(transparent)]
    Flow(#[from] paygrant_core::FlowError),

    /// Open Payments client error outside a flow (setup, key discovery)
    #[error(transparent)]
    Api(#[from] paygrant_sdk::OpenPaymentsError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    /// Readline/input error
    #[error("Input error: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),

    /// IO error (filesystem, stdout, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to format output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}
