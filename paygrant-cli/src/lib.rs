//! Interactive Open Payments client
//!
//! This crate provides:
//! - Startup from a dotenv file or interactive prompts
//! - The REPL, with one command per payment flow operation
//! - Scenario files that replay a list of commands
//! - Logging to stdout and a per-run JSON log file

mod error;
pub mod app;
pub mod config;
pub mod logging;
pub mod repl;
pub mod scenario;
pub mod setup;

pub use app::App;
pub use config::{ClientConfig, ConfigError};
pub use error::CliError;
pub use repl::{run_cli, Command, CommandResult, PromptInteraction};
pub use scenario::{Scenario, ScenarioError};
pub use setup::{initialize_by_prompt, initialize_from_config};
