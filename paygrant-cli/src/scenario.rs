//! Scenario files
//!
//! A scenario is a text file with one REPL command per line. The whole file
//! is validated before anything runs.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::repl::Command;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Failed to read scenario {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unrecognized command on line {line}: {command}")]
    Unrecognized { line: usize, command: String },

    #[error("Scenarios cannot run other scenarios (line {line})")]
    Nested { line: usize },
}

/// One validated scenario line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub text: String,
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    steps: Vec<Step>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let text = std::fs::read_to_string(path).map_err(|source| ScenarioError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Validate every non-empty line
    pub fn parse(text: &str) -> Result<Self, ScenarioError> {
        let mut steps = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let text = raw.trim();
            if text.is_empty() {
                continue;
            }

            let command = Command::parse(text).map_err(|_| ScenarioError::Unrecognized {
                line,
                command: text.split_whitespace().next().unwrap_or_default().to_string(),
            })?;
            if matches!(command, Command::Scenario(_)) {
                return Err(ScenarioError::Nested { line });
            }

            steps.push(Step {
                text: text.to_string(),
                command,
            });
        }

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
