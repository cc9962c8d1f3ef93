//! Interactive REPL for paygrant

mod commands;
mod interaction;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use tracing::error;

use paygrant_core::{GrantAdapter, ResourceAdapter};

use crate::app::App;
use crate::error::CliError;

pub use commands::{run_command, run_scenario, Command, CommandResult, UnknownCommand, HELP};
pub use interaction::{parse_interaction_input, InteractionInput, PromptInteraction};

/// Where REPL history is kept between runs
pub fn history_path() -> PathBuf {
    dirs::cache_dir()
        .map(|p| p.join("paygrant/history.txt"))
        .unwrap_or_else(|| ".paygrant/history.txt".into())
}

/// Run the interactive loop until `exit` or Ctrl+D
///
/// A failing command is logged and the loop goes on; the session keeps
/// whatever the command stored before it failed.
pub async fn run_cli<A>(mut app: App<A>) -> Result<(), CliError>
where
    A: GrantAdapter + ResourceAdapter,
{
    let mut rl = DefaultEditor::new()?;

    let history_path = history_path();
    if history_path.exists() {
        rl.load_history(&history_path).ok();
    }

    println!("\nType `help` for available commands.\n");

    loop {
        match rl.readline("> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                let command = match Command::parse(line) {
                    Ok(command) => command,
                    Err(e) => {
                        eprintln!("{}", e);
                        continue;
                    }
                };

                let mut interaction = PromptInteraction::new(&mut rl);
                match run_command(&mut app, &command, &mut interaction).await {
                    Ok(CommandResult::Exit) => break,
                    Ok(CommandResult::Continue) => {}
                    Err(e) => error!("{}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C - just continue
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    rl.save_history(&history_path)?;

    Ok(())
}
