use anyhow::Result;
use clap::Parser;
use paygrant_cli::{
    initialize_by_prompt, initialize_from_config, logging, run_cli, ClientConfig, ConfigError,
};
use rustyline::DefaultEditor;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "paygrant")]
#[command(version, about = "Interactive client for Open Payments grants and payments")]
struct Args {
    /// Read the client and wallet addresses from the env file instead of prompting
    #[arg(long)]
    from_config: bool,

    /// Env file used with --from-config
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Directory for the per-run JSON log
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_file = logging::init(&args.log_dir)?;
    info!(path = %log_file.display(), "Logging to file");

    let app = if args.from_config {
        let config = match ClientConfig::from_env_file(&args.env_file) {
            Ok(config) => config,
            Err(ConfigError::Missing(key)) => {
                info!("Missing {}", key);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        initialize_from_config(&config).await?
    } else {
        let mut rl = DefaultEditor::new()?;
        match initialize_by_prompt(&mut rl).await? {
            Some(app) => app,
            None => return Ok(()),
        }
    };

    run_cli(app).await?;
    println!("\nGoodbye!\n");
    Ok(())
}
