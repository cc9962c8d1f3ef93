use paygrant_core::{
    Endpoint, GrantAdapter, InteractionSource, Operation, Outcome, ResourceAdapter, Session,
};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::app::App;
use crate::error::CliError;
use crate::scenario::Scenario;

pub const HELP: &str = "\
Available commands:
  ip:create [amount]                    Create an incoming payment on the receiving wallet
  ip:get                                Fetch the incoming payment in session
  ip:complete                           Complete the incoming payment in session
  quote:create [debitAmount]            Quote the incoming payment from the sending wallet
  quote:get                             Fetch the quote in session
  grant:ip                              Request a new incoming payment grant
  grant:quote                           Request a new quote grant
  grant:op [debitAmount] [receiveAmount]
                                        Request an outgoing payment grant (needs approval)
  op:create                             Pay the quote in session
  op:get                                Fetch the outgoing payment in session
  session:get                           Show wallet addresses and session variables
  session:wa:set-sending <address>      Replace the sending wallet address
  session:wa:set-receiving <address>    Replace the receiving wallet address
  scenario <file>                       Run the commands in a file, one per line
  help                                  Show this help
  exit                                  Quit

Wallet addresses accept the $wallet.example/alice shorthand.";

/// A parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Payment or grant operation with its positional arguments
    Flow { op: Operation, args: Vec<String> },
    SessionGet,
    SetEndpoint {
        endpoint: Endpoint,
        input: Option<String>,
    },
    Scenario(Option<PathBuf>),
    Help,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCommand(pub String);

impl fmt::Display for UnknownCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unknown command: {}. Type `help` for available commands.",
            self.0
        )
    }
}

impl std::error::Error for UnknownCommand {}

impl Command {
    /// Parse `<command> [args...]`
    pub fn parse(line: &str) -> Result<Self, UnknownCommand> {
        let mut parts = line.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let args: Vec<String> = parts.map(str::to_string).collect();

        if let Some(op) = Operation::from_name(name) {
            return Ok(Command::Flow { op, args });
        }

        let first = args.first().cloned();
        match name {
            "session:get" => Ok(Command::SessionGet),
            "session:wa:set-sending" => Ok(Command::SetEndpoint {
                endpoint: Endpoint::Sending,
                input: first,
            }),
            "session:wa:set-receiving" => Ok(Command::SetEndpoint {
                endpoint: Endpoint::Receiving,
                input: first,
            }),
            "scenario" => Ok(Command::Scenario(first.map(PathBuf::from))),
            "help" => Ok(Command::Help),
            "exit" => Ok(Command::Exit),
            _ => Err(UnknownCommand(name.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResult {
    Continue,
    Exit,
}

/// Run one command against the app
pub async fn run_command<A>(
    app: &mut App<A>,
    command: &Command,
    interaction: &mut dyn InteractionSource,
) -> Result<CommandResult, CliError>
where
    A: GrantAdapter + ResourceAdapter,
{
    match command {
        Command::Scenario(None) => {
            info!("No file provided. Use `scenario <fileName>`");
            Ok(CommandResult::Continue)
        }
        Command::Scenario(Some(path)) => run_scenario(app, path, interaction).await,
        other => dispatch(app, other, interaction).await,
    }
}

/// Validate and run a scenario file, stopping at the first failure
pub async fn run_scenario<A>(
    app: &mut App<A>,
    path: &Path,
    interaction: &mut dyn InteractionSource,
) -> Result<CommandResult, CliError>
where
    A: GrantAdapter + ResourceAdapter,
{
    let scenario = Scenario::load(path)?;
    let total = scenario.len();

    for (i, step) in scenario.steps().iter().enumerate() {
        info!("Running command {}/{} {}", i + 1, total, step.text);

        match dispatch(app, &step.command, interaction).await {
            Ok(CommandResult::Continue) => {}
            Ok(CommandResult::Exit) => return Ok(CommandResult::Exit),
            Err(e) => {
                error!(step = i + 1, "{}", e);
                break;
            }
        }
    }

    Ok(CommandResult::Continue)
}

async fn dispatch<A>(
    app: &mut App<A>,
    command: &Command,
    interaction: &mut dyn InteractionSource,
) -> Result<CommandResult, CliError>
where
    A: GrantAdapter + ResourceAdapter,
{
    match command {
        Command::Flow { op, args } => run_operation(app, *op, args, interaction).await?,
        Command::SessionGet => show_session(&app.session),
        Command::SetEndpoint { endpoint, input } => {
            info!("Setting {} wallet address...", endpoint);
            let outcome = app
                .orchestrator
                .set_endpoint(&mut app.session, *endpoint, input.as_deref().unwrap_or(""))
                .await?;
            report("Wallet address", outcome)?;
        }
        Command::Scenario(_) => warn!("Scenarios cannot run other scenarios"),
        Command::Help => println!("\n{}\n", HELP),
        Command::Exit => {
            info!("Exiting...");
            return Ok(CommandResult::Exit);
        }
    }

    Ok(CommandResult::Continue)
}

async fn run_operation<A>(
    app: &mut App<A>,
    op: Operation,
    args: &[String],
    interaction: &mut dyn InteractionSource,
) -> Result<(), CliError>
where
    A: GrantAdapter + ResourceAdapter,
{
    let arg = |i: usize| args.get(i).map(String::as_str);
    let App {
        orchestrator,
        session,
    } = app;

    match op {
        Operation::IncomingPaymentCreate => {
            info!("Creating incoming payment...");
            report(
                "Created incoming payment",
                orchestrator.create_incoming_payment(session, arg(0)).await?,
            )
        }
        Operation::IncomingPaymentGet => {
            info!("Fetching incoming payment...");
            report(
                "Incoming payment",
                orchestrator.get_incoming_payment(session).await?,
            )
        }
        Operation::IncomingPaymentComplete => {
            info!("Completing incoming payment...");
            report(
                "Completed incoming payment",
                orchestrator.complete_incoming_payment(session).await?,
            )
        }
        Operation::QuoteCreate => {
            info!("Creating quote...");
            report(
                "Created quote",
                orchestrator.create_quote(session, arg(0)).await?,
            )
        }
        Operation::QuoteGet => {
            info!("Fetching quote...");
            report("Quote", orchestrator.get_quote(session).await?)
        }
        Operation::GrantIncomingPayment => {
            info!("Requesting incoming payment grant...");
            report(
                "Incoming payment grant approved",
                orchestrator.grant_incoming_payment(session).await?,
            )
        }
        Operation::GrantQuote => {
            info!("Requesting quote grant...");
            report(
                "Quote grant approved",
                orchestrator.grant_quote(session).await?,
            )
        }
        Operation::GrantOutgoingPayment => {
            info!("Fetching outgoing payment grant...");
            report(
                "Outgoing payment grant approved",
                orchestrator
                    .grant_outgoing_payment(session, arg(0), arg(1), interaction)
                    .await?,
            )
        }
        Operation::OutgoingPaymentCreate => {
            info!("Creating outgoing payment...");
            report(
                "Created outgoing payment",
                orchestrator
                    .create_outgoing_payment(session, interaction)
                    .await?,
            )
        }
        Operation::OutgoingPaymentGet => {
            info!("Fetching outgoing payment...");
            report(
                "Outgoing payment",
                orchestrator.get_outgoing_payment(session).await?,
            )
        }
    }
}

/// Log a result as pretty JSON, or the advisory message
fn report<T: Serialize>(label: &str, outcome: Outcome<T>) -> Result<(), CliError> {
    match outcome {
        Outcome::Done(value) => {
            info!("{}:\n{}", label, serde_json::to_string_pretty(&value)?);
        }
        Outcome::Advisory(message) => info!("{}", message),
    }
    Ok(())
}

fn show_session(session: &Session) {
    info!("Current session");
    for endpoint in [Endpoint::Sending, Endpoint::Receiving] {
        match session.endpoint(endpoint) {
            Some(wallet) => info!(
                asset_code = %wallet.asset_code,
                auth_server = %wallet.auth_server,
                "  {} wallet address: {}",
                endpoint,
                wallet.id
            ),
            None => info!("  {} wallet address: (not set)", endpoint),
        }
    }
    if session.is_empty() {
        info!("  No variables set");
    }
    for (var, value) in session.variables() {
        info!("  {} = {}", var, value);
    }
}
