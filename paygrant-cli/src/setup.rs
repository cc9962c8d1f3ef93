//! Startup: build the client and resolve the two wallet addresses, either
//! from a config file or by asking.

use paygrant_core::{Endpoint, GrantConfig, Orchestrator, Outcome, Session};
use paygrant_sdk::{parse_wallet_address, JsonWebKey, OpenPaymentsClient};
use rustyline::DefaultEditor;
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::App;
use crate::config::ClientConfig;
use crate::error::CliError;

pub const DEFAULT_PRIVATE_KEY_PATH: &str = "private-key.pem";

pub async fn initialize_from_config(
    config: &ClientConfig,
) -> Result<App<OpenPaymentsClient>, CliError> {
    info!(config = ?config, "Loaded from config.");
    let client = config.build_client()?;
    let orchestrator = Orchestrator::new(Arc::new(client), config.grant.clone());
    App::open(
        orchestrator,
        &config.sending_wallet_address,
        &config.receiving_wallet_address,
    )
    .await
}

/// Ask for the client wallet address, key and both endpoints
///
/// Returns `None` when the client wallet address has no registered keys.
pub async fn initialize_by_prompt(
    rl: &mut DefaultEditor,
) -> Result<Option<App<OpenPaymentsClient>>, CliError> {
    let lookup = OpenPaymentsClient::unauthenticated()?;

    let (client_wallet_address, keys) = loop {
        let input = rl.readline("Enter the wallet address to use for the client: ")?;
        let Some(url) = parse_wallet_address(&input) else {
            println!("Invalid wallet address.");
            continue;
        };
        match lookup.wallet_addresses().keys(&url).await {
            Ok(jwks) => break (url, jwks.keys),
            Err(e) => warn!(error = %e, "Could not fetch keys for {}", url),
        }
    };

    if keys.is_empty() {
        info!(
            "No configured keys found for wallet address. \
             Please view the README for how to create developer keys."
        );
        return Ok(None);
    }

    println!("Keys registered for {}:", client_wallet_address);
    for (i, key) in keys.iter().enumerate() {
        println!("  {}) {}", i + 1, key.kid);
    }
    let key_id = loop {
        let input = rl.readline("Select the private key id [1]: ")?;
        match select_key(&keys, &input) {
            Some(kid) => break kid,
            None => println!("Enter a number from the list or a key id."),
        }
    };

    let input = rl.readline(&format!(
        "Enter the path to the private key file [{}]: ",
        DEFAULT_PRIVATE_KEY_PATH
    ))?;
    let private_key = match input.trim() {
        "" => DEFAULT_PRIVATE_KEY_PATH.to_string(),
        path => path.to_string(),
    };

    let client = OpenPaymentsClient::builder()
        .client_wallet_address(client_wallet_address)
        .private_key(key_id, private_key)
        .build()?;
    let orchestrator = Orchestrator::new(Arc::new(client), GrantConfig::default());

    let mut session = Session::new();
    for (endpoint, prompt) in [
        (Endpoint::Sending, "Enter sending wallet address: "),
        (Endpoint::Receiving, "Enter receiving wallet address: "),
    ] {
        loop {
            let input = rl.readline(prompt)?;
            match orchestrator.set_endpoint(&mut session, endpoint, &input).await {
                Ok(Outcome::Done(_)) => break,
                Ok(Outcome::Advisory(message)) => println!("{}", message),
                Err(e) => println!("{}", e),
            }
        }
    }

    Ok(Some(App::new(orchestrator, session)))
}

/// Pick a key by list position (1-based) or id; empty input picks the first
pub fn select_key(keys: &[JsonWebKey], input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return keys.first().map(|k| k.kid.clone());
    }
    if let Ok(position) = input.parse::<usize>() {
        return position
            .checked_sub(1)
            .and_then(|i| keys.get(i))
            .map(|k| k.kid.clone());
    }
    keys.iter().find(|k| k.kid == input).map(|k| k.kid.clone())
}
