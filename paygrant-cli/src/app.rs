use paygrant_core::{
    Endpoint, GrantAdapter, Orchestrator, Outcome, ResourceAdapter, Session,
};
use tracing::info;

use crate::config::{ConfigError, RECEIVING_WALLET_ADDRESS, SENDING_WALLET_ADDRESS};
use crate::error::CliError;

/// The orchestrator and the one session it works on
pub struct App<A> {
    pub orchestrator: Orchestrator<A>,
    pub session: Session,
}

impl<A: GrantAdapter + ResourceAdapter> App<A> {
    pub fn new(orchestrator: Orchestrator<A>, session: Session) -> Self {
        Self {
            orchestrator,
            session,
        }
    }

    /// Resolve both wallet addresses into a fresh session
    pub async fn open(
        orchestrator: Orchestrator<A>,
        sending: &str,
        receiving: &str,
    ) -> Result<Self, CliError> {
        let mut session = Session::new();

        for (endpoint, input, key) in [
            (Endpoint::Sending, sending, SENDING_WALLET_ADDRESS),
            (Endpoint::Receiving, receiving, RECEIVING_WALLET_ADDRESS),
        ] {
            match orchestrator.set_endpoint(&mut session, endpoint, input).await? {
                Outcome::Done(wallet) => info!(
                    endpoint = %endpoint,
                    asset_code = %wallet.asset_code,
                    asset_scale = wallet.asset_scale,
                    auth_server = %wallet.auth_server,
                    "{}",
                    wallet.id
                ),
                Outcome::Advisory(message) => {
                    return Err(ConfigError::Invalid { key, message }.into())
                }
            }
        }

        Ok(Self::new(orchestrator, session))
    }
}
