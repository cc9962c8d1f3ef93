//! Server adapters
//!
//! The grant engine and the payment flows talk to authorization and resource
//! servers only through these traits. [`OpenPaymentsClient`] implements both;
//! tests substitute a scripted adapter.

use async_trait::async_trait;
use paygrant_sdk::{
    AccessItem, CreateIncomingPayment, CreateOutgoingPayment, CreateQuote, GrantResponse,
    IncomingPayment, InteractRequest, OpenPaymentsClient, OpenPaymentsError, OutgoingPayment,
    Quote, WalletAddress,
};
use std::time::Duration;

/// Continuation handle of a grant waiting on interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantContinuation {
    pub uri: String,
    pub token: String,
    /// Minimum time to wait before continuing, when the server set one
    pub wait: Option<Duration>,
    /// Where the human approves the grant
    pub redirect: Option<String>,
}

/// Answer to a grant request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    /// Approved; carries the access token
    Active(String),
    /// Waiting on interaction
    Pending(GrantContinuation),
}

impl GrantOutcome {
    pub fn from_response(response: GrantResponse) -> Result<Self, OpenPaymentsError> {
        if let Some(token) = response.access_token {
            return Ok(GrantOutcome::Active(token.value));
        }

        match response.continuation {
            Some(cont) => Ok(GrantOutcome::Pending(GrantContinuation {
                uri: cont.uri,
                token: cont.access_token.value,
                wait: cont.wait.map(Duration::from_secs),
                redirect: response.interact.map(|i| i.redirect),
            })),
            None => Err(OpenPaymentsError::InvalidResponse(
                "grant response has neither an access token nor a continuation".to_string(),
            )),
        }
    }
}

/// Answer to a continuation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContinueOutcome {
    Active(String),
    /// Not approved yet. Carries the handle for the next call when the
    /// server rotated it.
    StillPending(Option<GrantContinuation>),
}

impl ContinueOutcome {
    pub fn is_active(&self) -> bool {
        matches!(self, ContinueOutcome::Active(_))
    }

    pub fn into_token(self) -> Option<String> {
        match self {
            ContinueOutcome::Active(token) => Some(token),
            ContinueOutcome::StillPending(_) => None,
        }
    }

    /// Rotated continuation handle, if any
    pub fn rotated(&self) -> Option<&GrantContinuation> {
        match self {
            ContinueOutcome::StillPending(next) => next.as_ref(),
            ContinueOutcome::Active(_) => None,
        }
    }

    fn from_response(response: GrantResponse) -> Self {
        if let Some(token) = response.access_token {
            return ContinueOutcome::Active(token.value);
        }
        ContinueOutcome::StillPending(response.continuation.map(|cont| GrantContinuation {
            uri: cont.uri,
            token: cont.access_token.value,
            wait: cont.wait.map(Duration::from_secs),
            redirect: None,
        }))
    }
}

/// Authorization server calls
#[async_trait]
pub trait GrantAdapter: Send + Sync {
    /// Request a grant for `scope`; `interact` asks for a redirect interaction
    async fn request_grant(
        &self,
        auth_server: &str,
        scope: &AccessItem,
        interact: Option<InteractRequest>,
    ) -> Result<GrantOutcome, OpenPaymentsError>;

    /// Continue a pending grant
    async fn continue_grant(
        &self,
        uri: &str,
        token: &str,
        interact_ref: Option<&str>,
    ) -> Result<ContinueOutcome, OpenPaymentsError>;
}

/// Wallet address and resource server calls
#[async_trait]
pub trait ResourceAdapter: Send + Sync {
    async fn wallet_address(&self, url: &str) -> Result<WalletAddress, OpenPaymentsError>;

    async fn create_incoming_payment(
        &self,
        origin: &str,
        token: &str,
        params: &CreateIncomingPayment,
    ) -> Result<IncomingPayment, OpenPaymentsError>;

    async fn get_incoming_payment(
        &self,
        url: &str,
        token: &str,
    ) -> Result<IncomingPayment, OpenPaymentsError>;

    async fn complete_incoming_payment(
        &self,
        url: &str,
        token: &str,
    ) -> Result<IncomingPayment, OpenPaymentsError>;

    async fn create_quote(
        &self,
        origin: &str,
        token: &str,
        params: &CreateQuote,
    ) -> Result<Quote, OpenPaymentsError>;

    async fn get_quote(&self, url: &str, token: &str) -> Result<Quote, OpenPaymentsError>;

    async fn create_outgoing_payment(
        &self,
        origin: &str,
        token: &str,
        params: &CreateOutgoingPayment,
    ) -> Result<OutgoingPayment, OpenPaymentsError>;

    async fn get_outgoing_payment(
        &self,
        url: &str,
        token: &str,
    ) -> Result<OutgoingPayment, OpenPaymentsError>;
}

#[async_trait]
impl GrantAdapter for OpenPaymentsClient {
    async fn request_grant(
        &self,
        auth_server: &str,
        scope: &AccessItem,
        interact: Option<InteractRequest>,
    ) -> Result<GrantOutcome, OpenPaymentsError> {
        let response = self
            .grants()
            .request(auth_server, vec![scope.clone()], interact)
            .await?;
        GrantOutcome::from_response(response)
    }

    async fn continue_grant(
        &self,
        uri: &str,
        token: &str,
        interact_ref: Option<&str>,
    ) -> Result<ContinueOutcome, OpenPaymentsError> {
        let response = self.grants().continue_grant(uri, token, interact_ref).await?;
        Ok(ContinueOutcome::from_response(response))
    }
}

#[async_trait]
impl ResourceAdapter for OpenPaymentsClient {
    async fn wallet_address(&self, url: &str) -> Result<WalletAddress, OpenPaymentsError> {
        self.wallet_addresses().get(url).await
    }

    async fn create_incoming_payment(
        &self,
        origin: &str,
        token: &str,
        params: &CreateIncomingPayment,
    ) -> Result<IncomingPayment, OpenPaymentsError> {
        self.incoming_payments().create(origin, token, params).await
    }

    async fn get_incoming_payment(
        &self,
        url: &str,
        token: &str,
    ) -> Result<IncomingPayment, OpenPaymentsError> {
        self.incoming_payments().get(url, token).await
    }

    async fn complete_incoming_payment(
        &self,
        url: &str,
        token: &str,
    ) -> Result<IncomingPayment, OpenPaymentsError> {
        self.incoming_payments().complete(url, token).await
    }

    async fn create_quote(
        &self,
        origin: &str,
        token: &str,
        params: &CreateQuote,
    ) -> Result<Quote, OpenPaymentsError> {
        self.quotes().create(origin, token, params).await
    }

    async fn get_quote(&self, url: &str, token: &str) -> Result<Quote, OpenPaymentsError> {
        self.quotes().get(url, token).await
    }

    async fn create_outgoing_payment(
        &self,
        origin: &str,
        token: &str,
        params: &CreateOutgoingPayment,
    ) -> Result<OutgoingPayment, OpenPaymentsError> {
        self.outgoing_payments().create(origin, token, params).await
    }

    async fn get_outgoing_payment(
        &self,
        url: &str,
        token: &str,
    ) -> Result<OutgoingPayment, OpenPaymentsError> {
        self.outgoing_payments().get(url, token).await
    }
}
