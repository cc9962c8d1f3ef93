//! Test utilities for paygrant-core.
//!
//! [`MockOpenPayments`] stands in for the authorization and resource servers.
//! Grant and continuation answers are scripted in order; resources are created
//! in memory with predictable ids; every call is recorded.
//!
//! Enable with the `test-utils` feature:
//!
//! ```toml
//! [dev-dependencies]
//! paygrant-core = { version = "...", features = ["test-utils"] }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use paygrant_core::test_utils::MockOpenPayments;
//!
//! // First grant request needs interaction, first continuation is still
//! // pending, the second one is approved.
//! let mock = MockOpenPayments::new()
//!     .with_pending_grant(1)
//!     .with_still_pending(1)
//!     .with_continuation_token("op-token");
//! ```

use async_trait::async_trait;
use paygrant_sdk::{
    AccessItem, Amount, CreateIncomingPayment, CreateOutgoingPayment, CreateQuote,
    IncomingPayment, InteractRequest, OpenPaymentsError, OutgoingPayment, Quote, WalletAddress,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::adapter::{ContinueOutcome, GrantAdapter, GrantContinuation, GrantOutcome, ResourceAdapter};

/// A wallet address with its auth server under `<id>/auth`
pub fn mock_wallet(id: &str, asset_code: &str) -> WalletAddress {
    WalletAddress {
        id: id.to_string(),
        auth_server: format!("{}/auth", id.trim_end_matches('/')),
        resource_server: None,
        asset_code: asset_code.to_string(),
        asset_scale: 2,
        public_name: None,
    }
}

/// One call made against the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    RequestGrant {
        auth_server: String,
        scope: AccessItem,
        interactive: bool,
    },
    ContinueGrant {
        uri: String,
        token: String,
        interact_ref: Option<String>,
    },
    WalletAddress {
        url: String,
    },
    CreateIncomingPayment {
        origin: String,
        token: String,
        amount: Option<Amount>,
    },
    GetIncomingPayment {
        url: String,
        token: String,
    },
    CompleteIncomingPayment {
        url: String,
        token: String,
    },
    CreateQuote {
        origin: String,
        token: String,
        receiver: String,
        debit_amount: Option<Amount>,
    },
    GetQuote {
        url: String,
        token: String,
    },
    CreateOutgoingPayment {
        origin: String,
        token: String,
        quote_id: String,
    },
    GetOutgoingPayment {
        url: String,
        token: String,
    },
}

impl MockCall {
    pub fn is_grant_call(&self) -> bool {
        matches!(
            self,
            MockCall::RequestGrant { .. } | MockCall::ContinueGrant { .. }
        )
    }
}

#[derive(Default)]
struct MockState {
    grants: VecDeque<Result<GrantOutcome, OpenPaymentsError>>,
    continuations: VecDeque<Result<ContinueOutcome, OpenPaymentsError>>,
    resource_failures: VecDeque<OpenPaymentsError>,
    continue_delay: Duration,
    quote_amounts: Option<(Amount, Amount)>,
    wallets: HashMap<String, WalletAddress>,
    incoming_payments: HashMap<String, IncomingPayment>,
    quotes: HashMap<String, Quote>,
    outgoing_payments: HashMap<String, OutgoingPayment>,
    calls: Vec<MockCall>,
    issued: usize,
}

impl MockState {
    fn next_id(&mut self) -> usize {
        self.issued += 1;
        self.issued
    }

    fn take_failure(&mut self) -> Result<(), OpenPaymentsError> {
        match self.resource_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Scripted authorization and resource servers.
///
/// Unscripted grant requests and continuations are approved with a fresh
/// token (`token-<n>`).
#[derive(Clone, Default)]
pub struct MockOpenPayments {
    state: Arc<Mutex<MockState>>,
}

impl MockOpenPayments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an answer for the next grant request
    pub fn with_grant(self, outcome: GrantOutcome) -> Self {
        self.state.lock().unwrap().grants.push_back(Ok(outcome));
        self
    }

    /// Queue an approved grant with the given token
    pub fn with_grant_token(self, token: impl Into<String>) -> Self {
        self.with_grant(GrantOutcome::Active(token.into()))
    }

    /// Queue a grant that needs interaction, with `wait_secs` as the server wait
    pub fn with_pending_grant(self, wait_secs: u64) -> Self {
        self.with_grant(GrantOutcome::Pending(GrantContinuation {
            uri: "https://auth.mock/continue/1".to_string(),
            token: "continue-token".to_string(),
            wait: Some(Duration::from_secs(wait_secs)),
            redirect: Some("https://auth.mock/interact/1".to_string()),
        }))
    }

    pub fn with_grant_error(self, err: OpenPaymentsError) -> Self {
        self.state.lock().unwrap().grants.push_back(Err(err));
        self
    }

    /// Queue `count` "still pending" continuation answers
    pub fn with_still_pending(self, count: usize) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for _ in 0..count {
                state
                    .continuations
                    .push_back(Ok(ContinueOutcome::StillPending(None)));
            }
        }
        self
    }

    /// Queue a "still pending" answer that hands out a new continuation
    /// token and uri, with `wait_secs` as the new server wait
    pub fn with_rotated_continuation(self, token: impl Into<String>, wait_secs: u64) -> Self {
        let token = token.into();
        self.state
            .lock()
            .unwrap()
            .continuations
            .push_back(Ok(ContinueOutcome::StillPending(Some(GrantContinuation {
                uri: format!("https://auth.mock/continue/{}", token),
                token,
                wait: Some(Duration::from_secs(wait_secs)),
                redirect: None,
            }))));
        self
    }

    pub fn with_continuation_token(self, token: impl Into<String>) -> Self {
        self.state
            .lock()
            .unwrap()
            .continuations
            .push_back(Ok(ContinueOutcome::Active(token.into())));
        self
    }

    pub fn with_continuation_error(self, err: OpenPaymentsError) -> Self {
        self.state.lock().unwrap().continuations.push_back(Err(err));
        self
    }

    /// Make every continuation call take `delay`
    pub fn with_continue_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().continue_delay = delay;
        self
    }

    /// Serve a wallet address document for `wallet.id`
    pub fn with_wallet(self, wallet: WalletAddress) -> Self {
        self.state
            .lock()
            .unwrap()
            .wallets
            .insert(wallet.id.clone(), wallet);
        self
    }

    /// Debit and receive amounts every created quote resolves to
    pub fn with_quote_amounts(self, debit: Amount, receive: Amount) -> Self {
        self.state.lock().unwrap().quote_amounts = Some((debit, receive));
        self
    }

    /// Fail the next resource server call (any kind) with `err`
    pub fn fail_next_resource_call(&self, err: OpenPaymentsError) {
        self.state.lock().unwrap().resource_failures.push_back(err);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub fn grant_requests(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::RequestGrant { .. }))
            .count()
    }

    pub fn continuation_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::ContinueGrant { .. }))
            .count()
    }

    fn record(&self, call: MockCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

fn collection(origin: &str, name: &str, n: usize) -> String {
    format!("{}/{}/{}", origin.trim_end_matches('/'), name, n)
}

#[async_trait]
impl GrantAdapter for MockOpenPayments {
    async fn request_grant(
        &self,
        auth_server: &str,
        scope: &AccessItem,
        interact: Option<InteractRequest>,
    ) -> Result<GrantOutcome, OpenPaymentsError> {
        self.record(MockCall::RequestGrant {
            auth_server: auth_server.to_string(),
            scope: scope.clone(),
            interactive: interact.is_some(),
        });

        let mut state = self.state.lock().unwrap();
        match state.grants.pop_front() {
            Some(answer) => answer,
            None => {
                let n = state.next_id();
                Ok(GrantOutcome::Active(format!("token-{}", n)))
            }
        }
    }

    async fn continue_grant(
        &self,
        uri: &str,
        token: &str,
        interact_ref: Option<&str>,
    ) -> Result<ContinueOutcome, OpenPaymentsError> {
        self.record(MockCall::ContinueGrant {
            uri: uri.to_string(),
            token: token.to_string(),
            interact_ref: interact_ref.map(str::to_string),
        });

        let delay = self.state.lock().unwrap().continue_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        match state.continuations.pop_front() {
            Some(answer) => answer,
            None => {
                let n = state.next_id();
                Ok(ContinueOutcome::Active(format!("token-{}", n)))
            }
        }
    }
}

#[async_trait]
impl ResourceAdapter for MockOpenPayments {
    async fn wallet_address(&self, url: &str) -> Result<WalletAddress, OpenPaymentsError> {
        self.record(MockCall::WalletAddress {
            url: url.to_string(),
        });
        let state = self.state.lock().unwrap();
        state
            .wallets
            .get(url)
            .cloned()
            .ok_or_else(|| OpenPaymentsError::NotFound(url.to_string()))
    }

    async fn create_incoming_payment(
        &self,
        origin: &str,
        token: &str,
        params: &CreateIncomingPayment,
    ) -> Result<IncomingPayment, OpenPaymentsError> {
        self.record(MockCall::CreateIncomingPayment {
            origin: origin.to_string(),
            token: token.to_string(),
            amount: params.incoming_amount.clone(),
        });

        let mut state = self.state.lock().unwrap();
        state.take_failure()?;
        let n = state.next_id();
        let payment = IncomingPayment {
            id: collection(origin, "incoming-payments", n),
            wallet_address: params.wallet_address.clone(),
            completed: false,
            incoming_amount: params.incoming_amount.clone(),
            received_amount: None,
            expires_at: params.expires_at,
            metadata: params.metadata.clone(),
            created_at: None,
        };
        state
            .incoming_payments
            .insert(payment.id.clone(), payment.clone());
        Ok(payment)
    }

    async fn get_incoming_payment(
        &self,
        url: &str,
        token: &str,
    ) -> Result<IncomingPayment, OpenPaymentsError> {
        self.record(MockCall::GetIncomingPayment {
            url: url.to_string(),
            token: token.to_string(),
        });

        let mut state = self.state.lock().unwrap();
        state.take_failure()?;
        state
            .incoming_payments
            .get(url)
            .cloned()
            .ok_or_else(|| OpenPaymentsError::NotFound(url.to_string()))
    }

    async fn complete_incoming_payment(
        &self,
        url: &str,
        token: &str,
    ) -> Result<IncomingPayment, OpenPaymentsError> {
        self.record(MockCall::CompleteIncomingPayment {
            url: url.to_string(),
            token: token.to_string(),
        });

        let mut state = self.state.lock().unwrap();
        state.take_failure()?;
        let payment = state
            .incoming_payments
            .get_mut(url)
            .ok_or_else(|| OpenPaymentsError::NotFound(url.to_string()))?;
        payment.completed = true;
        Ok(payment.clone())
    }

    async fn create_quote(
        &self,
        origin: &str,
        token: &str,
        params: &CreateQuote,
    ) -> Result<Quote, OpenPaymentsError> {
        self.record(MockCall::CreateQuote {
            origin: origin.to_string(),
            token: token.to_string(),
            receiver: params.receiver.clone(),
            debit_amount: params.debit_amount.clone(),
        });

        let mut state = self.state.lock().unwrap();
        state.take_failure()?;

        let incoming = state
            .incoming_payments
            .get(&params.receiver)
            .and_then(|p| p.incoming_amount.clone());
        let (debit, receive) = match (&state.quote_amounts, &params.debit_amount, incoming) {
            (Some((debit, receive)), _, _) => (debit.clone(), receive.clone()),
            (None, Some(debit), incoming) => (debit.clone(), incoming.unwrap_or_else(|| debit.clone())),
            (None, None, Some(incoming)) => (incoming.clone(), incoming),
            (None, None, None) => {
                return Err(OpenPaymentsError::InvalidRequest(
                    "quote needs a debit amount or a receiver with an amount".to_string(),
                ))
            }
        };

        let n = state.next_id();
        let quote = Quote {
            id: collection(origin, "quotes", n),
            wallet_address: params.wallet_address.clone(),
            receiver: params.receiver.clone(),
            debit_amount: debit,
            receive_amount: receive,
            method: Some(params.method.clone()),
            expires_at: None,
            created_at: None,
        };
        state.quotes.insert(quote.id.clone(), quote.clone());
        Ok(quote)
    }

    async fn get_quote(&self, url: &str, token: &str) -> Result<Quote, OpenPaymentsError> {
        self.record(MockCall::GetQuote {
            url: url.to_string(),
            token: token.to_string(),
        });

        let mut state = self.state.lock().unwrap();
        state.take_failure()?;
        state
            .quotes
            .get(url)
            .cloned()
            .ok_or_else(|| OpenPaymentsError::NotFound(url.to_string()))
    }

    async fn create_outgoing_payment(
        &self,
        origin: &str,
        token: &str,
        params: &CreateOutgoingPayment,
    ) -> Result<OutgoingPayment, OpenPaymentsError> {
        self.record(MockCall::CreateOutgoingPayment {
            origin: origin.to_string(),
            token: token.to_string(),
            quote_id: params.quote_id.clone(),
        });

        let mut state = self.state.lock().unwrap();
        state.take_failure()?;
        let quote = state.quotes.get(&params.quote_id).cloned();
        let n = state.next_id();
        let payment = OutgoingPayment {
            id: collection(origin, "outgoing-payments", n),
            wallet_address: params.wallet_address.clone(),
            quote_id: Some(params.quote_id.clone()),
            receiver: quote.as_ref().map(|q| q.receiver.clone()),
            debit_amount: quote.as_ref().map(|q| q.debit_amount.clone()),
            receive_amount: quote.map(|q| q.receive_amount),
            sent_amount: None,
            failed: false,
            metadata: params.metadata.clone(),
            created_at: None,
        };
        state
            .outgoing_payments
            .insert(payment.id.clone(), payment.clone());
        Ok(payment)
    }

    async fn get_outgoing_payment(
        &self,
        url: &str,
        token: &str,
    ) -> Result<OutgoingPayment, OpenPaymentsError> {
        self.record(MockCall::GetOutgoingPayment {
            url: url.to_string(),
            token: token.to_string(),
        });

        let mut state = self.state.lock().unwrap();
        state.take_failure()?;
        state
            .outgoing_payments
            .get(url)
            .cloned()
            .ok_or_else(|| OpenPaymentsError::NotFound(url.to_string()))
    }
}
