//! Payment flows
//!
//! [`Orchestrator`] runs the three dependent resource flows against a
//! [`Session`]: incoming payment, quote, outgoing payment. Each flow checks
//! the session for what it depends on first; when something is missing it
//! returns [`Outcome::Advisory`] naming the operation to run, without calling
//! any server.
//!
//! One full payment moves through: incoming payment created, quote created,
//! outgoing-payment grant pending interaction, grant active, outgoing payment
//! created.

use paygrant_sdk::{
    parse_wallet_address, AccessAction, AccessItem, AccessType, Amount, CreateIncomingPayment,
    CreateOutgoingPayment, CreateQuote, IncomingPayment, Limits, OpenPaymentsError,
    OutgoingPayment, PaymentMetadata, Quote, WalletAddress,
};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::adapter::{GrantAdapter, ResourceAdapter};
use crate::error::FlowError;
use crate::grant::{GrantConfig, GrantEngine, Negotiation, PendingGrant};
use crate::session::{Endpoint, Session, Var, VarValue};

const PAYMENT_DESCRIPTION: &str = "Hi from the CLI :)";
const QUOTE_METHOD: &str = "ilp";

const NO_INCOMING_PAYMENT: &str = "No incoming payment in session. Call `ip:create` first.";
const NO_EXISTING_INCOMING_PAYMENT: &str = "No existing incoming payment. Call `ip:create` first.";
const NO_QUOTE: &str = "No quote in session. Call `quote:create` first.";
const NO_EXISTING_QUOTE: &str = "No existing quote. Call `quote:create` first.";
const NO_QUOTE_AMOUNT: &str = "No debitAmount provided for the quote, and no incomingAmount \
    existing on the incoming payment.\nUse `quote:create <debitAmount>`, or create an incoming \
    payment with an amount `ip:create <incomingAmount>`";
const NO_OUTGOING_PAYMENT: &str = "No outgoing payment in session. Call `op:create` first.";
const NO_OUTGOING_PAYMENT_GRANT: &str =
    "No outgoing payment grant in session. Call `grant:op` first.";
const NOT_YET_AUTHORIZED: &str =
    "Grant not yet authorized. Call `grant:op` to request it again.";
const INVALID_WALLET_ADDRESS: &str = "Invalid wallet address.";

/// Operations a user can invoke on a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    IncomingPaymentCreate,
    IncomingPaymentGet,
    IncomingPaymentComplete,
    QuoteCreate,
    QuoteGet,
    GrantIncomingPayment,
    GrantQuote,
    GrantOutgoingPayment,
    OutgoingPaymentCreate,
    OutgoingPaymentGet,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::IncomingPaymentCreate,
        Operation::IncomingPaymentGet,
        Operation::IncomingPaymentComplete,
        Operation::QuoteCreate,
        Operation::QuoteGet,
        Operation::GrantIncomingPayment,
        Operation::GrantQuote,
        Operation::GrantOutgoingPayment,
        Operation::OutgoingPaymentCreate,
        Operation::OutgoingPaymentGet,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Operation::IncomingPaymentCreate => "ip:create",
            Operation::IncomingPaymentGet => "ip:get",
            Operation::IncomingPaymentComplete => "ip:complete",
            Operation::QuoteCreate => "quote:create",
            Operation::QuoteGet => "quote:get",
            Operation::GrantIncomingPayment => "grant:ip",
            Operation::GrantQuote => "grant:quote",
            Operation::GrantOutgoingPayment => "grant:op",
            Operation::OutgoingPaymentCreate => "op:create",
            Operation::OutgoingPaymentGet => "op:get",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    /// The grant operation that refreshes the token this operation uses
    pub fn regrant(self) -> Operation {
        match self {
            Operation::IncomingPaymentCreate
            | Operation::IncomingPaymentGet
            | Operation::IncomingPaymentComplete
            | Operation::GrantIncomingPayment => Operation::GrantIncomingPayment,
            Operation::QuoteCreate | Operation::QuoteGet | Operation::GrantQuote => {
                Operation::GrantQuote
            }
            Operation::GrantOutgoingPayment
            | Operation::OutgoingPaymentCreate
            | Operation::OutgoingPaymentGet => Operation::GrantOutgoingPayment,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a flow that may have been skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Done(T),
    /// Nothing was done; the message says what to do first
    Advisory(String),
}

impl<T> Outcome<T> {
    fn advise(message: &str) -> Self {
        Outcome::Advisory(message.to_string())
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }

    pub fn advisory(&self) -> Option<&str> {
        match self {
            Outcome::Advisory(message) => Some(message),
            Outcome::Done(_) => None,
        }
    }

    pub fn done(self) -> Option<T> {
        match self {
            Outcome::Done(value) => Some(value),
            Outcome::Advisory(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Done(value) => Outcome::Done(f(value)),
            Outcome::Advisory(message) => Outcome::Advisory(message),
        }
    }
}

/// Supplies the interaction reference for a pending grant
///
/// Returning `None` abandons the grant.
pub trait InteractionSource {
    fn interact_ref(&mut self, pending: &PendingGrant) -> Option<String>;
}

impl<F> InteractionSource for F
where
    F: FnMut(&PendingGrant) -> Option<String>,
{
    fn interact_ref(&mut self, pending: &PendingGrant) -> Option<String> {
        self(pending)
    }
}

/// Interaction source for runs without a human
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInteraction;

impl InteractionSource for NoInteraction {
    fn interact_ref(&mut self, _pending: &PendingGrant) -> Option<String> {
        None
    }
}

pub fn incoming_payment_scope() -> AccessItem {
    AccessItem::new(
        AccessType::IncomingPayment,
        [
            AccessAction::ReadAll,
            AccessAction::Create,
            AccessAction::List,
            AccessAction::Complete,
        ],
    )
}

pub fn quote_scope() -> AccessItem {
    AccessItem::new(AccessType::Quote, [AccessAction::Read, AccessAction::Create])
}

pub fn outgoing_payment_scope(owner: &str, limits: Limits) -> AccessItem {
    AccessItem::new(
        AccessType::OutgoingPayment,
        [AccessAction::Read, AccessAction::Create, AccessAction::List],
    )
    .identifier(owner)
    .limits(limits)
}

pub struct Orchestrator<A> {
    adapter: Arc<A>,
    grants: GrantEngine<A>,
}

impl<A: GrantAdapter + ResourceAdapter> Orchestrator<A> {
    pub fn new(adapter: Arc<A>, config: GrantConfig) -> Self {
        Self {
            grants: GrantEngine::new(adapter.clone(), config),
            adapter,
        }
    }

    pub fn grants(&self) -> &GrantEngine<A> {
        &self.grants
    }

    // ------------------------------------------------------------------
    // Session endpoints
    // ------------------------------------------------------------------

    /// Resolve `input` and make it the sending or receiving wallet address
    pub async fn set_endpoint(
        &self,
        session: &mut Session,
        which: Endpoint,
        input: &str,
    ) -> Result<Outcome<WalletAddress>, FlowError> {
        let Some(url) = parse_wallet_address(input) else {
            return Ok(Outcome::advise(INVALID_WALLET_ADDRESS));
        };

        let wallet = self.adapter.wallet_address(&url).await?;
        session.set_endpoint(which, wallet.clone());
        info!(endpoint = %which, wallet_address = %wallet.id, "Wallet address set");
        Ok(Outcome::Done(wallet))
    }

    // ------------------------------------------------------------------
    // Incoming payments
    // ------------------------------------------------------------------

    pub async fn create_incoming_payment(
        &self,
        session: &mut Session,
        amount: Option<&str>,
    ) -> Result<Outcome<IncomingPayment>, FlowError> {
        let receiving = endpoint(session, Endpoint::Receiving)?;
        let token = self
            .direct_token(
                session,
                Var::IncomingPaymentToken,
                &receiving.auth_server,
                incoming_payment_scope(),
                false,
            )
            .await?;

        let params = CreateIncomingPayment {
            wallet_address: receiving.id.clone(),
            incoming_amount: amount
                .map(|value| Amount::new(value, &receiving.asset_code, receiving.asset_scale)),
            expires_at: None,
            metadata: Some(PaymentMetadata::description(PAYMENT_DESCRIPTION)),
        };

        let payment = self
            .adapter
            .create_incoming_payment(&origin(&receiving)?, &token, &params)
            .await
            .map_err(|e| FlowError::from_resource(e, Operation::GrantIncomingPayment))?;

        store_resource(session, Var::IncomingPaymentId, &payment.id)?;
        if let Some(amount) = &payment.incoming_amount {
            session.set(
                Var::IncomingPaymentAmount,
                VarValue::Amount(amount.value.clone()),
            )?;
        }

        info!(incoming_payment = %payment.id, "Created incoming payment");
        Ok(Outcome::Done(payment))
    }

    /// Read the stored incoming payment, requesting a grant if none is held
    pub async fn get_incoming_payment(
        &self,
        session: &mut Session,
    ) -> Result<Outcome<IncomingPayment>, FlowError> {
        let Some(url) = session.text(Var::IncomingPaymentId).map(str::to_string) else {
            return Ok(Outcome::advise(NO_EXISTING_INCOMING_PAYMENT));
        };
        let token = self.incoming_payment_token(session).await?;

        let payment = self
            .adapter
            .get_incoming_payment(&url, &token)
            .await
            .map_err(|e| FlowError::from_resource(e, Operation::GrantIncomingPayment))?;
        Ok(Outcome::Done(payment))
    }

    /// Stop an incoming payment from accepting further funds
    pub async fn complete_incoming_payment(
        &self,
        session: &mut Session,
    ) -> Result<Outcome<IncomingPayment>, FlowError> {
        let Some(url) = session.text(Var::IncomingPaymentId).map(str::to_string) else {
            return Ok(Outcome::advise(NO_EXISTING_INCOMING_PAYMENT));
        };
        let token = self.incoming_payment_token(session).await?;

        let payment = self
            .adapter
            .complete_incoming_payment(&url, &token)
            .await
            .map_err(|e| FlowError::from_resource(e, Operation::GrantIncomingPayment))?;

        info!(incoming_payment = %payment.id, "Completed incoming payment");
        Ok(Outcome::Done(payment))
    }

    async fn incoming_payment_token(&self, session: &mut Session) -> Result<String, FlowError> {
        let receiving = endpoint(session, Endpoint::Receiving)?;
        self.direct_token(
            session,
            Var::IncomingPaymentToken,
            &receiving.auth_server,
            incoming_payment_scope(),
            false,
        )
        .await
    }

    /// Replace the incoming payment token with a fresh grant
    pub async fn grant_incoming_payment(
        &self,
        session: &mut Session,
    ) -> Result<Outcome<String>, FlowError> {
        let receiving = endpoint(session, Endpoint::Receiving)?;
        self.direct_token(
            session,
            Var::IncomingPaymentToken,
            &receiving.auth_server,
            incoming_payment_scope(),
            true,
        )
        .await
        .map(Outcome::Done)
    }

    // ------------------------------------------------------------------
    // Quotes
    // ------------------------------------------------------------------

    /// Quote the incoming payment in session
    ///
    /// Without `debit_amount` the quote is for the incoming payment's amount,
    /// so one of the two has to be known.
    pub async fn create_quote(
        &self,
        session: &mut Session,
        debit_amount: Option<&str>,
    ) -> Result<Outcome<Quote>, FlowError> {
        let Some(receiver) = session.text(Var::IncomingPaymentId).map(str::to_string) else {
            return Ok(Outcome::advise(NO_INCOMING_PAYMENT));
        };
        if debit_amount.is_none() && !session.contains(Var::IncomingPaymentAmount) {
            return Ok(Outcome::advise(NO_QUOTE_AMOUNT));
        }

        let sending = endpoint(session, Endpoint::Sending)?;
        let token = self
            .direct_token(
                session,
                Var::QuoteToken,
                &sending.auth_server,
                quote_scope(),
                false,
            )
            .await?;

        let params = CreateQuote {
            wallet_address: sending.id.clone(),
            receiver,
            method: QUOTE_METHOD.to_string(),
            debit_amount: debit_amount
                .map(|value| Amount::new(value, &sending.asset_code, sending.asset_scale)),
            receive_amount: None,
        };

        let quote = self
            .adapter
            .create_quote(&origin(&sending)?, &token, &params)
            .await
            .map_err(|e| FlowError::from_resource(e, Operation::GrantQuote))?;

        store_resource(session, Var::QuoteId, &quote.id)?;
        session.set(
            Var::QuoteDebitAmount,
            VarValue::Amount(quote.debit_amount.value.clone()),
        )?;
        session.set(
            Var::QuoteReceiveAmount,
            VarValue::Amount(quote.receive_amount.value.clone()),
        )?;

        info!(
            quote = %quote.id,
            debit_amount = %quote.debit_amount.value,
            receive_amount = %quote.receive_amount.value,
            "Created quote"
        );
        Ok(Outcome::Done(quote))
    }

    pub async fn get_quote(&self, session: &mut Session) -> Result<Outcome<Quote>, FlowError> {
        let Some(url) = session.text(Var::QuoteId).map(str::to_string) else {
            return Ok(Outcome::advise(NO_EXISTING_QUOTE));
        };
        let sending = endpoint(session, Endpoint::Sending)?;
        let token = self
            .direct_token(
                session,
                Var::QuoteToken,
                &sending.auth_server,
                quote_scope(),
                false,
            )
            .await?;

        let quote = self
            .adapter
            .get_quote(&url, &token)
            .await
            .map_err(|e| FlowError::from_resource(e, Operation::GrantQuote))?;
        Ok(Outcome::Done(quote))
    }

    /// Replace the quote token with a fresh grant
    pub async fn grant_quote(&self, session: &mut Session) -> Result<Outcome<String>, FlowError> {
        let sending = endpoint(session, Endpoint::Sending)?;
        self.direct_token(
            session,
            Var::QuoteToken,
            &sending.auth_server,
            quote_scope(),
            true,
        )
        .await
        .map(Outcome::Done)
    }

    // ------------------------------------------------------------------
    // Outgoing payments
    // ------------------------------------------------------------------

    /// Request an interactive outgoing-payment grant
    ///
    /// Limits default to the amounts of the quote in session; explicit
    /// amounts override them. Always asks the server, so this is also how a
    /// rejected token gets replaced.
    pub async fn grant_outgoing_payment(
        &self,
        session: &mut Session,
        debit_amount: Option<&str>,
        receive_amount: Option<&str>,
        interaction: &mut dyn InteractionSource,
    ) -> Result<Outcome<String>, FlowError> {
        let sending = endpoint(session, Endpoint::Sending)?;

        let debit = debit_amount
            .or_else(|| session.text(Var::QuoteDebitAmount))
            .map(|value| Amount::new(value, &sending.asset_code, sending.asset_scale));
        let receive = match receive_amount.or_else(|| session.text(Var::QuoteReceiveAmount)) {
            Some(value) => {
                let receiving = endpoint(session, Endpoint::Receiving)?;
                Some(Amount::new(
                    value,
                    &receiving.asset_code,
                    receiving.asset_scale,
                ))
            }
            None => None,
        };

        let scope = outgoing_payment_scope(
            &sending.id,
            Limits {
                debit_amount: debit,
                receive_amount: receive,
                ..Default::default()
            },
        );

        let negotiation = self
            .grants
            .request_grant(
                session,
                Var::OutgoingPaymentToken,
                &sending.auth_server,
                scope,
                true,
            )
            .await?;

        match negotiation {
            Negotiation::Ready(token) => Ok(Outcome::Done(token)),
            Negotiation::InteractionRequired(pending) => {
                match interaction.interact_ref(&pending) {
                    Some(interact_ref) => {
                        let token = self.grants.finalize(session, pending, &interact_ref).await?;
                        Ok(Outcome::Done(token))
                    }
                    None => {
                        warn!("Grant interaction abandoned");
                        self.grants.abandon(session);
                        Ok(Outcome::advise(NOT_YET_AUTHORIZED))
                    }
                }
            }
        }
    }

    /// Pay the quote in session
    ///
    /// Requests the outgoing-payment grant first when there is no token yet.
    pub async fn create_outgoing_payment(
        &self,
        session: &mut Session,
        interaction: &mut dyn InteractionSource,
    ) -> Result<Outcome<OutgoingPayment>, FlowError> {
        let Some(quote_id) = session.text(Var::QuoteId).map(str::to_string) else {
            return Ok(Outcome::advise(NO_QUOTE));
        };
        let sending = endpoint(session, Endpoint::Sending)?;

        let token = match session.token(Var::OutgoingPaymentToken) {
            Some(token) => token.value.clone(),
            None => match self
                .grant_outgoing_payment(session, None, None, interaction)
                .await?
            {
                Outcome::Done(token) => token,
                Outcome::Advisory(message) => return Ok(Outcome::Advisory(message)),
            },
        };

        let params = CreateOutgoingPayment {
            wallet_address: sending.id.clone(),
            quote_id,
            metadata: Some(PaymentMetadata::description(PAYMENT_DESCRIPTION)),
        };

        let payment = self
            .adapter
            .create_outgoing_payment(&origin(&sending)?, &token, &params)
            .await
            .map_err(|e| FlowError::from_resource(e, Operation::GrantOutgoingPayment))?;

        store_resource(session, Var::OutgoingPaymentId, &payment.id)?;
        info!(outgoing_payment = %payment.id, "Created outgoing payment");
        Ok(Outcome::Done(payment))
    }

    pub async fn get_outgoing_payment(
        &self,
        session: &Session,
    ) -> Result<Outcome<OutgoingPayment>, FlowError> {
        let Some(url) = session.text(Var::OutgoingPaymentId) else {
            return Ok(Outcome::advise(NO_OUTGOING_PAYMENT));
        };
        let Some(token) = session.token(Var::OutgoingPaymentToken) else {
            return Ok(Outcome::advise(NO_OUTGOING_PAYMENT_GRANT));
        };

        let payment = self
            .adapter
            .get_outgoing_payment(url, &token.value)
            .await
            .map_err(|e| FlowError::from_resource(e, Operation::GrantOutgoingPayment))?;
        Ok(Outcome::Done(payment))
    }

    /// Token for a grant that needs no interaction
    async fn direct_token(
        &self,
        session: &mut Session,
        target: Var,
        auth_server: &str,
        scope: AccessItem,
        force: bool,
    ) -> Result<String, FlowError> {
        let access_type = scope.access_type;
        let negotiation = if force {
            self.grants
                .request_grant(session, target, auth_server, scope, false)
                .await?
        } else {
            self.grants
                .ensure_token(session, target, auth_server, scope, false)
                .await?
        };

        match negotiation {
            Negotiation::Ready(token) => Ok(token),
            Negotiation::InteractionRequired(_) => {
                self.grants.abandon(session);
                Err(FlowError::Api(OpenPaymentsError::InvalidResponse(format!(
                    "authorization server asked for interaction on a {} grant",
                    access_type
                ))))
            }
        }
    }
}

fn endpoint(session: &Session, which: Endpoint) -> Result<WalletAddress, FlowError> {
    session
        .endpoint(which)
        .cloned()
        .ok_or(FlowError::MissingEndpoint(which))
}

fn origin(wallet: &WalletAddress) -> Result<String, FlowError> {
    wallet.origin().map_err(|e| {
        FlowError::Api(OpenPaymentsError::Configuration(format!(
            "Invalid wallet address {}: {}",
            wallet.id, e
        )))
    })
}

/// Store a new resource id, dropping what was derived from the previous one
fn store_resource(session: &mut Session, var: Var, id: &str) -> Result<(), FlowError> {
    for derived in var.derived() {
        session.clear(*derived);
    }
    session.set(var, VarValue::Url(id.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::IssuedToken;
    use crate::test_utils::{mock_wallet, MockCall, MockOpenPayments};

    const ALICE: &str = "https://wallet.mock/alice";
    const BOB: &str = "https://bank.mock/bob";

    fn setup(mock: &MockOpenPayments) -> (Orchestrator<MockOpenPayments>, Session) {
        let orchestrator = Orchestrator::new(Arc::new(mock.clone()), GrantConfig::default());
        let session = Session::with_endpoints(mock_wallet(ALICE, "USD"), mock_wallet(BOB, "EUR"));
        (orchestrator, session)
    }

    fn approve(_: &PendingGrant) -> Option<String> {
        Some("interact-ref".to_string())
    }

    #[test]
    fn operation_names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(Operation::from_name(op.name()), Some(op));
        }
        assert_eq!(Operation::from_name("op:delete"), None);
        assert_eq!(Operation::QuoteGet.regrant(), Operation::GrantQuote);
        assert_eq!(
            Operation::OutgoingPaymentGet.regrant(),
            Operation::GrantOutgoingPayment
        );
    }

    #[tokio::test]
    async fn incoming_payment_with_amount_stores_id_and_amount() {
        let mock = MockOpenPayments::new();
        let (orchestrator, mut session) = setup(&mock);

        let payment = orchestrator
            .create_incoming_payment(&mut session, Some("1000"))
            .await
            .unwrap()
            .done()
            .unwrap();

        assert_eq!(session.text(Var::IncomingPaymentId), Some(payment.id.as_str()));
        assert_eq!(session.text(Var::IncomingPaymentAmount), Some("1000"));
        assert!(payment.id.starts_with("https://bank.mock/incoming-payments/"));

        match &mock.calls()[..] {
            [MockCall::RequestGrant {
                auth_server,
                scope,
                interactive,
            }, MockCall::CreateIncomingPayment { amount, .. }] => {
                assert_eq!(auth_server, "https://bank.mock/bob/auth");
                assert_eq!(scope, &incoming_payment_scope());
                assert!(!interactive);
                assert_eq!(amount, &Some(Amount::new("1000", "EUR", 2)));
            }
            calls => panic!("unexpected calls: {:?}", calls),
        }
    }

    #[tokio::test]
    async fn incoming_payment_without_amount_clears_stale_amount() {
        let mock = MockOpenPayments::new();
        let (orchestrator, mut session) = setup(&mock);

        orchestrator
            .create_incoming_payment(&mut session, Some("1000"))
            .await
            .unwrap();
        let second = orchestrator
            .create_incoming_payment(&mut session, None)
            .await
            .unwrap()
            .done()
            .unwrap();

        assert_eq!(session.text(Var::IncomingPaymentId), Some(second.id.as_str()));
        assert!(session.get(Var::IncomingPaymentAmount).is_none());
        // The token was reused for the second payment
        assert_eq!(mock.grant_requests(), 1);
    }

    #[tokio::test]
    async fn incoming_payment_requires_receiving_endpoint() {
        let mock = MockOpenPayments::new();
        let orchestrator = Orchestrator::new(Arc::new(mock.clone()), GrantConfig::default());
        let mut session = Session::new();

        let err = orchestrator
            .create_incoming_payment(&mut session, None)
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::MissingEndpoint(Endpoint::Receiving)));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn get_incoming_payment_is_idempotent() {
        let mock = MockOpenPayments::new();
        let (orchestrator, mut session) = setup(&mock);
        orchestrator
            .create_incoming_payment(&mut session, Some("5"))
            .await
            .unwrap();
        let before = session.clone();

        let first = orchestrator.get_incoming_payment(&mut session).await.unwrap();
        let second = orchestrator.get_incoming_payment(&mut session).await.unwrap();

        assert_eq!(first.done().unwrap().id, second.done().unwrap().id);
        assert_eq!(
            session.variables().collect::<Vec<_>>(),
            before.variables().collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn get_and_complete_without_payment_advise() {
        let mock = MockOpenPayments::new();
        let (orchestrator, mut session) = setup(&mock);

        let get = orchestrator.get_incoming_payment(&mut session).await.unwrap();
        let complete = orchestrator
            .complete_incoming_payment(&mut session)
            .await
            .unwrap();

        assert_eq!(get.advisory(), Some(NO_EXISTING_INCOMING_PAYMENT));
        assert_eq!(complete.advisory(), Some(NO_EXISTING_INCOMING_PAYMENT));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn get_and_complete_without_token_request_a_grant() {
        let mock = MockOpenPayments::new()
            .with_grant_token("ip-1")
            .with_grant_token("ip-2");
        let (orchestrator, mut session) = setup(&mock);
        orchestrator
            .create_incoming_payment(&mut session, Some("5"))
            .await
            .unwrap();
        session.clear(Var::IncomingPaymentToken);

        let payment = orchestrator
            .get_incoming_payment(&mut session)
            .await
            .unwrap()
            .done()
            .unwrap();
        let completed = orchestrator
            .complete_incoming_payment(&mut session)
            .await
            .unwrap()
            .done()
            .unwrap();

        assert_eq!(completed.id, payment.id);
        assert!(completed.completed);
        // One grant for create, one after the token was dropped, then reuse
        assert_eq!(mock.grant_requests(), 2);
        assert_eq!(session.token(Var::IncomingPaymentToken).unwrap().value, "ip-2");
        assert!(matches!(
            mock.calls().last(),
            Some(MockCall::CompleteIncomingPayment { token, .. }) if token == "ip-2"
        ));
    }

    #[tokio::test]
    async fn complete_marks_payment_completed() {
        let mock = MockOpenPayments::new();
        let (orchestrator, mut session) = setup(&mock);
        orchestrator
            .create_incoming_payment(&mut session, None)
            .await
            .unwrap();

        let payment = orchestrator
            .complete_incoming_payment(&mut session)
            .await
            .unwrap()
            .done()
            .unwrap();

        assert!(payment.completed);
    }

    #[tokio::test]
    async fn quote_without_incoming_payment_makes_no_calls() {
        let mock = MockOpenPayments::new();
        let (orchestrator, mut session) = setup(&mock);

        let outcome = orchestrator.create_quote(&mut session, None).await.unwrap();

        assert_eq!(outcome.advisory(), Some(NO_INCOMING_PAYMENT));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn quote_without_any_amount_advises() {
        let mock = MockOpenPayments::new();
        let (orchestrator, mut session) = setup(&mock);
        orchestrator
            .create_incoming_payment(&mut session, None)
            .await
            .unwrap();
        let calls = mock.call_count();

        let outcome = orchestrator.create_quote(&mut session, None).await.unwrap();

        assert_eq!(outcome.advisory(), Some(NO_QUOTE_AMOUNT));
        assert_eq!(mock.call_count(), calls);
    }

    #[tokio::test]
    async fn quote_stores_id_and_amounts() {
        let mock = MockOpenPayments::new().with_quote_amounts(
            Amount::new("1010", "USD", 2),
            Amount::new("1000", "EUR", 2),
        );
        let (orchestrator, mut session) = setup(&mock);
        orchestrator
            .create_incoming_payment(&mut session, Some("1000"))
            .await
            .unwrap();

        let quote = orchestrator
            .create_quote(&mut session, None)
            .await
            .unwrap()
            .done()
            .unwrap();

        assert_eq!(session.text(Var::QuoteId), Some(quote.id.as_str()));
        assert_eq!(session.text(Var::QuoteDebitAmount), Some("1010"));
        assert_eq!(session.text(Var::QuoteReceiveAmount), Some("1000"));
        assert!(mock.calls().iter().any(|c| matches!(
            c,
            MockCall::CreateQuote { origin, debit_amount: None, .. } if origin == "https://wallet.mock"
        )));
    }

    #[tokio::test]
    async fn get_quote_reuses_or_requests_quote_token() {
        let mock = MockOpenPayments::new();
        let (orchestrator, mut session) = setup(&mock);
        let advised = orchestrator.get_quote(&mut session).await.unwrap();
        assert_eq!(advised.advisory(), Some(NO_EXISTING_QUOTE));

        orchestrator
            .create_incoming_payment(&mut session, None)
            .await
            .unwrap();
        let created = orchestrator
            .create_quote(&mut session, Some("250"))
            .await
            .unwrap()
            .done()
            .unwrap();
        let grants = mock.grant_requests();

        orchestrator.get_quote(&mut session).await.unwrap();
        assert_eq!(mock.grant_requests(), grants);

        session.clear(Var::QuoteToken);
        let quote = orchestrator
            .get_quote(&mut session)
            .await
            .unwrap()
            .done()
            .unwrap();

        assert_eq!(quote.id, created.id);
        assert_eq!(mock.grant_requests(), grants + 1);
        let fresh = session.token(Var::QuoteToken).unwrap().value.clone();
        match &mock.calls()[mock.call_count() - 2..] {
            [MockCall::RequestGrant { auth_server, scope, .. }, MockCall::GetQuote { token, .. }] => {
                assert_eq!(auth_server, "https://wallet.mock/alice/auth");
                assert_eq!(scope, &quote_scope());
                assert_eq!(token, &fresh);
            }
            calls => panic!("unexpected calls: {:?}", calls),
        }
    }

    #[tokio::test]
    async fn quote_with_debit_amount_uses_sending_asset() {
        let mock = MockOpenPayments::new();
        let (orchestrator, mut session) = setup(&mock);
        orchestrator
            .create_incoming_payment(&mut session, None)
            .await
            .unwrap();

        orchestrator
            .create_quote(&mut session, Some("250"))
            .await
            .unwrap();

        assert!(mock.calls().iter().any(|c| matches!(
            c,
            MockCall::CreateQuote { debit_amount: Some(amount), .. }
                if *amount == Amount::new("250", "USD", 2)
        )));
        assert_eq!(session.text(Var::QuoteDebitAmount), Some("250"));
    }

    #[tokio::test]
    async fn grant_op_uses_quote_amounts_as_limits() {
        let mock = MockOpenPayments::new()
            .with_quote_amounts(Amount::new("1010", "USD", 2), Amount::new("1000", "EUR", 2));
        let (orchestrator, mut session) = setup(&mock);
        orchestrator
            .create_incoming_payment(&mut session, Some("1000"))
            .await
            .unwrap();
        orchestrator.create_quote(&mut session, None).await.unwrap();

        orchestrator
            .grant_outgoing_payment(&mut session, None, Some("999"), &mut NoInteraction)
            .await
            .unwrap();

        let scope = mock
            .calls()
            .into_iter()
            .find_map(|c| match c {
                MockCall::RequestGrant { scope, interactive: true, .. } => Some(scope),
                _ => None,
            })
            .unwrap();
        let limits = scope.limits.unwrap();
        assert_eq!(scope.identifier.as_deref(), Some(ALICE));
        assert_eq!(limits.debit_amount, Some(Amount::new("1010", "USD", 2)));
        assert_eq!(limits.receive_amount, Some(Amount::new("999", "EUR", 2)));
    }

    #[tokio::test]
    async fn grant_op_without_amounts_omits_limits() {
        let mock = MockOpenPayments::new().with_grant_token("op-token");
        let (orchestrator, mut session) = setup(&mock);

        let outcome = orchestrator
            .grant_outgoing_payment(&mut session, None, None, &mut NoInteraction)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Done("op-token".to_string()));
        assert!(matches!(
            &mock.calls()[0],
            MockCall::RequestGrant { scope, .. } if scope.limits.is_none()
        ));
    }

    #[tokio::test]
    async fn abandoned_interaction_is_not_yet_authorized() {
        let mock = MockOpenPayments::new().with_pending_grant(1);
        let (orchestrator, mut session) = setup(&mock);

        let outcome = orchestrator
            .grant_outgoing_payment(&mut session, Some("10"), None, &mut NoInteraction)
            .await
            .unwrap();

        assert_eq!(outcome.advisory(), Some(NOT_YET_AUTHORIZED));
        assert_eq!(mock.continuation_calls(), 0);
        assert!(session.token(Var::OutgoingPaymentToken).is_none());
        assert!(!session.contains(Var::ContinueUri));
    }

    #[tokio::test(start_paused = true)]
    async fn op_create_triggers_grant_when_missing() {
        let mock = MockOpenPayments::new()
            .with_grant_token("ip-token")
            .with_grant_token("quote-token")
            .with_pending_grant(1)
            .with_continuation_token("op-token");
        let (orchestrator, mut session) = setup(&mock);
        orchestrator
            .create_incoming_payment(&mut session, Some("1000"))
            .await
            .unwrap();
        orchestrator.create_quote(&mut session, None).await.unwrap();

        let mut approve = approve;
        let payment = orchestrator
            .create_outgoing_payment(&mut session, &mut approve)
            .await
            .unwrap()
            .done()
            .unwrap();

        assert_eq!(session.text(Var::OutgoingPaymentId), Some(payment.id.as_str()));
        assert_eq!(payment.quote_id.as_deref(), session.text(Var::QuoteId));
        assert!(mock.calls().iter().any(|c| matches!(
            c,
            MockCall::CreateOutgoingPayment { token, .. } if token == "op-token"
        )));
    }

    #[tokio::test]
    async fn op_create_without_quote_advises() {
        let mock = MockOpenPayments::new();
        let (orchestrator, mut session) = setup(&mock);

        let outcome = orchestrator
            .create_outgoing_payment(&mut session, &mut NoInteraction)
            .await
            .unwrap();

        assert_eq!(outcome.advisory(), Some(NO_QUOTE));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn op_get_with_stale_token_is_unauthorized() {
        let mock = MockOpenPayments::new();
        let (orchestrator, mut session) = setup(&mock);
        orchestrator
            .create_incoming_payment(&mut session, Some("1000"))
            .await
            .unwrap();
        orchestrator.create_quote(&mut session, None).await.unwrap();
        orchestrator
            .create_outgoing_payment(&mut session, &mut NoInteraction)
            .await
            .unwrap();
        let before = session.clone();

        mock.fail_next_resource_call(OpenPaymentsError::Unauthorized("expired".into()));
        let err = orchestrator.get_outgoing_payment(&session).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Unauthorized. Get a new grant by calling `grant:op`"
        );
        // The stale token stays until a new grant replaces it
        assert_eq!(
            session.variables().collect::<Vec<_>>(),
            before.variables().collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn op_get_without_payment_advises() {
        let mock = MockOpenPayments::new();
        let (orchestrator, session) = setup(&mock);

        let outcome = orchestrator.get_outgoing_payment(&session).await.unwrap();

        assert_eq!(outcome.advisory(), Some(NO_OUTGOING_PAYMENT));
    }

    #[tokio::test]
    async fn forced_regrant_overwrites_token() {
        let mock = MockOpenPayments::new()
            .with_grant_token("quote-1")
            .with_grant_token("quote-2");
        let (orchestrator, mut session) = setup(&mock);

        orchestrator.grant_quote(&mut session).await.unwrap();
        let outcome = orchestrator.grant_quote(&mut session).await.unwrap();

        assert_eq!(outcome, Outcome::Done("quote-2".to_string()));
        assert_eq!(
            session.token(Var::QuoteToken),
            Some(&IssuedToken {
                value: "quote-2".into(),
                scope: quote_scope(),
            })
        );
    }

    #[tokio::test]
    async fn grant_ip_requires_receiving_endpoint_only() {
        let mock = MockOpenPayments::new();
        let orchestrator = Orchestrator::new(Arc::new(mock.clone()), GrantConfig::default());
        let mut session = Session::new();
        session.set_endpoint(Endpoint::Receiving, mock_wallet(BOB, "EUR"));

        let outcome = orchestrator.grant_incoming_payment(&mut session).await.unwrap();

        assert!(outcome.is_done());
        assert!(session.token(Var::IncomingPaymentToken).is_some());
    }

    #[tokio::test]
    async fn set_endpoint_resolves_and_invalidates() {
        let carol = mock_wallet("https://other.mock/carol", "GBP");
        let mock = MockOpenPayments::new().with_wallet(carol.clone());
        let (orchestrator, mut session) = setup(&mock);
        orchestrator
            .create_incoming_payment(&mut session, Some("1"))
            .await
            .unwrap();

        let outcome = orchestrator
            .set_endpoint(&mut session, Endpoint::Receiving, "$other.mock/carol")
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Done(carol));
        assert!(session.get(Var::IncomingPaymentId).is_none());
        assert!(session.token(Var::IncomingPaymentToken).is_none());
    }

    #[tokio::test]
    async fn set_endpoint_rejects_invalid_input() {
        let mock = MockOpenPayments::new();
        let (orchestrator, mut session) = setup(&mock);

        let outcome = orchestrator
            .set_endpoint(&mut session, Endpoint::Sending, "not a wallet")
            .await
            .unwrap();

        assert_eq!(outcome.advisory(), Some(INVALID_WALLET_ADDRESS));
        assert_eq!(session.endpoint(Endpoint::Sending).unwrap().id, ALICE);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn pending_grant_on_direct_flow_is_an_error() {
        let mock = MockOpenPayments::new().with_pending_grant(1);
        let (orchestrator, mut session) = setup(&mock);

        let err = orchestrator
            .create_incoming_payment(&mut session, None)
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::Api(OpenPaymentsError::InvalidResponse(_))));
        assert!(!session.contains(Var::ContinueUri));
    }
}
