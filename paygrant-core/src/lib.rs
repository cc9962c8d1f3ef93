//! Grant negotiation and payment flows for Open Payments
//!
//! `paygrant-core` keeps the state of one payment session and drives the
//! calls needed to move money between two wallet addresses:
//!
//! - [`Session`] holds the sending and receiving wallet addresses, the
//!   access tokens issued so far and the resources created with them.
//! - [`GrantEngine`] obtains tokens: it reuses a stored token for an equal
//!   scope, requests a grant otherwise, and polls a pending grant once the
//!   human approved it.
//! - [`Poller`] is the bounded polling loop the engine uses.
//! - [`Orchestrator`] runs the incoming payment, quote and outgoing payment
//!   flows, checking the session for what each one depends on.
//!
//! Servers are reached only through [`GrantAdapter`] and [`ResourceAdapter`],
//! which [`paygrant_sdk::OpenPaymentsClient`] implements.
//!
//! # Example
//!
//! ```no_run
//! use paygrant_core::{Endpoint, GrantConfig, NoInteraction, Orchestrator, Outcome, Session};
//! use paygrant_sdk::OpenPaymentsClient;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OpenPaymentsClient::builder()
//!     .client_wallet_address("https://ilp.example/client")
//!     .private_key("my-key-id", "private-key.pem")
//!     .build()?;
//!
//! let orchestrator = Orchestrator::new(Arc::new(client), GrantConfig::default());
//! let mut session = Session::new();
//! orchestrator
//!     .set_endpoint(&mut session, Endpoint::Receiving, "$ilp.example/bob")
//!     .await?;
//!
//! match orchestrator.create_incoming_payment(&mut session, Some("1000")).await? {
//!     Outcome::Done(payment) => println!("created {}", payment.id),
//!     Outcome::Advisory(message) => println!("{}", message),
//! }
//!
//! // Outgoing payments need a human to approve the grant; without one the
//! // flow reports that the grant is not yet authorized.
//! let outcome = orchestrator
//!     .create_outgoing_payment(&mut session, &mut NoInteraction)
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `test-utils` - [`test_utils::MockOpenPayments`], a scripted in-memory
//!   adapter

pub mod adapter;
pub mod error;
pub mod grant;
pub mod orchestrator;
pub mod poller;
pub mod session;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapter::{ContinueOutcome, GrantAdapter, GrantContinuation, GrantOutcome, ResourceAdapter};
pub use error::{FlowError, SessionError};
pub use grant::{
    GrantConfig, GrantEngine, Negotiation, PendingGrant, DEFAULT_CONTINUE_WAIT,
    DEFAULT_FINISH_URI, DEFAULT_POLL_DEADLINE,
};
pub use orchestrator::{
    incoming_payment_scope, outgoing_payment_scope, quote_scope, InteractionSource,
    NoInteraction, Operation, Orchestrator, Outcome,
};
pub use poller::{PollError, Poller, Present};
pub use session::{Endpoint, IssuedToken, Session, Var, VarKind, VarValue};
