//! Error types for payment flows
//!
//! A missing precondition is not an error: flows report it as
//! [`Outcome::Advisory`](crate::Outcome::Advisory). Everything here is a
//! failure the caller has to act on.

use paygrant_sdk::OpenPaymentsError;
use std::time::Duration;
use thiserror::Error;

use crate::orchestrator::Operation;
use crate::session::{Endpoint, Var, VarKind};

/// Errors raised by the session store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A value of the wrong kind was stored under a variable
    #[error("{var} holds a {expected}, not a {actual}")]
    KindMismatch {
        var: Var,
        expected: VarKind,
        actual: VarKind,
    },
}

/// Failures of grant negotiation and resource flows
#[derive(Debug, Error)]
pub enum FlowError {
    /// The authorization server refused the grant
    #[error("Grant denied: {0}")]
    GrantDenied(String),

    /// The grant was still pending when the polling deadline passed
    #[error("Grant not approved within {elapsed:?}. Request a new grant.")]
    GrantTimedOut { elapsed: Duration },

    /// The resource server rejected the token (HTTP 401)
    #[error("Unauthorized. Get a new grant by calling `{regrant}`")]
    Unauthorized { regrant: Operation },

    /// The token does not cover the call (HTTP 403)
    #[error("Insufficient or invalid grant. Get a new grant by calling `{regrant}`")]
    Forbidden { regrant: Operation },

    /// Transport failure talking to a server
    #[error("Network error: {0}")]
    Network(String),

    /// The flow needs a wallet address that was never configured
    #[error("No {0} wallet address configured")]
    MissingEndpoint(Endpoint),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// Any other server or client failure, unchanged
    #[error(transparent)]
    Api(OpenPaymentsError),
}

impl FlowError {
    /// Classify a resource-server failure; 401/403 point at `regrant`
    pub fn from_resource(err: OpenPaymentsError, regrant: Operation) -> Self {
        match err {
            OpenPaymentsError::Unauthorized(_) => FlowError::Unauthorized { regrant },
            OpenPaymentsError::Forbidden(_) => FlowError::Forbidden { regrant },
            other => other.into(),
        }
    }

    /// Classify an authorization-server failure
    pub fn from_grant(err: OpenPaymentsError) -> Self {
        match err {
            OpenPaymentsError::Denied(msg)
            | OpenPaymentsError::Unauthorized(msg)
            | OpenPaymentsError::Forbidden(msg) => FlowError::GrantDenied(msg),
            other => other.into(),
        }
    }

    /// The command that obtains a fresh grant, for 401/403 failures
    pub fn regrant(&self) -> Option<Operation> {
        match self {
            FlowError::Unauthorized { regrant } | FlowError::Forbidden { regrant } => {
                Some(*regrant)
            }
            _ => None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, FlowError::Network(_))
    }
}

impl From<OpenPaymentsError> for FlowError {
    fn from(err: OpenPaymentsError) -> Self {
        match err {
            OpenPaymentsError::Network(msg) => FlowError::Network(msg),
            other => FlowError::Api(other),
        }
    }
}
