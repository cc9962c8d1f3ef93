//! Session store
//!
//! One [`Session`] lives for the whole run. It holds the two wallet address
//! endpoints and a typed variable map: access tokens with the scope they were
//! issued for, the continuation handle of a pending grant, and the
//! identifiers and amounts of the resources created so far.
//!
//! The store is a plain mapping. Invalidating the variables derived from a
//! resource is done by the flows that create resources, using
//! [`Var::derived`].

use paygrant_sdk::{AccessItem, WalletAddress};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::error::SessionError;

/// Which of the two configured wallet addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Sending,
    Receiving,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Sending => write!(f, "sending"),
            Endpoint::Receiving => write!(f, "receiving"),
        }
    }
}

/// Shape of the value a variable holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Token,
    Url,
    Amount,
    Interval,
    Text,
}

impl fmt::Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VarKind::Token => "token",
            VarKind::Url => "url",
            VarKind::Amount => "amount",
            VarKind::Interval => "interval",
            VarKind::Text => "text",
        };
        f.write_str(name)
    }
}

/// Every variable a session knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Var {
    IncomingPaymentToken,
    QuoteToken,
    OutgoingPaymentToken,
    ContinueUri,
    ContinueToken,
    ContinueWait,
    InteractRef,
    IncomingPaymentId,
    IncomingPaymentAmount,
    QuoteId,
    QuoteDebitAmount,
    QuoteReceiveAmount,
    OutgoingPaymentId,
}

impl Var {
    pub const ALL: [Var; 13] = [
        Var::IncomingPaymentToken,
        Var::QuoteToken,
        Var::OutgoingPaymentToken,
        Var::ContinueUri,
        Var::ContinueToken,
        Var::ContinueWait,
        Var::InteractRef,
        Var::IncomingPaymentId,
        Var::IncomingPaymentAmount,
        Var::QuoteId,
        Var::QuoteDebitAmount,
        Var::QuoteReceiveAmount,
        Var::OutgoingPaymentId,
    ];

    /// Variables that hold the pending grant's continuation handle
    pub const CONTINUATION: [Var; 4] = [
        Var::ContinueUri,
        Var::ContinueToken,
        Var::ContinueWait,
        Var::InteractRef,
    ];

    pub fn kind(self) -> VarKind {
        match self {
            Var::IncomingPaymentToken | Var::QuoteToken | Var::OutgoingPaymentToken => {
                VarKind::Token
            }
            Var::ContinueUri
            | Var::IncomingPaymentId
            | Var::QuoteId
            | Var::OutgoingPaymentId => VarKind::Url,
            Var::IncomingPaymentAmount | Var::QuoteDebitAmount | Var::QuoteReceiveAmount => {
                VarKind::Amount
            }
            Var::ContinueWait => VarKind::Interval,
            Var::ContinueToken | Var::InteractRef => VarKind::Text,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Var::IncomingPaymentToken => "INCOMING_PAYMENT_ACCESS_TOKEN",
            Var::QuoteToken => "QUOTE_ACCESS_TOKEN",
            Var::OutgoingPaymentToken => "OUTGOING_PAYMENT_ACCESS_TOKEN",
            Var::ContinueUri => "CONTINUE_URI",
            Var::ContinueToken => "CONTINUE_ACCESS_TOKEN",
            Var::ContinueWait => "CONTINUE_WAIT",
            Var::InteractRef => "INTERACT_REF",
            Var::IncomingPaymentId => "INCOMING_PAYMENT_URL",
            Var::IncomingPaymentAmount => "INCOMING_PAYMENT_AMOUNT",
            Var::QuoteId => "QUOTE_URL",
            Var::QuoteDebitAmount => "QUOTE_DEBIT_AMOUNT",
            Var::QuoteReceiveAmount => "QUOTE_RECEIVE_AMOUNT",
            Var::OutgoingPaymentId => "OUTGOING_PAYMENT_URL",
        }
    }

    /// The endpoint whose grants or resources this variable belongs to
    ///
    /// Incoming payments live at the receiving wallet; quotes, outgoing
    /// payments and the interactive grant that pays for them at the sending one.
    pub fn endpoint(self) -> Endpoint {
        match self {
            Var::IncomingPaymentToken | Var::IncomingPaymentId | Var::IncomingPaymentAmount => {
                Endpoint::Receiving
            }
            _ => Endpoint::Sending,
        }
    }

    /// Variables that are only valid together with this resource identifier
    pub fn derived(self) -> &'static [Var] {
        match self {
            Var::IncomingPaymentId => &[Var::IncomingPaymentAmount],
            Var::QuoteId => &[Var::QuoteDebitAmount, Var::QuoteReceiveAmount],
            _ => &[],
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An access token and the scope it was issued for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub value: String,
    pub scope: AccessItem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarValue {
    Token(IssuedToken),
    Url(String),
    Amount(String),
    Interval(Duration),
    Text(String),
}

impl VarValue {
    pub fn kind(&self) -> VarKind {
        match self {
            VarValue::Token(_) => VarKind::Token,
            VarValue::Url(_) => VarKind::Url,
            VarValue::Amount(_) => VarKind::Amount,
            VarValue::Interval(_) => VarKind::Interval,
            VarValue::Text(_) => VarKind::Text,
        }
    }

    /// String form of everything except intervals
    pub fn as_str(&self) -> Option<&str> {
        match self {
            VarValue::Token(token) => Some(&token.value),
            VarValue::Url(s) | VarValue::Amount(s) | VarValue::Text(s) => Some(s),
            VarValue::Interval(_) => None,
        }
    }
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarValue::Token(token) => write!(f, "{} ({})", token.value, token.scope.access_type),
            VarValue::Interval(wait) => write!(f, "{}s", wait.as_secs()),
            VarValue::Url(s) | VarValue::Amount(s) | VarValue::Text(s) => f.write_str(s),
        }
    }
}

/// Mutable context for one run
#[derive(Debug, Clone, Default)]
pub struct Session {
    sending: Option<WalletAddress>,
    receiving: Option<WalletAddress>,
    variables: BTreeMap<Var, VarValue>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoints(sending: WalletAddress, receiving: WalletAddress) -> Self {
        Self {
            sending: Some(sending),
            receiving: Some(receiving),
            variables: BTreeMap::new(),
        }
    }

    pub fn endpoint(&self, which: Endpoint) -> Option<&WalletAddress> {
        match which {
            Endpoint::Sending => self.sending.as_ref(),
            Endpoint::Receiving => self.receiving.as_ref(),
        }
    }

    /// Replace an endpoint, dropping every variable scoped to it
    pub fn set_endpoint(&mut self, which: Endpoint, wallet: WalletAddress) {
        self.clear_endpoint(which);
        match which {
            Endpoint::Sending => self.sending = Some(wallet),
            Endpoint::Receiving => self.receiving = Some(wallet),
        }
    }

    /// Forget an endpoint and every variable scoped to it
    pub fn clear_endpoint(&mut self, which: Endpoint) {
        match which {
            Endpoint::Sending => self.sending = None,
            Endpoint::Receiving => self.receiving = None,
        }
        self.variables.retain(|var, _| var.endpoint() != which);
    }

    pub fn get(&self, var: Var) -> Option<&VarValue> {
        self.variables.get(&var)
    }

    /// Stored string value of a url, amount, text or token variable
    pub fn text(&self, var: Var) -> Option<&str> {
        self.get(var).and_then(VarValue::as_str)
    }

    pub fn token(&self, var: Var) -> Option<&IssuedToken> {
        match self.get(var) {
            Some(VarValue::Token(token)) => Some(token),
            _ => None,
        }
    }

    pub fn interval(&self, var: Var) -> Option<Duration> {
        match self.get(var) {
            Some(VarValue::Interval(wait)) => Some(*wait),
            _ => None,
        }
    }

    pub fn contains(&self, var: Var) -> bool {
        self.variables.contains_key(&var)
    }

    pub fn set(&mut self, var: Var, value: VarValue) -> Result<(), SessionError> {
        if value.kind() != var.kind() {
            return Err(SessionError::KindMismatch {
                var,
                expected: var.kind(),
                actual: value.kind(),
            });
        }
        self.variables.insert(var, value);
        Ok(())
    }

    pub fn clear(&mut self, var: Var) -> Option<VarValue> {
        self.variables.remove(&var)
    }

    pub fn variables(&self) -> impl Iterator<Item = (Var, &VarValue)> {
        self.variables.iter().map(|(var, value)| (*var, value))
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}
