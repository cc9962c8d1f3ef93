//! Grant negotiation wire types
//!
//! Requests and responses exchanged with an authorization server: access
//! requests, interaction parameters and the continuation handle returned for
//! grants that need a human to approve them.

use crate::resources::Amount;
use serde::{Deserialize, Serialize};

/// Resource type an access item applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessType {
    IncomingPayment,
    Quote,
    OutgoingPayment,
}

impl std::fmt::Display for AccessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessType::IncomingPayment => write!(f, "incoming-payment"),
            AccessType::Quote => write!(f, "quote"),
            AccessType::OutgoingPayment => write!(f, "outgoing-payment"),
        }
    }
}

/// Action permitted by an access item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessAction {
    Create,
    Complete,
    Read,
    ReadAll,
    List,
    ListAll,
}

/// Ceilings attached to an outgoing-payment access item
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Limits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debit_amount: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receive_amount: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

impl Limits {
    pub fn is_empty(&self) -> bool {
        self.debit_amount.is_none()
            && self.receive_amount.is_none()
            && self.receiver.is_none()
            && self.interval.is_none()
    }
}

/// One entry of `access_token.access`
///
/// Two grant requests are interchangeable only when their access items are
/// equal, so equality covers every field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessItem {
    #[serde(rename = "type")]
    pub access_type: AccessType,
    pub actions: Vec<AccessAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<Limits>,
}

impl AccessItem {
    pub fn new(access_type: AccessType, actions: impl Into<Vec<AccessAction>>) -> Self {
        Self {
            access_type,
            actions: actions.into(),
            identifier: None,
            limits: None,
        }
    }

    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Attach limits; empty limits are dropped
    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = if limits.is_empty() { None } else { Some(limits) };
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenRequest {
    pub access: Vec<AccessItem>,
}

/// How the client will learn that the human finished interacting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractFinish {
    pub method: String,
    pub uri: String,
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractRequest {
    pub start: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish: Option<InteractFinish>,
}

impl InteractRequest {
    /// Redirect-based interaction that finishes by redirecting to `uri`
    pub fn redirect(uri: impl Into<String>, nonce: impl Into<String>) -> Self {
        Self {
            start: vec!["redirect".to_string()],
            finish: Some(InteractFinish {
                method: "redirect".to_string(),
                uri: uri.into(),
                nonce: nonce.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRequest {
    pub access_token: AccessTokenRequest,
    pub client: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interact: Option<InteractRequest>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContinueRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interact_ref: Option<String>,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenValue {
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub value: String,
    #[serde(default)]
    pub manage: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub access: Vec<AccessItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Continue {
    pub access_token: TokenValue,
    pub uri: String,
    /// Seconds the client must wait before continuing
    #[serde(default)]
    pub wait: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractResponse {
    pub redirect: String,
    #[serde(default)]
    pub finish: Option<String>,
}

/// Answer to a grant request or a continuation call
///
/// An approved grant carries `access_token`; a grant waiting on interaction
/// carries `interact` and/or `continue` without a token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantResponse {
    #[serde(default)]
    pub access_token: Option<AccessToken>,
    #[serde(default)]
    pub interact: Option<InteractResponse>,
    #[serde(default, rename = "continue")]
    pub continuation: Option<Continue>,
}

impl GrantResponse {
    pub fn is_approved(&self) -> bool {
        self.access_token.is_some()
    }
}
