//! Payment resource types: incoming payments, quotes and outgoing payments

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A value in a wallet's asset
///
/// `value` is an unsigned integer encoded as a string, scaled by `asset_scale`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Amount {
    pub value: String,
    pub asset_code: String,
    pub asset_scale: u8,
}

impl Amount {
    pub fn new(value: impl Into<String>, asset_code: impl Into<String>, asset_scale: u8) -> Self {
        Self {
            value: value.into(),
            asset_code: asset_code.into(),
            asset_scale,
        }
    }
}

/// Free-form metadata attached to a payment
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaymentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PaymentMetadata {
    pub fn description(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
        }
    }
}

// ============================================================================
// Incoming payments
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingPayment {
    pub id: String,
    pub wallet_address: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub incoming_amount: Option<Amount>,
    #[serde(default)]
    pub received_amount: Option<Amount>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<PaymentMetadata>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIncomingPayment {
    pub wallet_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incoming_amount: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PaymentMetadata>,
}

// ============================================================================
// Quotes
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub id: String,
    pub wallet_address: String,
    pub receiver: String,
    pub debit_amount: Amount,
    pub receive_amount: Amount,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuote {
    pub wallet_address: String,
    pub receiver: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debit_amount: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_amount: Option<Amount>,
}

// ============================================================================
// Outgoing payments
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingPayment {
    pub id: String,
    pub wallet_address: String,
    #[serde(default)]
    pub quote_id: Option<String>,
    #[serde(default)]
    pub receiver: Option<String>,
    #[serde(default)]
    pub debit_amount: Option<Amount>,
    #[serde(default)]
    pub receive_amount: Option<Amount>,
    #[serde(default)]
    pub sent_amount: Option<Amount>,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub metadata: Option<PaymentMetadata>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOutgoingPayment {
    pub wallet_address: String,
    pub quote_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PaymentMetadata>,
}
