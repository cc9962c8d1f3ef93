//! Minimal Open Payments client for paygrant
//!
//! This crate talks to the three kinds of servers involved in a payment:
//! wallet address servers (public account descriptors and client keys),
//! authorization servers (grant requests and continuations) and resource
//! servers (incoming payments, quotes, outgoing payments). Requests that carry
//! a token or a body are signed with HTTP message signatures.
//!
//! # Quick Start
//!
//! ```no_run
//! use paygrant_sdk::{AccessAction, AccessItem, AccessType, OpenPaymentsClient};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OpenPaymentsClient::builder()
//!     .client_wallet_address("https://ilp.example/client")
//!     .private_key("my-key-id", "private-key.pem")
//!     .build()?;
//!
//! let alice = client.wallet_addresses().get("https://ilp.example/alice").await?;
//!
//! let grant = client
//!     .grants()
//!     .request(
//!         &alice.auth_server,
//!         vec![AccessItem::new(
//!             AccessType::Quote,
//!             [AccessAction::Read, AccessAction::Create],
//!         )],
//!         None,
//!     )
//!     .await?;
//! println!("approved: {}", grant.is_approved());
//! # Ok(())
//! # }
//! ```
//!
//! # Retry Configuration
//!
//! Only reads are retried. Creating calls and grant continuations are sent
//! exactly once.
//!
//! ```
//! use paygrant_sdk::{OpenPaymentsClient, RetryConfig};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OpenPaymentsClient::builder()
//!     .max_retries(5)
//!     .build()?;
//!
//! let client = OpenPaymentsClient::builder()
//!     .retry_config(RetryConfig {
//!         max_retries: 3,
//!         base_delay: Duration::from_millis(250),
//!         max_delay: Duration::from_secs(4),
//!         jitter: 0.25,
//!     })
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
pub mod grant;
pub mod resources;
pub mod signature;
pub mod wallet_address;

// Client types
pub use client::{
    Grants, IncomingPayments, OpenPaymentsClient, OpenPaymentsClientBuilder, OutgoingPayments,
    Quotes, WalletAddresses,
};

// Error types
pub use error::{ApiError, ApiErrorResponse, OpenPaymentsError, RetryConfig};

// Grants
pub use grant::{
    AccessAction, AccessItem, AccessToken, AccessType, Continue, GrantResponse, InteractRequest,
    InteractResponse, Limits,
};

// Resources
pub use resources::{
    Amount, CreateIncomingPayment, CreateOutgoingPayment, CreateQuote, IncomingPayment,
    OutgoingPayment, PaymentMetadata, Quote,
};

// Signing and wallet addresses
pub use signature::RequestSigner;
pub use wallet_address::{parse_wallet_address, JsonWebKey, JsonWebKeySet, WalletAddress};
