//! Wallet address documents and key sets

use serde::{Deserialize, Serialize};

/// A resolved wallet address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAddress {
    pub id: String,
    pub auth_server: String,
    #[serde(default)]
    pub resource_server: Option<String>,
    pub asset_code: String,
    pub asset_scale: u8,
    #[serde(default)]
    pub public_name: Option<String>,
}

impl WalletAddress {
    /// Scheme, host and port of the wallet address id
    ///
    /// Resources for a wallet address are created at this origin.
    pub fn origin(&self) -> Result<String, url::ParseError> {
        let url = url::Url::parse(&self.id)?;
        Ok(url.origin().ascii_serialization())
    }
}

/// A public key registered for a client wallet address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    pub kid: String,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default)]
    pub kty: Option<String>,
    #[serde(default)]
    pub crv: Option<String>,
    #[serde(default)]
    pub x: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    #[serde(default)]
    pub keys: Vec<JsonWebKey>,
}

/// Normalize user input into a wallet address URL
///
/// Payment pointers (`$wallet.example/alice`) become
/// `https://wallet.example/alice`. Returns `None` for empty input or input
/// that is not a URL.
pub fn parse_wallet_address(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let candidate = match input.strip_prefix('$') {
        Some(rest) => format!("https://{}", rest),
        None => input.to_string(),
    };

    url::Url::parse(&candidate).ok().map(|_| candidate)
}
