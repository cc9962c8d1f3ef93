//! Signed HTTP client for wallet address, grant and resource servers

use crate::error::{ApiErrorResponse, OpenPaymentsError, RetryConfig};
use crate::grant::{AccessItem, AccessTokenRequest, ContinueRequest, GrantRequest, GrantResponse, InteractRequest};
use crate::resources::{
    CreateIncomingPayment, CreateOutgoingPayment, CreateQuote, IncomingPayment, OutgoingPayment,
    Quote,
};
use crate::signature::RequestSigner;
use crate::wallet_address::{JsonWebKeySet, WalletAddress};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use std::time::Duration;
use tracing::debug;

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Client
// ============================================================================

/// Client for the wallet address, authorization and resource servers
///
/// Requests that carry a token or a body are signed with the configured key.
/// Only `GET` requests are retried; creating calls are sent once.
#[derive(Clone)]
pub struct OpenPaymentsClient {
    http: reqwest::Client,
    signer: Option<RequestSigner>,
    client_wallet_address: Option<String>,
    retry_config: RetryConfig,
}

impl std::fmt::Debug for OpenPaymentsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenPaymentsClient")
            .field("client_wallet_address", &self.client_wallet_address)
            .field("signer", &self.signer)
            .field("retry_config", &self.retry_config)
            .finish()
    }
}

impl OpenPaymentsClient {
    /// Create a builder
    pub fn builder() -> OpenPaymentsClientBuilder {
        OpenPaymentsClientBuilder::new()
    }

    /// A client without keys, good for public lookups only
    pub fn unauthenticated() -> Result<Self, OpenPaymentsError> {
        Self::builder().build()
    }

    pub fn client_wallet_address(&self) -> Option<&str> {
        self.client_wallet_address.as_deref()
    }

    pub fn wallet_addresses(&self) -> WalletAddresses<'_> {
        WalletAddresses { client: self }
    }

    pub fn grants(&self) -> Grants<'_> {
        Grants { client: self }
    }

    pub fn incoming_payments(&self) -> IncomingPayments<'_> {
        IncomingPayments { client: self }
    }

    pub fn quotes(&self) -> Quotes<'_> {
        Quotes { client: self }
    }

    pub fn outgoing_payments(&self) -> OutgoingPayments<'_> {
        OutgoingPayments { client: self }
    }

    /// Send one request, retrying transient failures of `GET`s
    async fn execute<T, B>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        token: Option<&str>,
    ) -> Result<T, OpenPaymentsError>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize,
    {
        let payload = body.map(serde_json::to_vec).transpose()?;
        let max_retries = if method == Method::GET {
            self.retry_config.max_retries
        } else {
            0
        };
        let mut last_error: Option<OpenPaymentsError> = None;

        for attempt in 0..=max_retries {
            let headers = self.build_headers(&method, url, payload.as_deref(), token)?;
            let mut request = self.http.request(method.clone(), url).headers(headers);
            if let Some(payload) = &payload {
                request = request.body(payload.clone());
            }

            debug!(%method, url, attempt, "Sending request");

            let error = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<T>().await.map_err(|e| {
                            OpenPaymentsError::InvalidResponse(format!(
                                "Failed to parse response: {}",
                                e
                            ))
                        });
                    }

                    let status_code = status.as_u16();
                    let error_body = response.text().await.unwrap_or_default();
                    let error = parse_error_response(&error_body, status_code);
                    if !OpenPaymentsError::is_retryable_status(status_code) {
                        return Err(error);
                    }
                    error
                }
                Err(e) => {
                    let error = OpenPaymentsError::from_reqwest_error(e);
                    if !error.is_retryable() {
                        return Err(error);
                    }
                    error
                }
            };

            if attempt < max_retries {
                let delay = self.retry_config.delay_for_attempt(attempt);
                debug!(url, attempt, ?delay, error = %error, "Retrying request");
                tokio::time::sleep(delay).await;
            }
            last_error = Some(error);
        }

        Err(last_error
            .unwrap_or_else(|| OpenPaymentsError::Other("Max retries exceeded".to_string())))
    }

    fn build_headers(
        &self,
        method: &Method,
        url: &str,
        payload: Option<&[u8]>,
        token: Option<&str>,
    ) -> Result<HeaderMap, OpenPaymentsError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if payload.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        if let Some(token) = token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("GNAP {}", token)).map_err(|e| {
                    OpenPaymentsError::Configuration(format!("Invalid access token: {}", e))
                })?,
            );
        }

        if let Some(signer) = &self.signer {
            if token.is_some() || payload.is_some() {
                signer.sign(method, url, &mut headers, payload)?;
            }
        }

        Ok(headers)
    }
}

/// Builder for [`OpenPaymentsClient`]
pub struct OpenPaymentsClientBuilder {
    signer: Option<RequestSigner>,
    private_key: Option<(String, String)>,
    client_wallet_address: Option<String>,
    timeout: Option<Duration>,
    retry_config: Option<RetryConfig>,
}

impl OpenPaymentsClientBuilder {
    fn new() -> Self {
        Self {
            signer: None,
            private_key: None,
            client_wallet_address: None,
            timeout: None,
            retry_config: None,
        }
    }

    /// Sign requests with an already loaded key
    pub fn signer(mut self, signer: RequestSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Sign requests with the key found at `source` (see [`RequestSigner::load`])
    pub fn private_key(mut self, key_id: impl Into<String>, source: impl Into<String>) -> Self {
        self.private_key = Some((key_id.into(), source.into()));
        self
    }

    /// Wallet address identifying this client to authorization servers
    pub fn client_wallet_address(mut self, url: impl Into<String>) -> Self {
        self.client_wallet_address = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the maximum number of retries for `GET`s (default: 2)
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        let mut config = self.retry_config.take().unwrap_or_default();
        config.max_retries = max_retries;
        self.retry_config = Some(config);
        self
    }

    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = Some(config);
        self
    }

    pub fn build(self) -> Result<OpenPaymentsClient, OpenPaymentsError> {
        let signer = match (self.signer, self.private_key) {
            (Some(signer), _) => Some(signer),
            (None, Some((key_id, source))) => Some(RequestSigner::load(key_id, &source)?),
            (None, None) => None,
        };

        let http = reqwest::Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| {
                OpenPaymentsError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(OpenPaymentsClient {
            http,
            signer,
            client_wallet_address: self.client_wallet_address,
            retry_config: self.retry_config.unwrap_or_default(),
        })
    }
}

// ============================================================================
// Wallet addresses
// ============================================================================

pub struct WalletAddresses<'a> {
    client: &'a OpenPaymentsClient,
}

impl<'a> WalletAddresses<'a> {
    /// Resolve a wallet address document
    pub async fn get(&self, url: &str) -> Result<WalletAddress, OpenPaymentsError> {
        self.client
            .execute::<WalletAddress, ()>(Method::GET, url, None, None)
            .await
    }

    /// Fetch the keys registered for a wallet address
    pub async fn keys(&self, url: &str) -> Result<JsonWebKeySet, OpenPaymentsError> {
        let url = format!("{}/jwks.json", url.trim_end_matches('/'));
        self.client
            .execute::<JsonWebKeySet, ()>(Method::GET, &url, None, None)
            .await
    }
}

// ============================================================================
// Grants
// ============================================================================

pub struct Grants<'a> {
    client: &'a OpenPaymentsClient,
}

impl<'a> Grants<'a> {
    /// Request a grant from the authorization server at `auth_server`
    ///
    /// Without `interact` the server either approves the grant immediately or
    /// rejects it; with `interact` it usually answers with a continuation
    /// handle and a redirect for the human.
    pub async fn request(
        &self,
        auth_server: &str,
        access: Vec<AccessItem>,
        interact: Option<InteractRequest>,
    ) -> Result<GrantResponse, OpenPaymentsError> {
        let client = self.client.client_wallet_address.clone().ok_or_else(|| {
            OpenPaymentsError::Configuration(
                "A client wallet address is required to request grants".to_string(),
            )
        })?;

        let body = GrantRequest {
            access_token: AccessTokenRequest { access },
            client,
            interact,
        };

        self.client
            .execute(Method::POST, auth_server, Some(&body), None)
            .await
    }

    /// Continue a pending grant
    pub async fn continue_grant(
        &self,
        continue_uri: &str,
        continue_token: &str,
        interact_ref: Option<&str>,
    ) -> Result<GrantResponse, OpenPaymentsError> {
        let body = ContinueRequest {
            interact_ref: interact_ref.map(str::to_string),
        };

        self.client
            .execute(Method::POST, continue_uri, Some(&body), Some(continue_token))
            .await
    }
}

// ============================================================================
// Resources
// ============================================================================

fn collection_url(origin: &str, collection: &str) -> String {
    format!("{}/{}", origin.trim_end_matches('/'), collection)
}

pub struct IncomingPayments<'a> {
    client: &'a OpenPaymentsClient,
}

impl<'a> IncomingPayments<'a> {
    pub async fn create(
        &self,
        origin: &str,
        token: &str,
        params: &CreateIncomingPayment,
    ) -> Result<IncomingPayment, OpenPaymentsError> {
        let url = collection_url(origin, "incoming-payments");
        self.client
            .execute(Method::POST, &url, Some(params), Some(token))
            .await
    }

    pub async fn get(&self, url: &str, token: &str) -> Result<IncomingPayment, OpenPaymentsError> {
        self.client
            .execute::<IncomingPayment, ()>(Method::GET, url, None, Some(token))
            .await
    }

    /// Mark an incoming payment as complete; it accepts no further funds
    pub async fn complete(
        &self,
        url: &str,
        token: &str,
    ) -> Result<IncomingPayment, OpenPaymentsError> {
        let url = format!("{}/complete", url.trim_end_matches('/'));
        self.client
            .execute::<IncomingPayment, ()>(Method::POST, &url, None, Some(token))
            .await
    }
}

pub struct Quotes<'a> {
    client: &'a OpenPaymentsClient,
}

impl<'a> Quotes<'a> {
    pub async fn create(
        &self,
        origin: &str,
        token: &str,
        params: &CreateQuote,
    ) -> Result<Quote, OpenPaymentsError> {
        let url = collection_url(origin, "quotes");
        self.client
            .execute(Method::POST, &url, Some(params), Some(token))
            .await
    }

    pub async fn get(&self, url: &str, token: &str) -> Result<Quote, OpenPaymentsError> {
        self.client
            .execute::<Quote, ()>(Method::GET, url, None, Some(token))
            .await
    }
}

pub struct OutgoingPayments<'a> {
    client: &'a OpenPaymentsClient,
}

impl<'a> OutgoingPayments<'a> {
    pub async fn create(
        &self,
        origin: &str,
        token: &str,
        params: &CreateOutgoingPayment,
    ) -> Result<OutgoingPayment, OpenPaymentsError> {
        let url = collection_url(origin, "outgoing-payments");
        self.client
            .execute(Method::POST, &url, Some(params), Some(token))
            .await
    }

    pub async fn get(&self, url: &str, token: &str) -> Result<OutgoingPayment, OpenPaymentsError> {
        self.client
            .execute::<OutgoingPayment, ()>(Method::GET, url, None, Some(token))
            .await
    }
}

// ============================================================================
// Shared Helpers
// ============================================================================

fn parse_error_response(body: &str, status_code: u16) -> OpenPaymentsError {
    if let Ok(error_response) = serde_json::from_str::<ApiErrorResponse>(body) {
        return OpenPaymentsError::from_api_error(&error_response.error, status_code);
    }

    let msg = if body.is_empty() {
        format!("HTTP {}", status_code)
    } else {
        body.to_string()
    };

    OpenPaymentsError::from_status(status_code, msg)
}
