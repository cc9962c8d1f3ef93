//! Common test utilities shared across test files.
//!
//! A wiremock server plays wallet address, authorization and resource server
//! for two accounts: alice (sending, USD) and bob (receiving, EUR).
#![allow(dead_code)]

use ed25519_dalek::SigningKey;
use paygrant_sdk::{OpenPaymentsClient, RequestSigner, RetryConfig};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub struct OpenPaymentsServer {
    pub server: MockServer,
}

impl OpenPaymentsServer {
    /// Start a server with both wallet address documents mounted
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let this = Self { server };
        this.mount_wallet("alice", "USD").await;
        this.mount_wallet("bob", "EUR").await;
        this
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.server.uri(), path)
    }

    pub fn alice(&self) -> String {
        self.url("/alice")
    }

    pub fn bob(&self) -> String {
        self.url("/bob")
    }

    /// Client signing with a fixed key, retries off
    pub fn client(&self) -> OpenPaymentsClient {
        OpenPaymentsClient::builder()
            .signer(RequestSigner::new(
                "test-key",
                SigningKey::from_bytes(&[7u8; 32]),
            ))
            .client_wallet_address(self.url("/client"))
            .retry_config(RetryConfig::disabled())
            .build()
            .unwrap()
    }

    async fn mount_wallet(&self, name: &str, asset_code: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/{}", name)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": self.url(&format!("/{}", name)),
                "authServer": self.url(&format!("/auth/{}", name)),
                "resourceServer": self.server.uri(),
                "assetCode": asset_code,
                "assetScale": 2
            })))
            .mount(&self.server)
            .await;
    }

    /// Approve every incoming-payment grant at bob's auth server
    pub async fn approve_incoming_payment_grants(&self, token: &str) {
        Mock::given(method("POST"))
            .and(path("/auth/bob"))
            .and(body_contains(r#""type":"incoming-payment""#))
            .respond_with(approved(token))
            .mount(&self.server)
            .await;
    }

    /// Approve every quote grant at alice's auth server
    pub async fn approve_quote_grants(&self, token: &str) {
        Mock::given(method("POST"))
            .and(path("/auth/alice"))
            .and(body_contains(r#""type":"quote""#))
            .respond_with(approved(token))
            .mount(&self.server)
            .await;
    }

    /// Answer outgoing-payment grants with a continuation at `/continue/op`
    pub async fn pend_outgoing_payment_grants(&self, wait_secs: u64) {
        Mock::given(method("POST"))
            .and(path("/auth/alice"))
            .and(body_contains(r#""type":"outgoing-payment""#))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "interact": {
                    "redirect": self.url("/interact/op"),
                    "finish": "finish-nonce"
                },
                "continue": {
                    "access_token": { "value": "continue-token" },
                    "uri": self.url("/continue/op"),
                    "wait": wait_secs
                }
            })))
            .mount(&self.server)
            .await;
    }

    /// Continuation answer that leaves the grant pending
    pub fn still_pending(&self) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "continue": {
                "access_token": { "value": "continue-token" },
                "uri": self.url("/continue/op")
            }
        }))
    }

    pub fn amount(value: &str, asset_code: &str) -> Value {
        json!({ "value": value, "assetCode": asset_code, "assetScale": 2 })
    }
}

pub fn approved(token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": { "value": token }
    }))
}

/// Matches requests whose body contains `needle`
pub fn body_contains(needle: &'static str) -> impl Fn(&Request) -> bool + Send + Sync {
    move |request: &Request| String::from_utf8_lossy(&request.body).contains(needle)
}
