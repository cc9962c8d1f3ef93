//! HTTP message signatures
//!
//! Grant and resource servers authenticate the client by verifying an
//! Ed25519 signature over selected request components. The signature base
//! and the `Signature-Input` header list the same components in the same
//! order: `@method`, `@target-uri`, then whichever of `authorization`,
//! `content-digest`, `content-length`, `content-type` the request carries.

use crate::error::OpenPaymentsError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ed25519_dalek::pkcs8::DecodePrivateKey;
use ed25519_dalek::{Signer, SigningKey};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH};
use reqwest::Method;
use sha2::{Digest, Sha512};
use std::path::Path;

const SIGNATURE_LABEL: &str = "sig1";

/// Signs outgoing requests with the client's Ed25519 key
#[derive(Clone)]
pub struct RequestSigner {
    key_id: String,
    key: SigningKey,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("key_id", &self.key_id)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl RequestSigner {
    pub fn new(key_id: impl Into<String>, key: SigningKey) -> Self {
        Self {
            key_id: key_id.into(),
            key,
        }
    }

    /// Load a key from a PKCS#8 PEM string
    pub fn from_pem(key_id: impl Into<String>, pem: &str) -> Result<Self, OpenPaymentsError> {
        let key = SigningKey::from_pkcs8_pem(pem.trim())
            .map_err(|e| OpenPaymentsError::Signature(format!("Invalid private key: {}", e)))?;
        Ok(Self::new(key_id, key))
    }

    /// Load a key from a file path, an inline PEM or a base64-encoded PEM
    pub fn load(key_id: impl Into<String>, source: &str) -> Result<Self, OpenPaymentsError> {
        let source = source.trim();

        if source.starts_with("-----BEGIN") {
            return Self::from_pem(key_id, source);
        }

        let path = Path::new(source);
        if path.is_file() {
            let pem = std::fs::read_to_string(path).map_err(|e| {
                OpenPaymentsError::Signature(format!(
                    "Failed to read private key {}: {}",
                    path.display(),
                    e
                ))
            })?;
            return Self::from_pem(key_id, &pem);
        }

        let decoded = STANDARD.decode(source).map_err(|_| {
            OpenPaymentsError::Signature(format!(
                "Private key is neither a file, a PEM nor base64: {}",
                source
            ))
        })?;
        let pem = String::from_utf8(decoded)
            .map_err(|e| OpenPaymentsError::Signature(format!("Invalid private key: {}", e)))?;
        Self::from_pem(key_id, &pem)
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn verifying_key(&self) -> ed25519_dalek::VerifyingKey {
        self.key.verifying_key()
    }

    /// Add `Content-Digest`, `Content-Length`, `Signature-Input` and `Signature`
    pub fn sign(
        &self,
        method: &Method,
        url: &str,
        headers: &mut HeaderMap,
        body: Option<&[u8]>,
    ) -> Result<(), OpenPaymentsError> {
        self.sign_at(method, url, headers, body, chrono::Utc::now().timestamp())
    }

    pub(crate) fn sign_at(
        &self,
        method: &Method,
        url: &str,
        headers: &mut HeaderMap,
        body: Option<&[u8]>,
        created: i64,
    ) -> Result<(), OpenPaymentsError> {
        if let Some(body) = body {
            headers.insert(
                HeaderName::from_static("content-digest"),
                header_value(&content_digest(body))?,
            );
            headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        }

        let components = covered_components(headers);
        let params = signature_params(&components, created, &self.key_id);
        let base = signature_base(method, url, headers, &components, &params)?;
        let signature = self.key.sign(base.as_bytes());

        headers.insert(
            HeaderName::from_static("signature-input"),
            header_value(&format!("{}={}", SIGNATURE_LABEL, params))?,
        );
        headers.insert(
            HeaderName::from_static("signature"),
            header_value(&format!(
                "{}=:{}:",
                SIGNATURE_LABEL,
                STANDARD.encode(signature.to_bytes())
            ))?,
        );
        Ok(())
    }
}

/// `sha-512=:<base64 digest>:`
pub fn content_digest(body: &[u8]) -> String {
    format!("sha-512=:{}:", STANDARD.encode(Sha512::digest(body)))
}

fn covered_components(headers: &HeaderMap) -> Vec<&'static str> {
    let mut components = vec!["@method", "@target-uri"];
    for name in [
        "authorization",
        "content-digest",
        "content-length",
        "content-type",
    ] {
        if headers.contains_key(name) {
            components.push(name);
        }
    }
    components
}

fn signature_params(components: &[&str], created: i64, key_id: &str) -> String {
    let list = components
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "({});created={};keyid=\"{}\";alg=\"ed25519\"",
        list, created, key_id
    )
}

pub(crate) fn signature_base(
    method: &Method,
    url: &str,
    headers: &HeaderMap,
    components: &[&str],
    params: &str,
) -> Result<String, OpenPaymentsError> {
    let mut lines = Vec::with_capacity(components.len() + 1);
    for component in components {
        let value = match *component {
            "@method" => method.as_str().to_string(),
            "@target-uri" => url.to_string(),
            name => headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    OpenPaymentsError::Signature(format!("Missing signed header: {}", name))
                })?
                .to_string(),
        };
        lines.push(format!("\"{}\": {}", component, value));
    }
    lines.push(format!("\"@signature-params\": {}", params));
    Ok(lines.join("\n"))
}

fn header_value(value: &str) -> Result<HeaderValue, OpenPaymentsError> {
    HeaderValue::from_str(value)
        .map_err(|e| OpenPaymentsError::Signature(format!("Invalid header value: {}", e)))
}
