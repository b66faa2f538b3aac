//! OAuth 2.1 boundary for the HTTP client transports.
//!
//! Only the interface matters here: a [`TokenSource`] the transports can
//! consult for an `Authorization` header, and the S256 PKCE pair an
//! authorization flow needs. The browser dance itself lives outside this
//! crate.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::core::error::McpResult;

/// Supplies bearer tokens to HTTP transports.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// The current access token, refreshed by the implementation as needed.
    async fn access_token(&self) -> McpResult<String>;
}

/// A token source wrapping a fixed token, for servers behind static keys.
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn access_token(&self) -> McpResult<String> {
        Ok(self.token.clone())
    }
}

/// A PKCE verifier/challenge pair (RFC 7636, S256 method). PKCE is
/// mandatory in OAuth 2.1, so the plain method is not offered.
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    /// Generate a fresh pair: a 64-character verifier from the unreserved
    /// alphabet and its base64url-encoded SHA-256 challenge.
    pub fn generate() -> Self {
        const ALPHABET: &[u8] =
            b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";
        let mut rng = rand::thread_rng();
        let verifier: String = (0..64)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        let challenge = Self::challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    fn challenge_for(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }

    /// The `code_challenge_method` value to send alongside the challenge.
    pub fn method(&self) -> &'static str {
        "S256"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_uses_unreserved_characters() {
        let pair = PkcePair::generate();
        assert_eq!(pair.verifier.len(), 64);
        assert!(pair
            .verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-._~".contains(c)));
    }

    #[test]
    fn challenge_is_deterministic_for_a_verifier() {
        let challenge = PkcePair::challenge_for("abc");
        assert_eq!(challenge, PkcePair::challenge_for("abc"));
        assert_ne!(challenge, PkcePair::challenge_for("abd"));
        assert!(!challenge.contains('='));
    }

    #[tokio::test]
    async fn static_source_returns_its_token() {
        let source = StaticTokenSource::new("sekrit");
        assert_eq!(source.access_token().await.unwrap(), "sekrit");
    }
}
