//! Bearer credentials issued by the backend verifier and their identity claims.
//!
//! The client never validates the token signature; that is the backend's job. It
//! only decodes the payload to learn which account the backend attests to and when
//! the credential expires.

use alloy_primitives::Address;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::primitives::ParseFromForeignBinding;

/// Errors decoding a credential.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// The token is not a three-part compact JWT.
    #[error("malformed token: {0}")]
    Malformed(String),
    /// The payload could not be decoded into claims.
    #[error("invalid claims: {0}")]
    InvalidClaims(String),
}

/// Identity claim embedded in a [`Credential`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityClaim {
    /// The account the backend attests produced the login signature.
    pub subject: Address,
    /// Issued-at, seconds since the Unix epoch.
    pub issued_at: u64,
    /// Expiry, seconds since the Unix epoch.
    pub expires_at: u64,
    /// Registry contract the backend bound the token to, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
}

impl IdentityClaim {
    /// Returns `true` once `now` (seconds since epoch) has reached the expiry.
    #[must_use]
    pub const fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    /// Returns `true` if the claim is expired according to the system clock.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.is_expired_at(u64::try_from(now).unwrap_or_default())
    }
}

#[derive(Deserialize)]
struct RawClaims {
    sub: String,
    #[serde(default)]
    iat: Option<u64>,
    exp: u64,
    #[serde(default)]
    contract: Option<String>,
}

/// A bearer token together with its decoded [`IdentityClaim`].
///
/// A `Credential` can only be built by decoding its claim, so a credential without
/// a claim is not representable. The raw token is kept in a [`SecretString`] and
/// is redacted from `Debug` output.
pub struct Credential {
    token: SecretString,
    claims: IdentityClaim,
}

impl Credential {
    /// Decodes `token` and its identity claim.
    ///
    /// # Errors
    /// Returns `CredentialError` if the token is not a compact JWT or its payload
    /// does not carry a valid subject address and expiry.
    pub fn parse(token: &str) -> Result<Self, CredentialError> {
        let token = token.trim();
        let mut parts = token.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CredentialError::Malformed(
                "expected three dot-separated segments".to_string(),
            ));
        };

        let payload = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| CredentialError::Malformed(format!("payload encoding: {e}")))?;
        let raw: RawClaims = serde_json::from_slice(&payload)
            .map_err(|e| CredentialError::InvalidClaims(e.to_string()))?;
        let subject = Address::parse_from_foreign(&raw.sub, "sub")
            .map_err(|e| CredentialError::InvalidClaims(e.to_string()))?;

        Ok(Self {
            token: SecretString::from(token.to_string()),
            claims: IdentityClaim {
                subject,
                issued_at: raw.iat.unwrap_or_default(),
                expires_at: raw.exp,
                contract: raw.contract,
            },
        })
    }

    /// Returns the decoded identity claim.
    #[must_use]
    pub const fn claims(&self) -> &IdentityClaim {
        &self.claims
    }

    /// Returns the account the credential was issued to.
    #[must_use]
    pub const fn subject(&self) -> Address {
        self.claims.subject
    }

    /// Exposes the raw bearer token.
    #[must_use]
    pub fn expose_token(&self) -> &str {
        self.token.expose_secret()
    }
}

impl Clone for Credential {
    fn clone(&self) -> Self {
        Self {
            token: SecretString::from(self.token.expose_secret().to_string()),
            claims: self.claims.clone(),
        }
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.claims == other.claims
            && self.token.expose_secret() == other.token.expose_secret()
    }
}

impl Eq for Credential {}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("claims", &self.claims)
            .finish()
    }
}

/// Encodes an unsigned compact JWT carrying `claims`.
///
/// Only useful for tests and local tooling: the signature segment is a placeholder.
#[must_use]
pub fn encode_unsigned_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.unsigned")
}
