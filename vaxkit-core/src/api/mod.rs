//! Remote collaborators of the session subsystem: the signature verifier, the two
//! authorization registries and the authorization context of the API transport.

mod client;

use alloy_primitives::Address;
use thiserror::Error;

pub use client::ApiClient;

use crate::{challenge::WalletSignature, credential::Credential};

/// Errors talking to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Network connection error with details
    #[error("network_error: {url} {status:?}: {error}")]
    Network {
        /// The URL of the request
        url: String,
        /// HTTP status, if a response was received
        status: Option<u16>,
        /// Description of the failure
        error: String,
    },
    /// The backend answered with a non-success status.
    #[error("rejected ({status}): {reason}")]
    Rejected {
        /// HTTP status
        status: u16,
        /// Reason reported by the backend
        reason: String,
    },
    /// The response body could not be decoded.
    #[error("decode_error: {0}")]
    Decode(String),
}

/// Payload submitted to the verifier.
#[derive(Debug, Clone)]
pub struct TokenRequest<'a> {
    /// The signing account.
    pub address: Address,
    /// The challenge that was signed, verbatim.
    pub message: &'a str,
    /// The wallet's signature over `message`.
    pub signature: &'a WalletSignature,
}

/// The authorization registries an account can be enrolled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Registry {
    /// Healthcare provider registry.
    Provider,
    /// Researcher registry.
    Researcher,
}

/// The remote signature verifier.
#[allow(async_fn_in_trait)]
pub trait AuthApi {
    /// Exchanges a signed challenge for a credential.
    ///
    /// # Errors
    /// Returns `ApiError` if the verifier rejects the signature or is unreachable.
    async fn issue_token(&self, request: &TokenRequest<'_>) -> Result<String, ApiError>;

    /// Asks the backend whether `credential` is still accepted.
    ///
    /// # Errors
    /// Returns `ApiError` if the backend cannot be reached.
    async fn verify_token(&self, credential: &Credential) -> Result<bool, ApiError>;
}

/// Authorization registry lookups.
#[allow(async_fn_in_trait)]
pub trait RoleRegistry {
    /// Returns whether `account` is authorized in `registry`.
    ///
    /// `credential` is the bearer used for the lookup; it may not be installed in
    /// the transport yet.
    ///
    /// # Errors
    /// Returns `ApiError` if the lookup fails.
    async fn is_authorized(
        &self,
        registry: Registry,
        account: Address,
        credential: &Credential,
    ) -> Result<bool, ApiError>;
}

/// Global authorization context of the API transport.
///
/// Once a token is installed every outbound call carries it.
pub trait AuthorizationContext {
    /// Installs `credential` as the bearer for all subsequent calls.
    fn set_authorization_token(&self, credential: &Credential);

    /// Removes the bearer.
    fn clear_authorization_token(&self);
}
