//! Challenge Signer.
//!
//! Builds the human-readable login challenge and obtains a wallet signature over it.
//! Challenges carry a timestamp that strictly increases within the process, so two
//! challenges are never byte-identical. They are not bound to a server nonce.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use alloy_primitives::Address;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

use crate::{
    error::SessionError,
    wallet::{Eip1193Provider, WalletAdapter, WalletError},
};

/// Purpose line of the login challenge.
pub const LOGIN_PURPOSE: &str = "log in to the HBV Tracker application";

/// A freshly built message presented to the user for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    message: String,
    issued_at: DateTime<Utc>,
}

impl Challenge {
    /// Returns the full message text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.message
    }

    /// Returns the timestamp embedded in the message.
    #[must_use]
    pub const fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Signature produced by the wallet over a [`Challenge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSignature(Vec<u8>);

impl WalletSignature {
    /// Wraps raw signature bytes.
    #[must_use]
    pub const fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the `0x`-prefixed hex encoding sent to the verifier.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Builds challenges and collects signatures from the wallet.
pub struct ChallengeSigner<P> {
    wallet: Rc<WalletAdapter<P>>,
    app_name: String,
    last_issued: Cell<Option<DateTime<Utc>>>,
}

impl<P: Eip1193Provider> ChallengeSigner<P> {
    /// Creates a signer presenting challenges on behalf of `app_name`.
    pub fn new(wallet: Rc<WalletAdapter<P>>, app_name: impl Into<String>) -> Self {
        Self {
            wallet,
            app_name: app_name.into(),
            last_issued: Cell::new(None),
        }
    }

    /// Builds a challenge for `purpose`, stamped with the current time.
    pub fn build_challenge(&self, purpose: &str) -> Challenge {
        self.build_challenge_at(purpose, Utc::now())
    }

    fn build_challenge_at(&self, purpose: &str, now: DateTime<Utc>) -> Challenge {
        // Compared at the precision the message renders.
        let now = now.trunc_subsecs(3);
        let issued_at = match self.last_issued.get() {
            Some(last) if now <= last => last + chrono::Duration::milliseconds(1),
            _ => now,
        };
        self.last_issued.set(Some(issued_at));

        let message = format!(
            "Welcome to {app}!\n\n\
             By signing this message, you confirm that you want to {purpose}.\n\n\
             This signature will not trigger a blockchain transaction or cost any gas fees.\n\n\
             Timestamp: {timestamp}",
            app = self.app_name,
            timestamp = issued_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        Challenge { message, issued_at }
    }

    /// Obtains `account`'s signature over `challenge`.
    ///
    /// # Errors
    /// `SessionError::UserRejected` if the user declines the prompt,
    /// `SessionError::WalletUnavailable` without a wallet and
    /// `SessionError::SigningFailed` for any other wallet failure.
    pub async fn sign(
        &self,
        account: Address,
        challenge: &Challenge,
    ) -> Result<WalletSignature, SessionError> {
        self.wallet
            .sign_message(account, challenge.as_str())
            .await
            .map(WalletSignature::new)
            .map_err(|err| match err {
                WalletError::Unavailable => SessionError::WalletUnavailable,
                WalletError::UserRejected => SessionError::UserRejected,
                WalletError::Rpc(rpc) => SessionError::SigningFailed(rpc.message),
                WalletError::InvalidResponse(reason) => {
                    SessionError::SigningFailed(reason)
                }
            })
    }
}
