use thiserror::Error;

/// Errors surfaced by the session subsystem.
///
/// The first four abort a `login()` attempt and never mutate the session.
/// [`SessionError::RoleResolutionDegraded`] is a non-fatal notice and
/// [`SessionError::SessionInvalidated`] is raised when the session is torn down
/// because it no longer matches the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No injected wallet, or the wallet exposes no account.
    #[error("wallet_unavailable")]
    WalletUnavailable,
    /// The user declined account access or the signature prompt.
    #[error("user_rejected")]
    UserRejected,
    /// The wallet failed to sign for a reason unrelated to the user's choice.
    #[error("signing_failed: {0}")]
    SigningFailed(String),
    /// The remote verifier rejected the signature or was unreachable.
    #[error("verification_failed: {0}")]
    VerificationFailed(String),
    /// One or both authorization registries could not be queried.
    #[error("role_resolution_degraded")]
    RoleResolutionDegraded,
    /// The session no longer corresponds to the active wallet account.
    #[error("session_invalidated: {0}")]
    SessionInvalidated(String),
}

impl SessionError {
    /// Returns the message shown to the user for this error.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::WalletUnavailable => {
                "MetaMask is not installed or unlocked. Please install or unlock MetaMask to continue."
            }
            Self::UserRejected => {
                "You need to approve the request in MetaMask to log in. Please try again."
            }
            Self::SigningFailed(_) => {
                "Failed to complete login. Please make sure your MetaMask is unlocked and try again."
            }
            Self::VerificationFailed(_) => "Authentication failed. Please try again.",
            Self::RoleResolutionDegraded => {
                "Failed to verify account type. Some features may be unavailable."
            }
            Self::SessionInvalidated(_) => {
                "Your wallet account changed or was locked. Please log in again."
            }
        }
    }

    /// Returns `true` if the error aborts a login attempt.
    #[must_use]
    pub const fn is_login_failure(&self) -> bool {
        matches!(
            self,
            Self::WalletUnavailable
                | Self::UserRejected
                | Self::SigningFailed(_)
                | Self::VerificationFailed(_)
        )
    }
}

/// Errors raised while building a [`crate::SessionConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The presented input is not valid for the requested operation
    #[error("invalid_input_on_{attribute}: {reason}")]
    InvalidInput {
        /// The attribute that is invalid
        attribute: String,
        /// The reason the input is invalid
        reason: String,
    },
}
