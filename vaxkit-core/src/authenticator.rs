//! Authenticator: the `login()` state machine.

use std::rc::Rc;

use tokio::sync::watch;

use crate::{
    api::{AuthApi, RoleRegistry, TokenRequest},
    challenge::{ChallengeSigner, LOGIN_PURPOSE},
    credential::Credential,
    error::SessionError,
    role::RoleResolver,
    session::{ActiveSession, AttemptGuard, SessionStore},
    wallet::{Eip1193Provider, WalletAdapter, WalletError},
};

/// Progress of the current login attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoginPhase {
    /// No attempt in progress.
    #[default]
    Idle,
    /// Waiting for the user to grant account access.
    AccountRequested,
    /// Waiting for the user to sign the challenge.
    Signing,
    /// Exchanging the signature for a credential and resolving the role.
    Verifying,
    /// The last attempt established a session.
    Authenticated,
    /// The last attempt failed.
    Failed(SessionError),
}

impl LoginPhase {
    /// Returns `true` while an attempt is suspended on the wallet or the backend.
    #[must_use]
    pub const fn is_in_progress(&self) -> bool {
        matches!(
            self,
            Self::AccountRequested | Self::Signing | Self::Verifying
        )
    }
}

/// Exchanges a wallet signature for a verified, role-scoped session.
pub struct Authenticator<P, A> {
    wallet: Rc<WalletAdapter<P>>,
    signer: ChallengeSigner<P>,
    api: Rc<A>,
    roles: RoleResolver<A>,
    store: Rc<SessionStore>,
    phase: watch::Sender<LoginPhase>,
}

impl<P, A> Authenticator<P, A>
where
    P: Eip1193Provider,
    A: AuthApi + RoleRegistry,
{
    /// Creates an authenticator writing into `store`.
    pub fn new(
        wallet: Rc<WalletAdapter<P>>,
        api: Rc<A>,
        store: Rc<SessionStore>,
        app_name: &str,
    ) -> Self {
        let (phase, _) = watch::channel(LoginPhase::Idle);
        Self {
            signer: ChallengeSigner::new(Rc::clone(&wallet), app_name),
            roles: RoleResolver::new(Rc::clone(&api)),
            wallet,
            api,
            store,
            phase,
        }
    }

    /// Returns the current login phase.
    #[must_use]
    pub fn phase(&self) -> LoginPhase {
        self.phase.borrow().clone()
    }

    /// Subscribes to login phase changes.
    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<LoginPhase> {
        self.phase.subscribe()
    }

    /// Runs one login attempt.
    ///
    /// Requests account access, signs a fresh challenge, exchanges the signature
    /// for a credential, resolves the role and commits the session. There is no
    /// automatic retry.
    ///
    /// # Errors
    /// Returns the [`SessionError`] that aborted the attempt. The error is also
    /// recorded as the store's `last_error`; an existing session is left as is.
    pub async fn login(&self) -> Result<ActiveSession, SessionError> {
        let guard = self.store.begin_attempt();
        match self.attempt(guard).await {
            Ok(session) => {
                self.phase.send_replace(LoginPhase::Authenticated);
                Ok(session)
            }
            Err(err) => {
                log::warn!("login failed: {err}");
                self.store.record_error(err.clone());
                let phase = match err {
                    SessionError::UserRejected => LoginPhase::Idle,
                    ref other => LoginPhase::Failed(other.clone()),
                };
                self.phase.send_replace(phase);
                Err(err)
            }
        }
    }

    /// Ends the session.
    ///
    /// Clears the store, resets the phase and then asks the wallet to revoke the
    /// application's account permission. Calling it without a session is a no-op
    /// apart from the revocation request.
    pub async fn logout(&self) {
        self.store.logout();
        self.phase.send_replace(LoginPhase::Idle);

        if !self.wallet.is_available() {
            return;
        }
        if let Err(err) = self.wallet.revoke_permissions().await {
            log::warn!("failed to revoke wallet permissions: {err}");
        }
    }

    async fn attempt(&self, guard: AttemptGuard) -> Result<ActiveSession, SessionError> {
        self.phase.send_replace(LoginPhase::AccountRequested);
        let accounts = self
            .wallet
            .request_accounts()
            .await
            .map_err(|err| match err {
                WalletError::UserRejected => SessionError::UserRejected,
                other => {
                    log::debug!("account request failed: {other}");
                    SessionError::WalletUnavailable
                }
            })?;
        let account = accounts
            .first()
            .copied()
            .ok_or(SessionError::WalletUnavailable)?;

        self.phase.send_replace(LoginPhase::Signing);
        let challenge = self.signer.build_challenge(LOGIN_PURPOSE);
        let signature = self.signer.sign(account, &challenge).await?;

        self.phase.send_replace(LoginPhase::Verifying);
        let token = self
            .api
            .issue_token(&TokenRequest {
                address: account,
                message: challenge.as_str(),
                signature: &signature,
            })
            .await
            .map_err(|err| SessionError::VerificationFailed(err.to_string()))?;
        let credential = Credential::parse(&token)
            .map_err(|err| SessionError::VerificationFailed(err.to_string()))?;
        if credential.subject() != account {
            return Err(SessionError::VerificationFailed(format!(
                "credential issued for {} while {account} signed",
                credential.subject()
            )));
        }

        let resolution = self.roles.resolve(account, &credential).await;
        self.store.commit(guard, credential, resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_progress_phases() {
        assert!(!LoginPhase::Idle.is_in_progress());
        assert!(LoginPhase::Signing.is_in_progress());
        assert!(LoginPhase::Verifying.is_in_progress());
        assert!(!LoginPhase::Failed(SessionError::WalletUnavailable).is_in_progress());
        assert_eq!(LoginPhase::default(), LoginPhase::Idle);
    }
}
