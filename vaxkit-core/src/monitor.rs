//! Consistency Monitor: keeps the session aligned with the wallet's live account.

use std::rc::Rc;

use alloy_primitives::Address;

use crate::{
    api::{AuthApi, RoleRegistry},
    credential::Credential,
    error::SessionError,
    role::RoleResolver,
    session::{ActiveSession, AttemptGuard, SessionStore},
    wallet::{Eip1193Provider, Subscription, WalletAdapter},
};

/// Reconciles the wallet's account state with the session on start and on every
/// account-change notification.
///
/// The monitor only ever tears a session down or restores a persisted one; it
/// never starts a new authentication.
pub struct ConsistencyMonitor<P, A> {
    wallet: Rc<WalletAdapter<P>>,
    api: Rc<A>,
    roles: RoleResolver<A>,
    store: Rc<SessionStore>,
    verify_on_restore: bool,
}

impl<P, A> ConsistencyMonitor<P, A>
where
    P: Eip1193Provider,
    A: AuthApi + RoleRegistry,
{
    /// Creates a monitor for `store`.
    ///
    /// With `verify_on_restore` a persisted credential is confirmed with the backend
    /// before it is restored.
    pub fn new(
        wallet: Rc<WalletAdapter<P>>,
        api: Rc<A>,
        store: Rc<SessionStore>,
        verify_on_restore: bool,
    ) -> Self {
        Self {
            roles: RoleResolver::new(Rc::clone(&api)),
            wallet,
            api,
            store,
            verify_on_restore,
        }
    }

    /// Restores a persisted session if it still matches the wallet.
    ///
    /// Without a persisted credential the store is cleared. A credential that is
    /// malformed, expired, rejected by the backend or issued for an account other
    /// than the wallet's active one is discarded.
    ///
    /// A login or logout that writes the store while the restore is suspended
    /// wins: the restore then neither installs nor invalidates anything.
    pub async fn start(&self) {
        let guard = self.store.begin_attempt();
        let Some(token) = self.store.persisted_token() else {
            log::debug!("no persisted credential");
            self.store.clear();
            return;
        };

        match self.restore(guard, &token).await {
            Ok(session) => log::info!("restored session for {}", session.account()),
            Err(reason) => {
                self.store.invalidate_unless_written(guard, &reason);
            }
        }
    }

    /// Reacts to an account-change notification.
    ///
    /// An empty list means the wallet was locked or disconnected. A session whose
    /// subject differs from the first listed account is invalidated.
    pub fn handle_accounts_changed(&self, accounts: &[Address]) {
        let active = accounts.first().copied();
        self.store.observe_wallet(active);

        let Some(session) = self.store.state().session else {
            return;
        };
        match active {
            None => self.store.invalidate("wallet locked or disconnected"),
            Some(account) if account != session.account() => self
                .store
                .invalidate(&format!("wallet switched to {account}")),
            Some(account) => log::debug!("wallet still on {account}"),
        }
    }

    async fn restore(&self, guard: AttemptGuard, token: &str) -> Result<ActiveSession, String> {
        let credential = Credential::parse(token)
            .map_err(|err| format!("stored credential unusable: {err}"))?;
        if credential.claims().is_expired() {
            return Err("stored credential expired".to_string());
        }

        let active = self.wallet.list_accounts().await.first().copied();
        self.store.observe_wallet(active);
        match active {
            None => return Err("wallet has no connected account".to_string()),
            Some(account) if account != credential.subject() => {
                return Err(format!(
                    "wallet account {account} does not match session {}",
                    credential.subject()
                ));
            }
            Some(_) => {}
        }

        if self.verify_on_restore {
            match self.api.verify_token(&credential).await {
                Ok(true) => {}
                Ok(false) => return Err("stored credential rejected by backend".to_string()),
                Err(err) => return Err(format!("could not verify stored credential: {err}")),
            }
        }

        let resolution = self.roles.resolve(credential.subject(), &credential).await;
        self.store
            .commit_restored(guard, credential, resolution)
            .map_err(|err| match err {
                SessionError::SessionInvalidated(reason) => reason,
                other => other.to_string(),
            })
    }
}

impl<P, A> ConsistencyMonitor<P, A>
where
    P: Eip1193Provider + 'static,
    A: AuthApi + RoleRegistry + 'static,
{
    /// Subscribes the monitor to the wallet's account-change events.
    ///
    /// The subscription holds a weak reference: once the monitor is dropped,
    /// notifications are ignored.
    pub fn attach(self: &Rc<Self>) -> Subscription {
        let monitor = Rc::downgrade(self);
        self.wallet.on_accounts_changed(move |accounts| {
            if let Some(monitor) = monitor.upgrade() {
                monitor.handle_accounts_changed(&accounts);
            }
        })
    }
}
