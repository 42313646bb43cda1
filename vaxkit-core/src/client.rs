//! Session Client: the facade handed to presentation layers.

use std::cell::RefCell;
use std::rc::Rc;

use tokio::sync::watch;

use crate::{
    api::{AuthApi, AuthorizationContext, RoleRegistry},
    authenticator::{Authenticator, LoginPhase},
    config::SessionConfig,
    error::SessionError,
    monitor::ConsistencyMonitor,
    session::{ActiveSession, SessionState, SessionStore},
    storage::DurableStorage,
    wallet::{Eip1193Provider, Subscription, WalletAdapter},
};

/// Wallet-backed session of the HBV Tracker client.
///
/// Wires the Authenticator, the Consistency Monitor and the Session Store around
/// one wallet and one backend. Presentation layers read [`SessionState`] through
/// [`SessionClient::state`] or [`SessionClient::subscribe`] and drive it with
/// [`SessionClient::login`] and [`SessionClient::logout`].
pub struct SessionClient<P, A> {
    store: Rc<SessionStore>,
    authenticator: Authenticator<P, A>,
    monitor: Rc<ConsistencyMonitor<P, A>>,
    account_subscription: RefCell<Option<Subscription>>,
}

impl<P, A> SessionClient<P, A>
where
    P: Eip1193Provider + 'static,
    A: AuthApi + RoleRegistry + AuthorizationContext + 'static,
{
    /// Creates a client. Nothing is read or subscribed until [`SessionClient::start`].
    pub fn new(
        config: &SessionConfig,
        wallet: WalletAdapter<P>,
        api: Rc<A>,
        storage: Rc<dyn DurableStorage>,
    ) -> Self {
        let wallet = Rc::new(wallet);
        let authorization: Rc<dyn AuthorizationContext> = api.clone();
        let store = Rc::new(SessionStore::new(
            storage,
            authorization,
            config.storage_key.clone(),
        ));
        let authenticator = Authenticator::new(
            Rc::clone(&wallet),
            Rc::clone(&api),
            Rc::clone(&store),
            &config.app_name,
        );
        let monitor = Rc::new(ConsistencyMonitor::new(
            wallet,
            api,
            Rc::clone(&store),
            config.verify_on_restore,
        ));
        Self {
            store,
            authenticator,
            monitor,
            account_subscription: RefCell::new(None),
        }
    }

    /// Subscribes to wallet account changes and restores a persisted session.
    ///
    /// Calling it again re-runs the restore but keeps the existing subscription.
    pub async fn start(&self) {
        {
            let mut subscription = self.account_subscription.borrow_mut();
            if subscription.is_none() {
                *subscription = Some(self.monitor.attach());
            }
        }
        self.monitor.start().await;
    }

    /// Stops reacting to wallet account changes.
    pub fn detach(&self) {
        if let Some(subscription) = self.account_subscription.borrow_mut().take() {
            subscription.unsubscribe();
        }
    }

    /// Returns whether the client currently follows wallet account changes.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.account_subscription.borrow().is_some()
    }

    /// Authenticates with the wallet's account.
    ///
    /// # Errors
    /// See [`Authenticator::login`].
    pub async fn login(&self) -> Result<ActiveSession, SessionError> {
        self.authenticator.login().await
    }

    /// Ends the session. Idempotent.
    pub async fn logout(&self) {
        self.authenticator.logout().await;
    }

    /// Returns a snapshot of the session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.store.state()
    }

    /// Subscribes to session state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.store.subscribe()
    }

    /// Returns the phase of the current or last login attempt.
    #[must_use]
    pub fn login_phase(&self) -> LoginPhase {
        self.authenticator.phase()
    }

    /// Subscribes to login phase changes.
    #[must_use]
    pub fn subscribe_login_phase(&self) -> watch::Receiver<LoginPhase> {
        self.authenticator.subscribe_phase()
    }
}
