use std::cell::Cell;
use std::rc::Rc;

use alloy_primitives::Address;
use tokio::sync::watch;

use super::{ActiveSession, SessionState};
use crate::{
    api::AuthorizationContext,
    credential::Credential,
    error::SessionError,
    role::{Role, RoleResolution},
    storage::DurableStorage,
};

/// Captures the wallet epoch and the store's write generation when an
/// authentication attempt starts.
///
/// Passed back to [`SessionStore::commit`], which refuses the write if the wallet
/// moved to another account (or was locked, or the user logged out) in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct AttemptGuard {
    epoch: u64,
    generation: u64,
}

/// Single source of truth for the session.
///
/// Every mutation below is one synchronous step: the state is published with a
/// single `watch` send and no method suspends, so subscribers never observe a half
/// applied transition.
pub struct SessionStore {
    storage: Rc<dyn DurableStorage>,
    authorization: Rc<dyn AuthorizationContext>,
    storage_key: String,
    state: watch::Sender<SessionState>,
    wallet_epoch: Cell<u64>,
    wallet_account: Cell<Option<Address>>,
    generation: Cell<u64>,
}

impl SessionStore {
    /// Creates an empty store persisting the credential under `storage_key`.
    pub fn new(
        storage: Rc<dyn DurableStorage>,
        authorization: Rc<dyn AuthorizationContext>,
        storage_key: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            storage,
            authorization,
            storage_key: storage_key.into(),
            state,
            wallet_epoch: Cell::new(0),
            wallet_account: Cell::new(None),
            generation: Cell::new(0),
        }
    }

    /// Returns a snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Reads the persisted raw credential, if any.
    #[must_use]
    pub fn persisted_token(&self) -> Option<String> {
        match self.storage.get(&self.storage_key) {
            Ok(token) => token.filter(|token| !token.is_empty()),
            Err(err) => {
                log::warn!("failed to read persisted credential: {err}");
                None
            }
        }
    }

    /// Starts an authentication attempt.
    pub fn begin_attempt(&self) -> AttemptGuard {
        AttemptGuard {
            epoch: self.wallet_epoch.get(),
            generation: self.generation.get(),
        }
    }

    /// Records the wallet's active account (`None` when locked or disconnected).
    pub fn observe_wallet(&self, account: Option<Address>) {
        self.wallet_epoch.set(self.wallet_epoch.get().wrapping_add(1));
        self.wallet_account.set(account);
    }

    /// Returns the last account reported by the wallet.
    #[must_use]
    pub fn observed_account(&self) -> Option<Address> {
        self.wallet_account.get()
    }

    /// Installs `credential` with the resolved role.
    ///
    /// Installs the authorization token first, persists the raw credential and then
    /// publishes the new state. A storage failure is logged; the session is still
    /// established for the lifetime of the process.
    pub fn set(&self, credential: Credential, resolution: RoleResolution) -> ActiveSession {
        self.authorization.set_authorization_token(&credential);
        if let Err(err) = self
            .storage
            .set(&self.storage_key, credential.expose_token())
        {
            log::warn!("failed to persist credential: {err}");
        }

        self.bump_generation();
        let session = ActiveSession::new(credential, resolution.role);
        let last_error = resolution
            .degraded
            .then_some(SessionError::RoleResolutionDegraded);
        self.state.send_replace(SessionState {
            session: Some(session.clone()),
            last_error,
        });
        log::info!(
            "session established for {} as {}",
            session.account(),
            session.role()
        );
        session
    }

    /// Installs `credential` unless the wallet moved away from its subject since
    /// `guard` was taken.
    ///
    /// # Errors
    /// Returns `SessionError::SessionInvalidated` and leaves the store untouched if
    /// the wallet now reports a different account, no account, or the user logged
    /// out during the attempt.
    pub fn commit(
        &self,
        guard: AttemptGuard,
        credential: Credential,
        resolution: RoleResolution,
    ) -> Result<ActiveSession, SessionError> {
        let moved = self.wallet_epoch.get() != guard.epoch;
        if moved && self.wallet_account.get() != Some(credential.subject()) {
            log::warn!(
                "discarding credential for {}: wallet changed during authentication",
                credential.subject()
            );
            return Err(SessionError::SessionInvalidated(
                "wallet account changed during authentication".to_string(),
            ));
        }
        Ok(self.set(credential, resolution))
    }

    /// Installs a restored `credential` only if nothing was installed or cleared
    /// since `guard` was taken; otherwise behaves like [`Self::commit`].
    ///
    /// # Errors
    /// Returns `SessionError::SessionInvalidated` and leaves the store untouched if
    /// the store was written during the restore or the wallet moved away from the
    /// credential's subject.
    pub fn commit_restored(
        &self,
        guard: AttemptGuard,
        credential: Credential,
        resolution: RoleResolution,
    ) -> Result<ActiveSession, SessionError> {
        if self.written_since(guard) {
            log::debug!(
                "discarding restored credential for {}: session changed during restore",
                credential.subject()
            );
            return Err(SessionError::SessionInvalidated(
                "session changed during restore".to_string(),
            ));
        }
        self.commit(guard, credential, resolution)
    }

    /// Replaces the role of the current session. No-op without a session.
    pub fn set_role(&self, role: Role) {
        self.state.send_if_modified(|state| match state.session.as_mut() {
            Some(session) if session.role != role => {
                session.role = role;
                true
            }
            _ => false,
        });
    }

    /// Resets the role of the current session to the default tag.
    pub fn clear_role(&self) {
        self.set_role(Role::default());
    }

    /// Removes the credential from durable storage, clears the authorization
    /// context and publishes an empty state.
    pub fn clear(&self) {
        self.teardown(None);
    }

    /// Clears the session because it no longer matches the wallet.
    pub fn invalidate(&self, reason: &str) {
        log::info!("session invalidated: {reason}");
        self.teardown(Some(SessionError::SessionInvalidated(reason.to_string())));
    }

    /// Invalidates the session unless the store was written since `guard` was taken.
    ///
    /// A newer write wins: the reason is only logged and the current session, its
    /// persisted credential and its last error are kept. Returns whether the
    /// session was invalidated.
    pub fn invalidate_unless_written(&self, guard: AttemptGuard, reason: &str) -> bool {
        if self.written_since(guard) {
            log::info!("keeping newer session, not invalidating: {reason}");
            return false;
        }
        self.invalidate(reason);
        true
    }

    /// Clears the session and discards every attempt still in flight.
    pub fn logout(&self) {
        self.observe_wallet(None);
        self.clear();
    }

    /// Records `error` for display without touching the session.
    pub fn record_error(&self, error: SessionError) {
        self.state.send_modify(|state| state.last_error = Some(error));
    }

    fn written_since(&self, guard: AttemptGuard) -> bool {
        self.generation.get() != guard.generation
    }

    fn bump_generation(&self) {
        self.generation.set(self.generation.get().wrapping_add(1));
    }

    fn teardown(&self, last_error: Option<SessionError>) {
        self.bump_generation();
        if let Err(err) = self.storage.remove(&self.storage_key) {
            log::warn!("failed to remove persisted credential: {err}");
        }
        self.authorization.clear_authorization_token();
        self.state.send_replace(SessionState {
            session: None,
            last_error,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{credential::encode_unsigned_token, storage::MemoryStorage};
    use serde_json::json;
    use std::cell::RefCell;

    const ALICE: &str = "0xd8da6bf26964af9d7eed9e03e53415d37aa96045";
    const BOB: &str = "0x71c7656ec7ab88b098defb751b7401b5f6d8976f";

    #[derive(Default)]
    struct RecordingContext {
        token: RefCell<Option<String>>,
    }

    impl AuthorizationContext for RecordingContext {
        fn set_authorization_token(&self, credential: &Credential) {
            *self.token.borrow_mut() = Some(credential.expose_token().to_string());
        }

        fn clear_authorization_token(&self) {
            self.token.borrow_mut().take();
        }
    }

    fn credential(subject: &str) -> Credential {
        Credential::parse(&encode_unsigned_token(&json!({
            "sub": subject,
            "exp": 4_000_000_000u64,
        })))
        .unwrap()
    }

    fn store() -> (SessionStore, Rc<MemoryStorage>, Rc<RecordingContext>) {
        let storage = Rc::new(MemoryStorage::new());
        let context = Rc::new(RecordingContext::default());
        let store = SessionStore::new(storage.clone(), context.clone(), "access-token");
        (store, storage, context)
    }

    const PROVIDER: RoleResolution = RoleResolution {
        role: Role::HealthcareProvider,
        degraded: false,
    };

    #[test]
    fn test_set_persists_installs_and_publishes() {
        let (store, storage, context) = store();
        let mut receiver = store.subscribe();
        let credential = credential(ALICE);

        store.set(credential.clone(), PROVIDER);

        assert!(receiver.has_changed().unwrap());
        let state = receiver.borrow_and_update().clone();
        assert_eq!(state.role(), Some(Role::HealthcareProvider));
        assert_eq!(state.account(), Some(credential.subject()));
        assert_eq!(
            storage.get("access-token").unwrap().as_deref(),
            Some(credential.expose_token())
        );
        assert_eq!(
            context.token.borrow().as_deref(),
            Some(credential.expose_token())
        );
    }

    #[test]
    fn test_clear_tears_everything_down() {
        let (store, storage, context) = store();
        store.set(credential(ALICE), PROVIDER);
        store.clear();

        assert_eq!(store.state(), SessionState::default());
        assert_eq!(storage.get("access-token").unwrap(), None);
        assert!(context.token.borrow().is_none());
    }

    #[test]
    fn test_degraded_resolution_is_recorded() {
        let (store, _, _) = store();
        store.set(
            credential(ALICE),
            RoleResolution {
                role: Role::Patient,
                degraded: true,
            },
        );
        let state = store.state();
        assert!(state.is_authenticated());
        assert_eq!(state.last_error, Some(SessionError::RoleResolutionDegraded));
    }

    #[test]
    fn test_commit_refused_after_wallet_switch() {
        let (store, storage, _) = store();
        let guard = store.begin_attempt();
        store.observe_wallet(Some(BOB.parse().unwrap()));

        let err = store.commit(guard, credential(ALICE), PROVIDER).unwrap_err();
        assert!(matches!(err, SessionError::SessionInvalidated(_)));
        assert!(!store.state().is_authenticated());
        assert_eq!(storage.get("access-token").unwrap(), None);
    }

    #[test]
    fn test_commit_accepted_when_wallet_confirms_subject() {
        let (store, _, _) = store();
        let guard = store.begin_attempt();
        store.observe_wallet(Some(ALICE.parse().unwrap()));
        assert!(store.commit(guard, credential(ALICE), PROVIDER).is_ok());

        let guard = store.begin_attempt();
        assert!(store.commit(guard, credential(BOB), PROVIDER).is_ok());
    }

    #[test]
    fn test_logout_discards_in_flight_attempt() {
        let (store, _, _) = store();
        let guard = store.begin_attempt();
        store.logout();
        assert!(store.commit(guard, credential(ALICE), PROVIDER).is_err());
    }

    #[test]
    fn test_invalidate_skipped_after_newer_write() {
        let (store, storage, context) = store();
        let guard = store.begin_attempt();
        store.set(credential(ALICE), PROVIDER);

        assert!(!store.invalidate_unless_written(guard, "stale restore"));
        assert!(store.state().is_authenticated());
        assert_eq!(store.state().last_error, None);
        assert!(storage.get("access-token").unwrap().is_some());
        assert!(context.token.borrow().is_some());

        let guard = store.begin_attempt();
        assert!(store.invalidate_unless_written(guard, "wallet locked"));
        assert!(!store.state().is_authenticated());
        assert_eq!(storage.get("access-token").unwrap(), None);
    }

    #[test]
    fn test_restored_commit_refused_after_newer_write() {
        let (store, _, _) = store();
        let guard = store.begin_attempt();
        store.set(credential(ALICE), PROVIDER);
        let fresh = store.state();

        let err = store
            .commit_restored(guard, credential(ALICE), PROVIDER)
            .unwrap_err();
        assert!(matches!(err, SessionError::SessionInvalidated(_)));
        assert_eq!(store.state(), fresh);

        let guard = store.begin_attempt();
        assert!(store
            .commit_restored(guard, credential(ALICE), PROVIDER)
            .is_ok());
    }

    #[test]
    fn test_role_updates_require_session() {
        let (store, _, _) = store();
        store.set_role(Role::Researcher);
        assert_eq!(store.state().role(), None);

        store.set(credential(ALICE), PROVIDER);
        store.set_role(Role::Researcher);
        assert_eq!(store.state().role(), Some(Role::Researcher));
        store.clear_role();
        assert_eq!(store.state().role(), Some(Role::Patient));
    }

    #[test]
    fn test_record_error_keeps_session() {
        let (store, _, _) = store();
        store.set(credential(ALICE), PROVIDER);
        store.record_error(SessionError::UserRejected);
        let state = store.state();
        assert!(state.is_authenticated());
        assert_eq!(state.last_error, Some(SessionError::UserRejected));
    }
}
