//! Session state and the Session Store.

mod store;

use alloy_primitives::Address;

pub use store::{AttemptGuard, SessionStore};

use crate::{
    credential::{Credential, IdentityClaim},
    error::SessionError,
    role::Role,
};

/// A verified session: credential, its identity claim and the resolved role.
///
/// All three exist together; there is no way to hold a claim without its
/// credential or a role without both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    credential: Credential,
    role: Role,
}

impl ActiveSession {
    pub(crate) const fn new(credential: Credential, role: Role) -> Self {
        Self { credential, role }
    }

    /// Returns the bearer credential.
    #[must_use]
    pub const fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Returns the identity claim decoded from the credential.
    #[must_use]
    pub const fn claims(&self) -> &IdentityClaim {
        self.credential.claims()
    }

    /// Returns the verified account.
    #[must_use]
    pub const fn account(&self) -> Address {
        self.credential.subject()
    }

    /// Returns the resolved role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }
}

/// The aggregate observed by the rest of the application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// The verified session, if any.
    pub session: Option<ActiveSession>,
    /// The most recent error or notice, for display.
    pub last_error: Option<SessionError>,
}

impl SessionState {
    /// Returns `true` if a verified session is present.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// Returns the verified account, if any.
    #[must_use]
    pub fn account(&self) -> Option<Address> {
        self.session.as_ref().map(ActiveSession::account)
    }

    /// Returns the resolved role, if any.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.session.as_ref().map(ActiveSession::role)
    }
}
