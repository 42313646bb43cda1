//! Role Resolver.

use std::rc::Rc;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
    api::{Registry, RoleRegistry},
    credential::Credential,
};

/// Access tier of a verified account.
///
/// Derived from the authorization registries; never authoritative on the client.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    Display,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum Role {
    /// Enrolled in the healthcare provider registry.
    HealthcareProvider,
    /// Enrolled in the researcher registry.
    Researcher,
    /// Neither; the default tag.
    #[default]
    Patient,
}

/// Outcome of a role resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleResolution {
    /// The resolved role.
    pub role: Role,
    /// `true` if at least one registry lookup failed and was counted as
    /// "not authorized".
    pub degraded: bool,
}

/// Derives exactly one [`Role`] for an account from the provider and researcher
/// registries.
pub struct RoleResolver<R> {
    registry: Rc<R>,
}

impl<R: RoleRegistry> RoleResolver<R> {
    /// Creates a resolver querying `registry`.
    pub const fn new(registry: Rc<R>) -> Self {
        Self { registry }
    }

    /// Resolves the role of `account`, querying both registries concurrently.
    ///
    /// Precedence is provider, then researcher, then the default patient tag. A
    /// failed lookup counts as "not authorized" for that registry, so resolution
    /// always terminates with a role.
    pub async fn resolve(&self, account: Address, credential: &Credential) -> RoleResolution {
        let (provider, researcher) = tokio::join!(
            self.lookup(Registry::Provider, account, credential),
            self.lookup(Registry::Researcher, account, credential),
        );

        let role = match (provider, researcher) {
            (Some(true), _) => Role::HealthcareProvider,
            (_, Some(true)) => Role::Researcher,
            _ => Role::Patient,
        };
        let degraded = provider.is_none() || researcher.is_none();
        if degraded {
            log::warn!("role resolution for {account} degraded, resolved {role}");
        } else {
            log::debug!("resolved role {role} for {account}");
        }
        RoleResolution { role, degraded }
    }

    async fn lookup(
        &self,
        registry: Registry,
        account: Address,
        credential: &Credential,
    ) -> Option<bool> {
        match self.registry.is_authorized(registry, account, credential).await {
            Ok(authorized) => Some(authorized),
            Err(err) => {
                log::warn!("{registry} registry lookup for {account} failed: {err}");
                None
            }
        }
    }
}
