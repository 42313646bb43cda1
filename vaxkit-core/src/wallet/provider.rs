//! The raw EIP-1193 provider seam.

use serde::Deserialize;
use thiserror::Error;

/// EIP-1193 code for "the user rejected the request".
pub const USER_REJECTED_REQUEST: i64 = 4001;
/// EIP-1193 code for "the requested method and/or account has not been authorized".
pub const UNAUTHORIZED: i64 = 4100;
/// EIP-1193 code for "the provider is disconnected from all chains".
pub const DISCONNECTED: i64 = 4900;

/// Error object returned by an EIP-1193 `request` call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Deserialize)]
#[error("provider rpc error {code}: {message}")]
pub struct ProviderRpcError {
    /// Numeric EIP-1193 / JSON-RPC error code.
    pub code: i64,
    /// Human-readable message from the wallet.
    #[serde(default)]
    pub message: String,
}

impl ProviderRpcError {
    /// Builds an error from a code and message.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Returns `true` if the user declined the request.
    #[must_use]
    pub const fn is_user_rejection(&self) -> bool {
        self.code == USER_REJECTED_REQUEST
    }
}

/// Listener for `accountsChanged` events. Receives the raw account strings.
pub type AccountsListener = Box<dyn Fn(Vec<String>)>;

/// An injected EIP-1193 provider, e.g. `window.ethereum`.
///
/// Implementations are single-threaded: futures returned by `request` are not
/// required to be `Send`.
#[allow(async_fn_in_trait)]
pub trait Eip1193Provider {
    /// Sends a JSON-RPC request to the wallet and suspends until it resolves.
    ///
    /// `params` is `serde_json::Value::Null` when the method takes no parameters.
    ///
    /// # Errors
    /// Returns the wallet's `ProviderRpcError` if the request is rejected or fails.
    async fn request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderRpcError>;

    /// Registers `listener` for `accountsChanged` events.
    fn on_accounts_changed(&self, listener: AccountsListener) -> Subscription;
}

/// Handle to a registered listener. Unsubscribes when dropped.
#[must_use = "dropping a subscription unsubscribes the listener"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Creates a subscription that runs `unsubscribe` exactly once.
    pub fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// A subscription with nothing to undo.
    pub const fn noop() -> Self {
        Self { unsubscribe: None }
    }

    /// Removes the listener now.
    pub fn unsubscribe(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_subscription_unsubscribes_once() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let subscription = Subscription::new(move || counter.set(counter.get() + 1));
        subscription.unsubscribe();
        assert_eq!(calls.get(), 1);

        let counter = Rc::clone(&calls);
        {
            let _subscription = Subscription::new(move || counter.set(counter.get() + 1));
        }
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_rpc_error_deserializes_without_message() {
        let error: ProviderRpcError =
            serde_json::from_value(serde_json::json!({ "code": 4001 })).unwrap();
        assert!(error.is_user_rejection());
    }
}
