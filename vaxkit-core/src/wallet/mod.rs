//! Wallet Provider Adapter.
//!
//! [`WalletAdapter`] is a thin facade over an optional injected [`Eip1193Provider`].
//! It normalizes every address it hands out, maps EIP-1193 failures onto
//! [`WalletError`] and deduplicates account-change notifications.

mod provider;

use std::cell::RefCell;
use std::rc::Rc;

use alloy_primitives::Address;
use serde_json::{json, Value};
use thiserror::Error;

pub use provider::*;

use crate::primitives::normalize_accounts;

/// Errors raised by the [`WalletAdapter`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    /// No wallet is injected.
    #[error("wallet unavailable")]
    Unavailable,
    /// The user declined the request.
    #[error("user rejected the request")]
    UserRejected,
    /// The wallet failed the request.
    #[error(transparent)]
    Rpc(ProviderRpcError),
    /// The wallet answered with something that is not a valid response.
    #[error("invalid wallet response: {0}")]
    InvalidResponse(String),
}

impl From<ProviderRpcError> for WalletError {
    fn from(error: ProviderRpcError) -> Self {
        if error.is_user_rejection() {
            Self::UserRejected
        } else {
            Self::Rpc(error)
        }
    }
}

/// Facade over an injected wallet.
pub struct WalletAdapter<P> {
    provider: Option<P>,
}

impl<P: Eip1193Provider> WalletAdapter<P> {
    /// Wraps `provider`; `None` means no wallet is injected.
    pub const fn new(provider: Option<P>) -> Self {
        Self { provider }
    }

    /// Returns whether an injected wallet is present.
    pub const fn is_available(&self) -> bool {
        self.provider.is_some()
    }

    /// Returns the injected provider, if any.
    pub const fn provider(&self) -> Option<&P> {
        self.provider.as_ref()
    }

    /// Returns the accounts the wallet already authorized, without prompting.
    ///
    /// Empty if no wallet is injected, no account is authorized, or the wallet is
    /// locked and refuses the request.
    pub async fn list_accounts(&self) -> Vec<Address> {
        let Some(provider) = &self.provider else {
            return Vec::new();
        };
        match provider.request("eth_accounts", Value::Null).await {
            Ok(value) => parse_accounts(&value).unwrap_or_else(|err| {
                log::warn!("eth_accounts returned an unexpected response: {err}");
                Vec::new()
            }),
            Err(err) => {
                log::warn!("eth_accounts failed, treating wallet as locked: {err}");
                Vec::new()
            }
        }
    }

    /// Prompts the user for account access.
    ///
    /// # Errors
    /// `WalletError::Unavailable` without a wallet, `WalletError::UserRejected` if
    /// the user declines, `WalletError::Rpc` for other wallet failures.
    pub async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        let provider = self.provider.as_ref().ok_or(WalletError::Unavailable)?;
        let value = provider
            .request("eth_requestAccounts", Value::Null)
            .await?;
        parse_accounts(&value)
    }

    /// Asks the wallet to sign `message` with `account` (`personal_sign`).
    ///
    /// Returns the raw signature bytes.
    ///
    /// # Errors
    /// `WalletError::UserRejected` if the user declines, `WalletError::Rpc` or
    /// `WalletError::InvalidResponse` if signing fails.
    pub async fn sign_message(
        &self,
        account: Address,
        message: &str,
    ) -> Result<Vec<u8>, WalletError> {
        let provider = self.provider.as_ref().ok_or(WalletError::Unavailable)?;
        let encoded = format!("0x{}", hex::encode(message.as_bytes()));
        let value = provider
            .request("personal_sign", json!([encoded, account.to_string()]))
            .await?;
        let signature = value.as_str().ok_or_else(|| {
            WalletError::InvalidResponse("signature is not a string".to_string())
        })?;
        hex::decode(signature.trim_start_matches("0x"))
            .map_err(|e| WalletError::InvalidResponse(format!("signature: {e}")))
    }

    /// Asks the wallet to drop the account permission granted to the application.
    ///
    /// # Errors
    /// Returns the wallet's error; callers treat revocation as best-effort.
    pub async fn revoke_permissions(&self) -> Result<(), WalletError> {
        let provider = self.provider.as_ref().ok_or(WalletError::Unavailable)?;
        provider
            .request("wallet_revokePermissions", json!([{ "eth_accounts": {} }]))
            .await?;
        Ok(())
    }

    /// Registers `handler` for account changes.
    ///
    /// The handler receives the normalized account list (empty when the wallet is
    /// locked or disconnected) and is invoked once per distinct change: a
    /// notification repeating the previously delivered list is suppressed.
    pub fn on_accounts_changed(
        &self,
        handler: impl Fn(Vec<Address>) + 'static,
    ) -> Subscription {
        let Some(provider) = &self.provider else {
            return Subscription::noop();
        };
        let last_delivered: Rc<RefCell<Option<Vec<Address>>>> = Rc::default();
        provider.on_accounts_changed(Box::new(move |raw| {
            let accounts = normalize_accounts(&raw);
            {
                let mut last = last_delivered.borrow_mut();
                if last.as_ref() == Some(&accounts) {
                    log::trace!("suppressing duplicate accountsChanged notification");
                    return;
                }
                *last = Some(accounts.clone());
            }
            handler(accounts);
        }))
    }
}

fn parse_accounts(value: &Value) -> Result<Vec<Address>, WalletError> {
    let raw: Vec<String> = serde_json::from_value(value.clone())
        .map_err(|e| WalletError::InvalidResponse(format!("accounts: {e}")))?;
    Ok(normalize_accounts(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const ALICE: &str = "0xd8da6bf26964af9d7eed9e03e53415d37aa96045";

    #[derive(Default)]
    struct ScriptedProvider {
        listener: Rc<RefCell<Option<AccountsListener>>>,
        last_request: RefCell<Option<(String, Value)>>,
        reject: Cell<bool>,
    }

    impl ScriptedProvider {
        fn emit(&self, accounts: &[&str]) {
            let listener = self.listener.borrow();
            if let Some(listener) = listener.as_ref() {
                listener(accounts.iter().map(ToString::to_string).collect());
            }
        }
    }

    impl Eip1193Provider for ScriptedProvider {
        async fn request(
            &self,
            method: &str,
            params: Value,
        ) -> Result<Value, ProviderRpcError> {
            *self.last_request.borrow_mut() = Some((method.to_string(), params));
            if self.reject.get() {
                return Err(ProviderRpcError::new(4001, "User rejected the request."));
            }
            Ok(match method {
                "personal_sign" => json!(format!("0x{}", "ab".repeat(65))),
                "wallet_revokePermissions" => Value::Null,
                _ => json!([ALICE.to_uppercase().replacen("0X", "0x", 1)]),
            })
        }

        fn on_accounts_changed(&self, listener: AccountsListener) -> Subscription {
            *self.listener.borrow_mut() = Some(listener);
            let slot = Rc::clone(&self.listener);
            Subscription::new(move || {
                slot.borrow_mut().take();
            })
        }
    }

    #[tokio::test]
    async fn test_no_wallet() {
        let adapter: WalletAdapter<ScriptedProvider> = WalletAdapter::new(None);
        assert!(!adapter.is_available());
        assert!(adapter.list_accounts().await.is_empty());
        assert_eq!(
            adapter.request_accounts().await.unwrap_err(),
            WalletError::Unavailable
        );
    }

    #[tokio::test]
    async fn test_accounts_are_normalized() {
        let adapter = WalletAdapter::new(Some(ScriptedProvider::default()));
        let accounts = adapter.request_accounts().await.unwrap();
        assert_eq!(
            accounts[0].to_string(),
            "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045"
        );
    }

    #[tokio::test]
    async fn test_user_rejection_is_mapped() {
        let provider = ScriptedProvider::default();
        provider.reject.set(true);
        let adapter = WalletAdapter::new(Some(provider));
        assert_eq!(
            adapter.request_accounts().await.unwrap_err(),
            WalletError::UserRejected
        );
        assert!(adapter.list_accounts().await.is_empty());
    }

    #[tokio::test]
    async fn test_sign_message_hex_encodes_payload() {
        let adapter = WalletAdapter::new(Some(ScriptedProvider::default()));
        let account = adapter.request_accounts().await.unwrap()[0];
        let signature = adapter.sign_message(account, "hi").await.unwrap();
        assert_eq!(signature.len(), 65);

        let (method, params) = adapter
            .provider()
            .unwrap()
            .last_request
            .borrow()
            .clone()
            .unwrap();
        assert_eq!(method, "personal_sign");
        assert_eq!(params[0], "0x6869");
        assert_eq!(params[1], account.to_string());
    }

    #[test]
    fn test_duplicate_notifications_are_suppressed() {
        let adapter = WalletAdapter::new(Some(ScriptedProvider::default()));
        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&received);
        let subscription =
            adapter.on_accounts_changed(move |accounts| sink.borrow_mut().push(accounts));

        let provider = adapter.provider().unwrap();
        provider.emit(&[ALICE]);
        provider.emit(&[&ALICE.to_uppercase().replacen("0X", "0x", 1)]);
        provider.emit(&[]);
        provider.emit(&[]);
        provider.emit(&[ALICE]);

        assert_eq!(received.borrow().len(), 3);
        assert!(received.borrow()[1].is_empty());

        subscription.unsubscribe();
        provider.emit(&[]);
        assert_eq!(received.borrow().len(), 3);
    }
}
