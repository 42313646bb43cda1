//! A local private-key wallet speaking the EIP-1193 methods the session uses.

use alloy::signers::{local::PrivateKeySigner, SignerSync};
use alloy_primitives::Address;
use serde_json::{json, Value};
use vaxkit_core::{
    primitives::ParseFromForeignBinding,
    wallet::{AccountsListener, Eip1193Provider, ProviderRpcError, Subscription, UNAUTHORIZED},
};

const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;
const UNSUPPORTED_METHOD: i64 = 4200;

/// Signs with a key held in memory. Always unlocked, never changes accounts.
pub struct LocalWallet {
    signer: PrivateKeySigner,
}

impl LocalWallet {
    pub const fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    fn personal_sign(&self, params: &Value) -> Result<Value, ProviderRpcError> {
        let message = params
            .get(0)
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderRpcError::new(INVALID_PARAMS, "missing message"))?;
        let account = params
            .get(1)
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderRpcError::new(INVALID_PARAMS, "missing account"))?;
        let account = Address::parse_from_foreign(account, "account")
            .map_err(|e| ProviderRpcError::new(INVALID_PARAMS, e.to_string()))?;
        if account != self.address() {
            return Err(ProviderRpcError::new(
                UNAUTHORIZED,
                format!("{account} is not managed by this wallet"),
            ));
        }

        let payload = hex::decode(message.trim_start_matches("0x"))
            .map_err(|e| ProviderRpcError::new(INVALID_PARAMS, format!("message: {e}")))?;
        let signature = self
            .signer
            .sign_message_sync(&payload)
            .map_err(|e| ProviderRpcError::new(INTERNAL_ERROR, e.to_string()))?;
        Ok(json!(format!("0x{}", hex::encode(signature.as_bytes()))))
    }
}

impl Eip1193Provider for LocalWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        tracing::debug!(method, "wallet request");
        match method {
            "eth_accounts" | "eth_requestAccounts" => {
                Ok(json!([self.address().to_checksum(None)]))
            }
            "personal_sign" => self.personal_sign(&params),
            "wallet_revokePermissions" => Ok(Value::Null),
            other => Err(ProviderRpcError::new(
                UNSUPPORTED_METHOD,
                format!("method {other} is not supported"),
            )),
        }
    }

    fn on_accounts_changed(&self, _listener: AccountsListener) -> Subscription {
        Subscription::noop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaxkit_core::wallet::WalletAdapter;

    #[tokio::test(flavor = "current_thread")]
    async fn test_signature_recovers_to_wallet_address() {
        let signer = PrivateKeySigner::random();
        let address = signer.address();
        let adapter = WalletAdapter::new(Some(LocalWallet::new(signer)));

        let accounts = adapter.request_accounts().await.unwrap();
        assert_eq!(accounts, vec![address]);

        let bytes = adapter.sign_message(address, "hello").await.unwrap();
        let signature = alloy_primitives::Signature::try_from(bytes.as_slice()).unwrap();
        assert_eq!(
            signature.recover_address_from_msg("hello").unwrap(),
            address
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_foreign_account_is_refused() {
        let adapter = WalletAdapter::new(Some(LocalWallet::new(PrivateKeySigner::random())));
        let other = PrivateKeySigner::random().address();
        assert!(adapter.sign_message(other, "hello").await.is_err());
    }
}
