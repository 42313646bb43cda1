#![allow(dead_code)]

//! Common test utilities shared across integration tests.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::Address;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use vaxkit_core::{
    api::{ApiError, AuthApi, AuthorizationContext, Registry, RoleRegistry, TokenRequest},
    credential::{encode_unsigned_token, Credential},
    storage::MemoryStorage,
    wallet::{AccountsListener, Eip1193Provider, ProviderRpcError, Subscription, WalletAdapter},
    SessionClient, SessionConfig,
};

pub const ALICE: &str = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045";
pub const BOB: &str = "0x71c7656ec7ab88b098defb751b7401b5f6d8976f";
pub const STORAGE_KEY: &str = "access-token";

pub fn address(raw: &str) -> Address {
    raw.parse().unwrap()
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// An unsigned token for `subject`, valid for `ttl` seconds.
pub fn make_token_valid_for(subject: &str, ttl: u64) -> String {
    encode_unsigned_token(&json!({
        "sub": subject,
        "iat": now(),
        "exp": now() + ttl,
    }))
}

/// An unsigned token for `subject`, valid for one hour.
pub fn make_token(subject: &str) -> String {
    encode_unsigned_token(&json!({
        "sub": subject,
        "iat": now(),
        "exp": now() + 3600,
    }))
}

pub fn make_expired_token(subject: &str) -> String {
    encode_unsigned_token(&json!({
        "sub": subject,
        "iat": 1_600_000_000u64,
        "exp": 1_600_003_600u64,
    }))
}

#[derive(Default)]
pub struct WalletState {
    pub accounts: RefCell<Vec<String>>,
    pub reject_accounts: Cell<bool>,
    pub reject_signature: Cell<bool>,
    pub fail_revoke: Cell<bool>,
    pub signed_messages: RefCell<Vec<String>>,
    pub revocations: Cell<usize>,
    listener: RefCell<Option<AccountsListener>>,
}

/// A scripted injected wallet. Clones share state, so tests keep a handle after
/// moving the wallet into a client.
#[derive(Clone, Default)]
pub struct FakeWallet(pub Rc<WalletState>);

impl FakeWallet {
    pub fn with_accounts(accounts: &[&str]) -> Self {
        let wallet = Self::default();
        wallet.set_accounts(accounts);
        wallet
    }

    pub fn set_accounts(&self, accounts: &[&str]) {
        *self.0.accounts.borrow_mut() = accounts.iter().map(ToString::to_string).collect();
    }

    /// Switches accounts and fires `accountsChanged`.
    pub fn emit(&self, accounts: &[&str]) {
        self.set_accounts(accounts);
        let listener = self.0.listener.borrow();
        if let Some(listener) = listener.as_ref() {
            listener(accounts.iter().map(ToString::to_string).collect());
        }
    }

    pub fn has_listener(&self) -> bool {
        self.0.listener.borrow().is_some()
    }
}

impl Eip1193Provider for FakeWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        match method {
            "eth_accounts" => Ok(Value::from(self.0.accounts.borrow().clone())),
            "eth_requestAccounts" => {
                if self.0.reject_accounts.get() {
                    return Err(ProviderRpcError::new(4001, "User rejected the request."));
                }
                Ok(Value::from(self.0.accounts.borrow().clone()))
            }
            "personal_sign" => {
                if self.0.reject_signature.get() {
                    return Err(ProviderRpcError::new(4001, "User denied message signature."));
                }
                let encoded = params[0].as_str().unwrap_or_default();
                let message =
                    String::from_utf8(hex::decode(encoded.trim_start_matches("0x")).unwrap())
                        .unwrap();
                self.0.signed_messages.borrow_mut().push(message);
                Ok(json!(format!("0x{}", "11".repeat(65))))
            }
            "wallet_revokePermissions" => {
                self.0.revocations.set(self.0.revocations.get() + 1);
                if self.0.fail_revoke.get() {
                    return Err(ProviderRpcError::new(4200, "Unsupported method."));
                }
                Ok(Value::Null)
            }
            other => Err(ProviderRpcError::new(4200, format!("unsupported {other}"))),
        }
    }

    fn on_accounts_changed(&self, listener: AccountsListener) -> Subscription {
        *self.0.listener.borrow_mut() = Some(listener);
        let state = Rc::clone(&self.0);
        Subscription::new(move || {
            state.listener.borrow_mut().take();
        })
    }
}

/// A scripted backend: verifier, registries and authorization context.
pub struct FakeApi {
    /// Subject written into issued tokens; defaults to the signing address.
    pub token_subject: RefCell<Option<String>>,
    /// Raw token returned verbatim by the verifier.
    pub token_override: RefCell<Option<String>>,
    pub reject_signature: Cell<bool>,
    /// `None` makes the lookup fail.
    pub provider: Cell<Option<bool>>,
    pub researcher: Cell<Option<bool>>,
    /// `None` makes `verify_token` fail.
    pub token_valid: Cell<Option<bool>>,
    pub bearer: RefCell<Option<String>>,
    pub token_requests: RefCell<Vec<(Address, String)>>,
    pub lookup_bearers: RefCell<Vec<String>>,
    pub verify_calls: Cell<usize>,
    /// Runs once while the next token request is in flight.
    pub before_issue: RefCell<Option<Box<dyn FnOnce()>>>,
    /// Holds the next `verify_token` call until the sender fires or is dropped.
    pub verify_gate: RefCell<Option<oneshot::Receiver<()>>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            token_subject: RefCell::new(None),
            token_override: RefCell::new(None),
            reject_signature: Cell::new(false),
            provider: Cell::new(Some(false)),
            researcher: Cell::new(Some(false)),
            token_valid: Cell::new(Some(true)),
            bearer: RefCell::new(None),
            token_requests: RefCell::new(Vec::new()),
            lookup_bearers: RefCell::new(Vec::new()),
            verify_calls: Cell::new(0),
            before_issue: RefCell::new(None),
            verify_gate: RefCell::new(None),
        }
    }

    pub fn bearer(&self) -> Option<String> {
        self.bearer.borrow().clone()
    }
}

impl AuthApi for FakeApi {
    async fn issue_token(&self, request: &TokenRequest<'_>) -> Result<String, ApiError> {
        let hook = self.before_issue.borrow_mut().take();
        if let Some(hook) = hook {
            hook();
        }
        self.token_requests
            .borrow_mut()
            .push((request.address, request.message.to_string()));
        if self.reject_signature.get() {
            return Err(ApiError::Rejected {
                status: 401,
                reason: "Invalid signature".to_string(),
            });
        }
        if let Some(token) = self.token_override.borrow().clone() {
            return Ok(token);
        }
        let subject = self
            .token_subject
            .borrow()
            .clone()
            .unwrap_or_else(|| request.address.to_string());
        Ok(make_token(&subject))
    }

    async fn verify_token(&self, _credential: &Credential) -> Result<bool, ApiError> {
        self.verify_calls.set(self.verify_calls.get() + 1);
        let gate = self.verify_gate.borrow_mut().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.token_valid
            .get()
            .ok_or_else(|| ApiError::Decode("verify unavailable".to_string()))
    }
}

impl RoleRegistry for FakeApi {
    async fn is_authorized(
        &self,
        registry: Registry,
        _account: Address,
        credential: &Credential,
    ) -> Result<bool, ApiError> {
        self.lookup_bearers
            .borrow_mut()
            .push(credential.expose_token().to_string());
        let answer = match registry {
            Registry::Provider => self.provider.get(),
            Registry::Researcher => self.researcher.get(),
        };
        answer.ok_or(ApiError::Network {
            url: format!("/blockchain/{registry}/authorized"),
            status: Some(503),
            error: "registry unavailable".to_string(),
        })
    }
}

impl AuthorizationContext for FakeApi {
    fn set_authorization_token(&self, credential: &Credential) {
        *self.bearer.borrow_mut() = Some(credential.expose_token().to_string());
    }

    fn clear_authorization_token(&self) {
        self.bearer.borrow_mut().take();
    }
}

pub struct Harness {
    pub client: SessionClient<FakeWallet, FakeApi>,
    pub wallet: FakeWallet,
    pub api: Rc<FakeApi>,
    pub storage: Rc<MemoryStorage>,
}

impl Harness {
    pub fn new(wallet: Option<FakeWallet>, storage: MemoryStorage) -> Self {
        let api = Rc::new(FakeApi::new());
        let storage = Rc::new(storage);
        let handle = wallet.clone().unwrap_or_default();
        let client = SessionClient::new(
            &SessionConfig::default(),
            WalletAdapter::new(wallet),
            Rc::clone(&api),
            storage.clone(),
        );
        Self {
            client,
            wallet: handle,
            api,
            storage,
        }
    }

    /// A started client whose wallet exposes `accounts`.
    pub async fn started(accounts: &[&str]) -> Self {
        let harness = Self::new(Some(FakeWallet::with_accounts(accounts)), MemoryStorage::new());
        harness.client.start().await;
        harness
    }

    pub fn persisted_token(&self) -> Option<String> {
        use vaxkit_core::storage::DurableStorage;
        self.storage.get(STORAGE_KEY).unwrap()
    }
}
