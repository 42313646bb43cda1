//! WebAssembly bindings for `vaxkit_core`.
//!
//! Exposes the wallet-backed session to the HBV Tracker frontend through
//! `wasm-bindgen`: `window.ethereum` is the wallet, `localStorage` keeps the
//! credential and log records go to the console.

#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod logger;
mod provider;
mod storage;

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use js_sys::{Function, Promise};
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};

use vaxkit_core::{
    api::ApiClient,
    storage::{DurableStorage, MemoryStorage},
    wallet::WalletAdapter,
    DefaultConfig, Environment as CoreEnvironment, LoginPhase, Role, SessionClient,
    SessionConfig, SessionError, SessionState,
};

use crate::{logger::ConsoleLogger, provider::InjectedProvider, storage::LocalStorage};

const ENV_DEVELOPMENT: &str = "development";
const ENV_PRODUCTION: &str = "production";

type CoreClient = SessionClient<InjectedProvider, ApiClient>;

/// Forwards `vaxkit` log records to the browser console.
#[wasm_bindgen(js_name = initLogging)]
pub fn init_logging() {
    vaxkit_core::logger::set_logger(Arc::new(ConsoleLogger));
}

#[wasm_bindgen]
pub struct WalletSession(Rc<CoreClient>);

#[wasm_bindgen]
impl WalletSession {
    /// Creates a session using a JSON config.
    ///
    /// # Errors
    /// Returns an error when the config cannot be parsed.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<Self, JsValue> {
        let config = SessionConfig::from_json(config_json)
            .map_err(|err| JsValue::from_str(&err.to_string()))?;
        Ok(Self::with_config(&config))
    }

    /// Creates a session using SDK defaults for `environment`.
    ///
    /// # Errors
    /// Returns an error if `environment` requires an API base URL that is missing
    /// or unacceptable.
    #[wasm_bindgen(js_name = withDefaults)]
    pub fn with_defaults(
        environment: &Environment,
        api_base_url: Option<String>,
    ) -> Result<Self, JsValue> {
        let config = SessionConfig::from_environment(&environment.0, api_base_url)
            .map_err(|err| JsValue::from_str(&err.to_string()))?;
        Ok(Self::with_config(&config))
    }

    /// Whether the page has an injected wallet.
    #[wasm_bindgen(js_name = isWalletAvailable)]
    #[must_use]
    pub fn is_wallet_available() -> bool {
        InjectedProvider::detect().is_some()
    }

    /// Restores a persisted session and starts following wallet account changes.
    /// Call once on application mount.
    pub fn start(&self) -> Promise {
        let client = Rc::clone(&self.0);
        future_to_promise(async move {
            client.start().await;
            state_to_jsvalue(&client.state())
        })
    }

    /// Logs in with the wallet's account.
    ///
    /// # Errors
    /// Rejects with `{ kind, message, detail }` when the attempt fails.
    pub fn login(&self) -> Promise {
        let client = Rc::clone(&self.0);
        future_to_promise(async move {
            match client.login().await {
                Ok(_) => state_to_jsvalue(&client.state()),
                Err(err) => Err(session_error_to_jsvalue(&err)),
            }
        })
    }

    /// Ends the session. Idempotent.
    pub fn logout(&self) -> Promise {
        let client = Rc::clone(&self.0);
        future_to_promise(async move {
            client.logout().await;
            state_to_jsvalue(&client.state())
        })
    }

    /// Returns the current session state.
    ///
    /// # Errors
    /// Returns an error if the state cannot be converted to a JS object.
    pub fn state(&self) -> Result<JsValue, JsValue> {
        state_to_jsvalue(&self.0.state())
    }

    /// Returns the phase of the current or last login attempt.
    #[wasm_bindgen(js_name = loginPhase)]
    #[must_use]
    pub fn login_phase(&self) -> String {
        phase_name(&self.0.login_phase()).to_string()
    }

    /// Calls `callback` with the new state after every change.
    pub fn subscribe(&self, callback: Function) -> StateSubscription {
        let mut receiver = self.0.subscribe();
        let active = Rc::new(Cell::new(true));
        let flag = Rc::clone(&active);
        spawn_local(async move {
            while receiver.changed().await.is_ok() {
                if !flag.get() {
                    break;
                }
                let state = receiver.borrow_and_update().clone();
                let result = state_to_jsvalue(&state)
                    .and_then(|state| callback.call1(&JsValue::undefined(), &state));
                if let Err(err) = result {
                    log::warn!("session subscriber failed: {err:?}");
                }
            }
        });
        StateSubscription(active)
    }
}

impl WalletSession {
    fn with_config(config: &SessionConfig) -> Self {
        let storage: Rc<dyn DurableStorage> = match LocalStorage::open() {
            Ok(storage) => Rc::new(storage),
            Err(err) => {
                log::warn!("{err}, the session will not survive a reload");
                Rc::new(MemoryStorage::new())
            }
        };
        let client = SessionClient::new(
            config,
            WalletAdapter::new(InjectedProvider::detect()),
            Rc::new(ApiClient::new(config)),
            storage,
        );
        Self(Rc::new(client))
    }
}

/// Handle returned by [`WalletSession::subscribe`].
#[wasm_bindgen]
pub struct StateSubscription(Rc<Cell<bool>>);

#[wasm_bindgen]
impl StateSubscription {
    /// Stops delivering state changes.
    pub fn unsubscribe(&self) {
        self.0.set(false);
    }
}

#[wasm_bindgen]
pub struct Environment(CoreEnvironment);

#[wasm_bindgen]
#[allow(clippy::missing_const_for_fn)]
impl Environment {
    #[must_use]
    #[wasm_bindgen(js_name = Development)]
    pub fn development() -> Self {
        Self(CoreEnvironment::Development)
    }

    #[must_use]
    #[wasm_bindgen(js_name = Production)]
    pub fn production() -> Self {
        Self(CoreEnvironment::Production)
    }

    #[must_use]
    #[wasm_bindgen(js_name = toString)]
    pub fn to_string_js(&self) -> String {
        match self.0 {
            CoreEnvironment::Development => ENV_DEVELOPMENT,
            CoreEnvironment::Production => ENV_PRODUCTION,
        }
        .to_string()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorView {
    kind: &'static str,
    message: &'static str,
    detail: String,
}

impl From<&SessionError> for ErrorView {
    fn from(error: &SessionError) -> Self {
        let kind = match error {
            SessionError::WalletUnavailable => "walletUnavailable",
            SessionError::UserRejected => "userRejected",
            SessionError::SigningFailed(_) => "signingFailed",
            SessionError::VerificationFailed(_) => "verificationFailed",
            SessionError::RoleResolutionDegraded => "roleResolutionDegraded",
            SessionError::SessionInvalidated(_) => "sessionInvalidated",
        };
        Self {
            kind,
            message: error.user_message(),
            detail: error.to_string(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StateView {
    authenticated: bool,
    account: Option<String>,
    role: Option<Role>,
    expires_at: Option<u64>,
    last_error: Option<ErrorView>,
}

impl From<&SessionState> for StateView {
    fn from(state: &SessionState) -> Self {
        let session = state.session.as_ref();
        Self {
            authenticated: session.is_some(),
            account: session.map(|session| session.account().to_string()),
            role: session.map(vaxkit_core::ActiveSession::role),
            expires_at: session.map(|session| session.claims().expires_at),
            last_error: state.last_error.as_ref().map(ErrorView::from),
        }
    }
}

const fn phase_name(phase: &LoginPhase) -> &'static str {
    match phase {
        LoginPhase::Idle => "idle",
        LoginPhase::AccountRequested => "accountRequested",
        LoginPhase::Signing => "signing",
        LoginPhase::Verifying => "verifying",
        LoginPhase::Authenticated => "authenticated",
        LoginPhase::Failed(_) => "failed",
    }
}

fn to_jsvalue<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(JsValue::from)
}

fn state_to_jsvalue(state: &SessionState) -> Result<JsValue, JsValue> {
    to_jsvalue(&StateView::from(state))
}

fn session_error_to_jsvalue(error: &SessionError) -> JsValue {
    to_jsvalue(&ErrorView::from(error)).unwrap_or_else(|_| JsValue::from_str(&error.to_string()))
}

#[wasm_bindgen(typescript_custom_section)]
const TYPESCRIPT_DEFS: &str = r#"
export type Role = "healthcareProvider" | "researcher" | "patient";

export interface SessionErrorView {
    kind:
        | "walletUnavailable"
        | "userRejected"
        | "signingFailed"
        | "verificationFailed"
        | "roleResolutionDegraded"
        | "sessionInvalidated";
    message: string;
    detail: string;
}

export interface SessionStateView {
    authenticated: boolean;
    account: string | null;
    role: Role | null;
    expiresAt: number | null;
    lastError: SessionErrorView | null;
}

export class WalletSession {
    constructor(configJson: string);
    static withDefaults(environment: Environment, apiBaseUrl?: string): WalletSession;
    static isWalletAvailable(): boolean;

    start(): Promise<SessionStateView>;
    login(): Promise<SessionStateView>;
    logout(): Promise<SessionStateView>;
    state(): SessionStateView;
    loginPhase():
        | "idle"
        | "accountRequested"
        | "signing"
        | "verifying"
        | "authenticated"
        | "failed";
    subscribe(callback: (state: SessionStateView) => void): StateSubscription;
}

export class StateSubscription {
    unsubscribe(): void;
}

export class Environment {
    static Development(): Environment;
    static Production(): Environment;
    toString(): "development" | "production";
}
"#;
