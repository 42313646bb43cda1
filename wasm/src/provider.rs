//! `window.ethereum` as an [`Eip1193Provider`].

use js_sys::{Function, Object, Promise, Reflect};
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use vaxkit_core::wallet::{AccountsListener, Eip1193Provider, ProviderRpcError, Subscription};

const INTERNAL_ERROR: i64 = -32603;
const ACCOUNTS_CHANGED: &str = "accountsChanged";

/// The wallet injected into the page.
pub struct InjectedProvider {
    ethereum: JsValue,
}

impl InjectedProvider {
    /// Returns the injected provider, or `None` if the page has no wallet.
    pub fn detect() -> Option<Self> {
        let window = web_sys::window()?;
        let ethereum = Reflect::get(&window, &JsValue::from_str("ethereum")).ok()?;
        if ethereum.is_undefined() || ethereum.is_null() {
            return None;
        }
        Some(Self { ethereum })
    }

    fn function(&self, name: &str) -> Result<Function, JsValue> {
        Reflect::get(&self.ethereum, &JsValue::from_str(name))?.dyn_into::<Function>()
    }

    async fn call(&self, method: &str, params: &Value) -> Result<JsValue, JsValue> {
        let args = Object::new();
        Reflect::set(&args, &"method".into(), &method.into())?;
        if !params.is_null() {
            let params = params
                .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
                .map_err(JsValue::from)?;
            Reflect::set(&args, &"params".into(), &params)?;
        }
        let promise: Promise = self
            .function("request")?
            .call1(&self.ethereum, &args)?
            .dyn_into()?;
        JsFuture::from(promise).await
    }
}

impl Eip1193Provider for InjectedProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        let result = self.call(method, &params).await.map_err(rpc_error)?;
        if result.is_undefined() || result.is_null() {
            return Ok(Value::Null);
        }
        serde_wasm_bindgen::from_value(result)
            .map_err(|e| ProviderRpcError::new(INTERNAL_ERROR, e.to_string()))
    }

    fn on_accounts_changed(&self, listener: AccountsListener) -> Subscription {
        let closure = Closure::<dyn Fn(JsValue)>::new(move |payload: JsValue| {
            match decode_accounts(payload) {
                Ok(accounts) => listener(accounts),
                Err(err) => log::warn!("ignoring malformed accountsChanged payload: {err}"),
            }
        });

        let registered = self.function("on").and_then(|on| {
            on.call2(
                &self.ethereum,
                &ACCOUNTS_CHANGED.into(),
                closure.as_ref().unchecked_ref(),
            )
        });
        if let Err(err) = registered {
            log::warn!("wallet does not support accountsChanged events: {err:?}");
            return Subscription::noop();
        }

        let ethereum = self.ethereum.clone();
        Subscription::new(move || {
            let removed = Reflect::get(&ethereum, &"removeListener".into())
                .and_then(|remove| remove.dyn_into::<Function>())
                .and_then(|remove| {
                    remove.call2(
                        &ethereum,
                        &ACCOUNTS_CHANGED.into(),
                        closure.as_ref().unchecked_ref(),
                    )
                });
            if let Err(err) = removed {
                log::warn!("failed to remove accountsChanged listener: {err:?}");
            }
        })
    }
}

/// An `accountsChanged` payload must be an array of strings. Anything else is
/// rejected rather than read as a locked wallet.
fn decode_accounts(payload: JsValue) -> Result<Vec<String>, String> {
    let payload: Value = serde_wasm_bindgen::from_value(payload).map_err(|e| e.to_string())?;
    accounts_from_value(payload)
}

fn accounts_from_value(payload: Value) -> Result<Vec<String>, String> {
    serde_json::from_value(payload).map_err(|e| e.to_string())
}

/// EIP-1193 rejections are `{ code, message }` objects; anything else becomes an
/// internal error.
fn rpc_error(value: JsValue) -> ProviderRpcError {
    serde_wasm_bindgen::from_value::<ProviderRpcError>(value.clone()).unwrap_or_else(|_| {
        ProviderRpcError::new(
            INTERNAL_ERROR,
            value.as_string().unwrap_or_else(|| format!("{value:?}")),
        )
    })
}
