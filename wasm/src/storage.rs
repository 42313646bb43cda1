//! `window.localStorage` as [`DurableStorage`].

use wasm_bindgen::JsValue;

use vaxkit_core::storage::{DurableStorage, StorageError, StorageResult};

pub struct LocalStorage {
    storage: web_sys::Storage,
}

impl LocalStorage {
    /// Opens the page's `localStorage`.
    ///
    /// # Errors
    /// `StorageError::Unavailable` outside a window or when storage is disabled.
    pub fn open() -> StorageResult<Self> {
        let window = web_sys::window()
            .ok_or_else(|| StorageError::Unavailable("no window".to_string()))?;
        let storage = window
            .local_storage()
            .map_err(|e| StorageError::Unavailable(describe(&e)))?
            .ok_or_else(|| StorageError::Unavailable("localStorage disabled".to_string()))?;
        Ok(Self { storage })
    }
}

impl DurableStorage for LocalStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.storage
            .get_item(key)
            .map_err(|e| StorageError::Read(describe(&e)))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.storage
            .set_item(key, value)
            .map_err(|e| StorageError::Write(describe(&e)))
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.storage
            .remove_item(key)
            .map_err(|e| StorageError::Write(describe(&e)))
    }
}

fn describe(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}
