use wasm_bindgen::JsValue;

use vaxkit_core::logger::{LogLevel, Logger};

/// Writes forwarded records to the browser console.
pub struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, level: LogLevel, message: String) {
        let message: JsValue = format!("[vaxkit] {message}").into();
        match level {
            LogLevel::Trace | LogLevel::Debug => web_sys::console::debug_1(&message),
            LogLevel::Info => web_sys::console::info_1(&message),
            LogLevel::Warn => web_sys::console::warn_1(&message),
            LogLevel::Error => web_sys::console::error_1(&message),
        }
    }
}
