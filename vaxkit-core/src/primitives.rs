//! Parsing and normalization of wallet-provided primitives.

use alloy_primitives::Address;
use std::str::FromStr;

use crate::error::ConfigError;

/// A trait for parsing primitive types from values handed over by a wallet or a host
/// application (JavaScript, CLI arguments).
///
/// Wallets return addresses in whatever case they like. Parsing ignores the case,
/// which makes the parsed value canonical: two spellings of the same account compare
/// equal and always render in the EIP-55 checksummed form.
///
/// # Examples
/// ```rust
/// use alloy_primitives::Address;
/// use vaxkit_core::primitives::ParseFromForeignBinding;
///
/// let lower = Address::parse_from_foreign("0xd8da6bf26964af9d7eed9e03e53415d37aa96045", "account").unwrap();
/// let upper = Address::parse_from_foreign("0xD8DA6BF26964AF9D7EED9E03E53415D37AA96045", "account").unwrap();
/// assert_eq!(lower, upper);
/// assert_eq!(lower.to_string(), "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045");
/// ```
///
/// # Errors
/// - `ConfigError::InvalidInput` if the provided string is not a valid address.
pub trait ParseFromForeignBinding {
    /// Parses a value, naming `attr` in the error on failure.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidInput` if the input cannot be parsed.
    fn parse_from_foreign(s: &str, attr: &'static str) -> Result<Self, ConfigError>
    where
        Self: Sized;

    /// Parses an optional value.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidInput` if the input is present and cannot be parsed.
    fn parse_from_foreign_optional(
        s: Option<String>,
        attr: &'static str,
    ) -> Result<Option<Self>, ConfigError>
    where
        Self: Sized;
}

impl ParseFromForeignBinding for Address {
    fn parse_from_foreign(s: &str, attr: &'static str) -> Result<Self, ConfigError> {
        Self::from_str(s.trim()).map_err(|e| ConfigError::InvalidInput {
            attribute: attr.to_string(),
            reason: e.to_string(),
        })
    }

    fn parse_from_foreign_optional(
        s: Option<String>,
        attr: &'static str,
    ) -> Result<Option<Self>, ConfigError> {
        if let Some(s) = s {
            return Self::parse_from_foreign(s.as_str(), attr).map(Some);
        }
        Ok(None)
    }
}

/// Normalizes a list of wallet-reported accounts.
///
/// Entries that are not valid addresses are dropped and logged.
#[must_use]
pub fn normalize_accounts<S: AsRef<str>>(raw: &[S]) -> Vec<Address> {
    raw.iter()
        .filter_map(|account| {
            match Address::parse_from_foreign(account.as_ref(), "account") {
                Ok(address) => Some(address),
                Err(err) => {
                    log::warn!("ignoring malformed wallet account: {err}");
                    None
                }
            }
        })
        .collect()
}
