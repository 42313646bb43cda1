//! `vaxkit-core` is the wallet-backed session subsystem of the HBV Tracker client.
//!
//! It turns an injected EIP-1193 wallet into a verified, role-scoped application
//! session, keeps that session consistent with the wallet's live account state and
//! tears it down safely.
//!
//! The entry point for applications is [`SessionClient`]:
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use vaxkit_core::{
//!     api::ApiClient, storage::MemoryStorage, wallet::WalletAdapter, Environment,
//!     SessionClient, SessionConfig, DefaultConfig,
//! };
//!
//! let config = SessionConfig::from_environment(&Environment::Development, None)?;
//! let api = Rc::new(ApiClient::new(&config));
//! let client = SessionClient::new(
//!     &config,
//!     WalletAdapter::new(Some(provider)),
//!     api,
//!     Rc::new(MemoryStorage::new()),
//! );
//! client.start().await;
//! let session = client.login().await?;
//! println!("logged in as {} ({})", session.account(), session.role());
//! ```
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use strum::{Display, EnumString};

/// Deployment environment of the HBV Tracker backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    /// Local development backend.
    Development,
    /// Production backend. Requires an explicit `https` API base URL.
    Production,
}

pub mod api;
pub mod challenge;
pub mod credential;
pub mod logger;
pub mod storage;
pub mod wallet;

mod authenticator;
pub use authenticator::*;

mod client;
pub use client::*;

mod config;
pub use config::*;

mod defaults;
pub use defaults::*;

mod error;
pub use error::*;

mod monitor;
pub use monitor::*;

mod role;
pub use role::*;

mod session;
pub use session::*;

pub mod primitives;

// private modules
mod http_request;
