//! VaxKit developer CLI.
//!
//! Drives the wallet-backed session against an HBV Tracker backend with a local
//! private key standing in for the browser wallet.
//!
//! ## Usage
//!
//! ```bash
//! # Create a key in the data directory
//! vaxkit new-key
//!
//! # Log in against the local development backend
//! vaxkit login
//!
//! # Show the persisted session, restoring it the way the browser does on load
//! vaxkit status --json
//!
//! # End the session
//! vaxkit logout
//! ```

mod storage;
mod wallet;

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::str::FromStr;

use alloy::signers::local::PrivateKeySigner;
use clap::{Parser, Subcommand};
use eyre::{eyre, WrapErr};
use serde::Serialize;
use vaxkit_core::{
    api::ApiClient,
    challenge::{ChallengeSigner, LOGIN_PURPOSE},
    credential::IdentityClaim,
    wallet::WalletAdapter,
    DefaultConfig, Environment, Role, SessionClient, SessionConfig, SessionState,
};

use crate::{storage::FileStorage, wallet::LocalWallet};

const KEY_FILE: &str = "key";
const SESSION_FILE: &str = "session.json";

#[derive(Parser)]
#[command(name = "vaxkit")]
#[command(version)]
#[command(about = "Wallet-backed sessions for the HBV Tracker backend", long_about = None)]
struct Cli {
    /// Backend environment
    #[arg(long, env = "VAXKIT_ENVIRONMENT", default_value = "development")]
    environment: Environment,

    /// API base URL (required for production)
    #[arg(long, env = "VAXKIT_API_URL")]
    api_url: Option<String>,

    /// Directory holding the key and the persisted session
    #[arg(long, env = "VAXKIT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Hex private key; overrides the key file in the data directory
    #[arg(long, env = "VAXKIT_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// Skip confirming a persisted credential with the backend on restore
    #[arg(long)]
    no_verify: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a private key in the data directory
    NewKey {
        /// Replace an existing key
        #[arg(long)]
        force: bool,
    },
    /// Sign in with the local key
    Login,
    /// Restore the persisted session and print it
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// End the session and remove the persisted credential
    Logout,
    /// Print the login challenge the wallet would be asked to sign
    Challenge {
        /// What the user confirms by signing
        #[arg(long, default_value = LOGIN_PURPOSE)]
        purpose: String,

        /// Also sign it with the local key
        #[arg(long)]
        sign: bool,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    authenticated: bool,
    role: Option<Role>,
    claims: Option<IdentityClaim>,
    last_error: Option<String>,
}

impl From<&SessionState> for StatusReport {
    fn from(state: &SessionState) -> Self {
        Self {
            authenticated: state.is_authenticated(),
            role: state.role(),
            claims: state.session.as_ref().map(|session| session.claims().clone()),
            last_error: state.last_error.as_ref().map(ToString::to_string),
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn data_dir(cli: &Cli) -> eyre::Result<PathBuf> {
    cli.data_dir
        .clone()
        .or_else(|| dirs::data_dir().map(|dir| dir.join("vaxkit")))
        .ok_or_else(|| eyre!("could not determine a data directory, pass --data-dir"))
}

fn load_signer(cli: &Cli, data_dir: &Path) -> eyre::Result<Option<PrivateKeySigner>> {
    let raw = match &cli.private_key {
        Some(key) => key.clone(),
        None => {
            let path = data_dir.join(KEY_FILE);
            if !path.exists() {
                return Ok(None);
            }
            fs::read_to_string(&path)
                .wrap_err_with(|| format!("failed to read {}", path.display()))?
        }
    };
    let signer = PrivateKeySigner::from_str(raw.trim()).wrap_err("invalid private key")?;
    Ok(Some(signer))
}

fn require_signer(signer: Option<PrivateKeySigner>) -> eyre::Result<PrivateKeySigner> {
    signer.ok_or_else(|| eyre!("no key found; run `vaxkit new-key` or pass --private-key"))
}

fn session_client(
    cli: &Cli,
    data_dir: &Path,
    signer: Option<PrivateKeySigner>,
) -> eyre::Result<SessionClient<LocalWallet, ApiClient>> {
    let mut config = SessionConfig::from_environment(&cli.environment, cli.api_url.clone())?;
    config.verify_on_restore = !cli.no_verify;
    tracing::debug!(api = %config.api_base_url, environment = %cli.environment, "session config");

    let api = Rc::new(ApiClient::new(&config));
    let storage = Rc::new(FileStorage::new(data_dir.join(SESSION_FILE)));
    Ok(SessionClient::new(
        &config,
        WalletAdapter::new(signer.map(LocalWallet::new)),
        api,
        storage,
    ))
}

fn print_state(state: &SessionState, json: bool) -> eyre::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&StatusReport::from(state))?);
        return Ok(());
    }
    match &state.session {
        Some(session) => {
            println!("account: {}", session.account());
            println!("role:    {}", session.role());
            println!("expires: {}", session.claims().expires_at);
        }
        None => println!("not logged in"),
    }
    if let Some(err) = &state.last_error {
        println!("notice:  {}", err.user_message());
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let data_dir = data_dir(&cli)?;
    let signer = load_signer(&cli, &data_dir)?;

    match &cli.command {
        Commands::NewKey { force } => {
            let path = data_dir.join(KEY_FILE);
            if path.exists() && !force {
                return Err(eyre!("{} already exists, pass --force", path.display()));
            }
            fs::create_dir_all(&data_dir)?;
            let signer = PrivateKeySigner::random();
            fs::write(&path, hex::encode(signer.to_bytes()))?;
            println!("{}", signer.address());
        }
        Commands::Login => {
            let client = session_client(&cli, &data_dir, Some(require_signer(signer)?))?;
            client.start().await;
            match client.login().await {
                Ok(session) => {
                    tracing::info!(account = %session.account(), role = %session.role(), "logged in");
                    print_state(&client.state(), false)?;
                }
                Err(err) => {
                    let message = err.user_message();
                    return Err(eyre::Report::new(err).wrap_err(message));
                }
            }
        }
        Commands::Status { json } => {
            let client = session_client(&cli, &data_dir, Some(require_signer(signer)?))?;
            client.start().await;
            print_state(&client.state(), *json)?;
        }
        Commands::Logout => {
            let client = session_client(&cli, &data_dir, signer)?;
            client.logout().await;
            println!("logged out");
        }
        Commands::Challenge { purpose, sign } => {
            let adapter = Rc::new(WalletAdapter::new(signer.map(LocalWallet::new)));
            let app_name = SessionConfig::default().app_name;
            let challenger = ChallengeSigner::new(Rc::clone(&adapter), app_name);
            let challenge = challenger.build_challenge(purpose);
            println!("{challenge}");

            if *sign {
                let account = adapter
                    .provider()
                    .map(LocalWallet::address)
                    .ok_or_else(|| eyre!("--sign requires a key"))?;
                let signature = challenger.sign(account, &challenge).await?;
                println!();
                println!("account:   {account}");
                println!("signature: {}", signature.to_hex());
            }
        }
    }
    Ok(())
}
