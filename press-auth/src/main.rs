//! press-auth - OAuth2 credential management for Presscast
//!
//! Walks through the authorization flow: store the client id/secret, open
//! the authorization URL, complete the callback, and verify the connection.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use libpresscast::auth::TokenState;
use libpresscast::{
    ApiEndpoints, Config, CredentialStore, FileCredentialStore, TokenStore, XApiClient,
};
use tracing::error;

#[derive(Parser)]
#[command(name = "press-auth")]
#[command(about = "Manage Presscast X API credentials", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store the OAuth2 client id and secret
    SetClient {
        /// OAuth2 client id
        client_id: String,

        /// OAuth2 client secret; read from stdin when omitted
        #[arg(long)]
        client_secret: Option<String>,
    },

    /// Start the authorization flow and print the URL to visit
    Authorize {
        /// Redirect URI registered with the application
        #[arg(long)]
        redirect_uri: String,
    },

    /// Complete the authorization flow with the callback values
    Callback {
        /// `code` query parameter from the callback
        code: String,

        /// `state` query parameter from the callback
        #[arg(long)]
        state: String,

        /// Redirect URI used in the authorize step
        #[arg(long)]
        redirect_uri: String,
    },

    /// Verify the stored token against the API
    Test,

    /// Show the credential state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run_command(cli).await {
        error!("{}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn open_store(cli_config: &Option<PathBuf>) -> Result<Arc<FileCredentialStore>> {
    let config = match cli_config {
        Some(path) => Config::load_from_path(path).context("failed to load config")?,
        None => Config::load().unwrap_or_else(|_| Config::default_config()),
    };
    let store = FileCredentialStore::from_config_path(&config.credentials.path)
        .context("failed to open credential store")?;
    Ok(Arc::new(store))
}

async fn run_command(cli: Cli) -> Result<()> {
    let store = open_store(&cli.config)?;
    let store_dyn: Arc<dyn CredentialStore> = store.clone();
    let tokens = TokenStore::new(store_dyn, ApiEndpoints::default())?;

    match cli.command {
        Commands::SetClient {
            client_id,
            client_secret,
        } => {
            let client_secret = match client_secret {
                Some(s) => s,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("failed to read client secret from stdin")?;
                    buf.trim().to_string()
                }
            };
            anyhow::ensure!(!client_secret.is_empty(), "client secret must not be empty");

            let mut credentials = store.load()?;
            credentials.client_id = client_id;
            credentials.client_secret = client_secret;
            store.store(&credentials)?;

            println!("Client credentials stored. Run 'press-auth authorize' next.");
            Ok(())
        }

        Commands::Authorize { redirect_uri } => {
            let url = tokens.start_authorization(&redirect_uri)?;
            println!("Visit this URL to authorize the application:\n\n{}\n", url);
            println!("Then run: press-auth callback <code> --state <state> --redirect-uri {}", redirect_uri);
            Ok(())
        }

        Commands::Callback {
            code,
            state,
            redirect_uri,
        } => {
            tokens
                .complete_authorization(&code, &state, &redirect_uri)
                .await?;
            println!("Authorization complete, tokens stored.");
            Ok(())
        }

        Commands::Test => {
            tokens.ensure_fresh().await?;
            let access_token = tokens.access_token()?;
            let client = XApiClient::new(ApiEndpoints::default())?;
            client.verify_connection(&access_token).await?;
            println!("Connection OK.");
            Ok(())
        }

        Commands::Status => {
            match tokens.state() {
                TokenState::Unconfigured => {
                    println!("Not configured. Run 'press-auth set-client' first.")
                }
                TokenState::ConfiguredNoToken => {
                    println!("Client configured, not authorized. Run 'press-auth authorize'.")
                }
                TokenState::Authorized => println!("Authorized."),
                TokenState::Expired => {
                    println!("Authorized, token stale; it will refresh on next use.")
                }
            }
            Ok(())
        }
    }
}
