//! shop-admin - command-line admin client for the shop backend
//!
//! Every backend call goes through one authenticated client that refreshes
//! the session on 401 and replays the affected requests.

mod api;
mod auth;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::{AdminClient, CrudService, Page, Resource};
use auth::{FileTokenStore, MemoryTokenStore, TokenStore};
use config::Config;

#[derive(Parser)]
#[command(name = "shop-admin")]
#[command(about = "Command-line admin client for the shop backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Backend base URL (overrides config)
    #[arg(long, global = true, env = "SHOP_ADMIN_BASE_URL")]
    base_url: Option<String>,

    /// Keep the session in memory only
    #[arg(long, global = true)]
    ephemeral: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with username and password
    Login {
        /// Admin user name (usually an email)
        username: String,

        /// Password
        #[arg(long, env = "SHOP_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Log out and clear cached credentials
    Logout,

    /// Show current session status
    Status,

    /// Select the store used to scope lists
    UseStore {
        /// Store code (e.g. DEFAULT)
        code: String,
    },

    /// Write settings to the config file
    Configure {
        /// Backend base URL
        #[arg(long)]
        base_url: Option<String>,

        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// List a resource
    List {
        resource: Resource,

        /// Page number (0-based)
        #[arg(short, long)]
        page: Option<u32>,

        /// Items per page
        #[arg(short, long)]
        count: Option<u32>,
    },

    /// Fetch one or more items (fetched concurrently)
    Get {
        resource: Resource,

        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Create an item from a JSON body
    Create { resource: Resource, json: String },

    /// Replace an item with a JSON body
    Update {
        resource: Resource,
        id: String,
        json: String,
    },

    /// Delete an item
    Delete { resource: Resource, id: String },
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Persist settings given on the command line
fn configure(base_url: Option<String>, timeout: Option<u64>) -> Result<()> {
    let mut saved = Config::load_or_default()?;
    if let Some(url) = base_url {
        saved = saved.with_base_url(url)?;
    }
    if let Some(secs) = timeout {
        saved.timeout_secs = secs;
    }
    saved.save()?;
    println!("Configuration saved.");
    Ok(())
}

fn parse_body(json: &str) -> Result<serde_json::Value> {
    serde_json::from_str(json).context("Body is not valid JSON")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // `configure` must still run when the saved config or session is broken.
    let repairing = matches!(cli.command, Commands::Configure { .. });
    let mut config = if repairing {
        Config::load_or_default()?
    } else {
        Config::load()?
    };
    if let Some(ref url) = cli.base_url {
        config = config.with_base_url(url)?;
    }

    let store: Arc<dyn TokenStore> = if cli.ephemeral || repairing {
        Arc::new(MemoryTokenStore::default())
    } else {
        Arc::new(FileTokenStore::open(Config::session_path()?)?)
    };
    let client = AdminClient::from_config(&config, store)?;
    let crud = CrudService::new(client.clone());

    match cli.command {
        Commands::Login { username, password } => {
            tracing::info!("Signing in to {}...", client.base_url());
            auth::login(&client, &config, &username, &password).await?;
        }
        Commands::Logout => {
            auth::logout(&client);
        }
        Commands::Status => {
            auth::status(&client);
        }
        Commands::UseStore { code } => {
            auth::use_store(&client, &code)?;
        }
        Commands::List {
            resource,
            page,
            count,
        } => {
            let list: serde_json::Value = crud.list(resource, Page { page, count }).await?;
            print_json(&list)?;
        }
        Commands::Get { resource, ids } => {
            let mut failed = 0;
            for (id, result) in ids.iter().zip(crud.get_many(resource, &ids).await) {
                match result {
                    Ok(item) => print_json(&item)?,
                    Err(e) => {
                        failed += 1;
                        eprintln!("{} {}: {}", resource.path(), id, e);
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{} of {} item(s) could not be fetched", failed, ids.len());
            }
        }
        Commands::Create { resource, json } => {
            let created = crud.create(resource, parse_body(&json)?).await?;
            print_json(&created)?;
        }
        Commands::Update { resource, id, json } => {
            let updated = crud.update(resource, &id, parse_body(&json)?).await?;
            print_json(&updated)?;
        }
        Commands::Delete { resource, id } => {
            crud.delete(resource, &id).await?;
            println!("Deleted {}/{}.", resource.path(), id);
        }
        Commands::Configure { base_url, timeout } => {
            configure(base_url, timeout)?;
        }
    }

    tracing::debug!(refreshes = client.refresh_count(), "Done");
    Ok(())
}
