//! kvdesk: edit Consul key/value trees without clobbering concurrent changes.
//!
//! Usage:
//!   kvdesk servers add --name local --host localhost
//!   kvdesk get local > tree.json
//!   cp tree.json edited.json && $EDITOR edited.json
//!   kvdesk save local --initial tree.json --edited edited.json
//!
//! Command output is JSON on stdout; logs go to stderr.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use kvdesk_cli::commands::{self, CommandResponse};
use kvdesk_registry::{ClientRegistry, RegistryConfig};
use kvdesk_sync::store::ConsulStoreConfig;
use kvdesk_sync::{SyncConfig, SyncEngine, diff};
use kvdesk_types::{ConsulClient, Host, Port, Scheme, TreeSnapshot};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "kvdesk")]
#[command(about = "Edit Consul key/value trees safely")]
struct Args {
    /// Directory holding servers.json (default: ~/.kvdesk)
    #[arg(long, global = true)]
    registry_dir: Option<PathBuf>,

    /// Consul ACL token
    #[arg(long, global = true)]
    token: Option<String>,

    /// Consul datacenter
    #[arg(long, global = true)]
    datacenter: Option<String>,

    /// Deadline for each Consul call, in milliseconds
    #[arg(long, global = true, default_value = "10000")]
    timeout_ms: u64,

    /// Maximum writes in flight at once
    #[arg(long, global = true, default_value = "8")]
    concurrency: usize,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage known servers
    Servers {
        #[command(subcommand)]
        action: ServersAction,
    },
    /// Print the live tree of a server as nested JSON
    Get {
        /// Server name from the registry
        server: String,
    },
    /// Push the edits between two trees to a server
    Save {
        /// Server name from the registry
        server: String,
        /// Tree as it was loaded
        #[arg(long)]
        initial: PathBuf,
        /// Tree after editing
        #[arg(long)]
        edited: PathBuf,
        /// Classify against the live tree without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the per-key delta between two trees
    Diff {
        #[arg(long)]
        initial: PathBuf,
        #[arg(long)]
        edited: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum ServersAction {
    /// List known servers
    List,
    /// Add a server, replacing one with the same address
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        host: String,
        #[arg(long, default_value = "8500")]
        port: u32,
        #[arg(long, value_enum, default_value = "http")]
        scheme: SchemeArg,
    },
    /// Remove a server by name
    Remove { name: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SchemeArg {
    Http,
    Https,
}

impl From<SchemeArg> for Scheme {
    fn from(arg: SchemeArg) -> Self {
        match arg {
            SchemeArg::Http => Scheme::Http,
            SchemeArg::Https => Scheme::Https,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Runs the command. `Ok(false)` means the command ran but reported an
/// error or an unclean save.
async fn run(args: Args) -> Result<bool> {
    let registry_config = RegistryConfig {
        app_dir: args.registry_dir.clone(),
        ..Default::default()
    };
    let engine = SyncEngine::with_consul(
        ConsulStoreConfig {
            acl_token: args.token.clone(),
            datacenter: args.datacenter.clone(),
            ..Default::default()
        },
        SyncConfig {
            request_timeout_ms: args.timeout_ms,
            max_concurrent_writes: args.concurrency,
        },
    );

    match args.command {
        Command::Servers { action } => servers(action, &registry_config),
        Command::Get { server } => {
            let client = resolve_server(&registry_config, &server)?;
            let response =
                commands::get_values(&engine, json!({ "consul_client": client })).await;
            print_response(&response)
        }
        Command::Save {
            server,
            initial,
            edited,
            dry_run,
        } => {
            let client = resolve_server(&registry_config, &server)?;
            let payload = json!({
                "consul_client": client,
                "initial_values": read_json(&initial)?,
                "new_values": read_json(&edited)?,
            });

            if dry_run {
                let response = commands::preview_values(&engine, payload).await;
                return print_response(&response);
            }

            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted; no further writes will be issued");
                    trigger.cancel();
                }
            });

            let response = commands::save_values_cancellable(&engine, payload, &cancel).await;
            let clean = match &response {
                CommandResponse::Ok { data, .. } => data.result.is_clean(),
                CommandResponse::Err { .. } => false,
            };
            print_response(&response)?;
            Ok(clean)
        }
        Command::Diff { initial, edited } => {
            let initial = TreeSnapshot::from_nested_value(&read_json(&initial)?)
                .context("Invalid initial tree")?;
            let edited = TreeSnapshot::from_nested_value(&read_json(&edited)?)
                .context("Invalid edited tree")?;
            print_json(&diff(&initial, &edited))?;
            Ok(true)
        }
    }
}

fn servers(action: ServersAction, config: &RegistryConfig) -> Result<bool> {
    match action {
        ServersAction::List => print_response(&commands::list_clients(config)),
        ServersAction::Add {
            name,
            host,
            port,
            scheme,
        } => {
            let client = ConsulClient::new(Host::new(host)?, Port::new(port)?, scheme.into())
                .with_name(name);
            let mut registry = ClientRegistry::open(config.clone())?;
            if registry.upsert(client.clone())? {
                info!("Replaced {}", client);
            } else {
                info!("Added {}", client);
            }
            Ok(true)
        }
        ServersAction::Remove { name } => {
            let mut registry = ClientRegistry::open(config.clone())?;
            let Some(client) = registry.find(&name).cloned() else {
                bail!("no server named {name:?}");
            };
            registry.remove(&client)?;
            info!("Removed {}", client);
            Ok(true)
        }
    }
}

fn resolve_server(config: &RegistryConfig, name: &str) -> Result<ConsulClient> {
    let registry = ClientRegistry::open(config.clone()).context("Failed to open registry")?;
    registry
        .find(name)
        .cloned()
        .with_context(|| format!("no server named {name:?}; see `kvdesk servers list`"))
}

fn read_json(path: &Path) -> Result<Value> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_response<T: Serialize>(response: &CommandResponse<T>) -> Result<bool> {
    print_json(response)?;
    Ok(response.is_ok())
}
