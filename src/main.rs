//! Endpoint router.
//!
//! Keeps one listener per configured bind running, following the endpoint
//! catalog as it changes.
//!
//! # Architecture Overview
//!
//! ```text
//!   add-endpoint / delete-endpoint
//!              │
//!              ▼
//!   ┌────────────────────┐   change   ┌────────────────────┐
//!   │  catalog (JSON)    │──────────▶│  catalog watcher   │
//!   │  app/cluster/svc/… │            └─────────┬──────────┘
//!   └────────────────────┘                      │ Vec<Endpoint>
//!                                               ▼
//!                                 ┌──────────────────────────┐
//!                                 │  reconciliation engine   │──▶ status events
//!                                 │  name → listeners        │
//!                                 └────────────┬─────────────┘
//!                                              │ start / stop
//!                                              ▼
//!                                 ┌──────────────────────────┐
//!                                 │  listeners ×N            │
//!                                 │  default handler (200)   │
//!                                 └──────────────────────────┘
//! ```

use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use endpoint_router::catalog::{EndpointCatalog, FileStore, KeyPrefix, TlsMaterial};
use endpoint_router::config::validation::validate_config;
use endpoint_router::config::{load_config, ConfigError, RouterConfig};
use endpoint_router::endpoint::Bind;
use endpoint_router::lifecycle::{self, signals, Shutdown};
use endpoint_router::observability::logging;

#[derive(Parser)]
#[command(name = "endpoint-router")]
#[command(about = "Keeps network listeners in line with an endpoint catalog", long_about = None)]
struct Cli {
    /// Router configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Catalog file, overrides `catalog.path`.
    #[arg(long, global = true)]
    catalog: Option<String>,

    /// Overrides `catalog.app_id`.
    #[arg(long, global = true)]
    app_id: Option<String>,

    /// Overrides `catalog.cluster_id`.
    #[arg(long, global = true)]
    cluster_id: Option<String>,

    /// Overrides `observability.log_level`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the router's version
    Version,
    /// Start the router and follow the catalog
    Start,
    /// Add a node of a service to the catalog
    AddEndpoint(AddEndpointArgs),
    /// Show the catalog
    ListEndpoints,
    /// Delete a service with all its nodes from the catalog
    DeleteEndpoint {
        /// Name of the service
        #[arg(long)]
        service_name: String,
    },
}

#[derive(Args)]
struct AddEndpointArgs {
    /// Name of the service
    #[arg(long)]
    service_name: String,

    /// Name of the node
    #[arg(long)]
    node_name: String,

    /// IP address of the endpoint
    #[arg(long)]
    ip: IpAddr,

    /// Port of the endpoint
    #[arg(long)]
    port: u16,

    /// Path to TLS certificate file
    #[arg(long, requires_all = ["tls_chain", "tls_key"])]
    tls_cert: Option<PathBuf>,

    /// Path to TLS chain file
    #[arg(long, requires_all = ["tls_cert", "tls_key"])]
    tls_chain: Option<PathBuf>,

    /// Path to TLS key file
    #[arg(long, requires_all = ["tls_cert", "tls_chain"])]
    tls_key: Option<PathBuf>,
}

impl AddEndpointArgs {
    fn tls_material(&self) -> Result<Option<TlsMaterial>, std::io::Error> {
        let (Some(cert), Some(chain), Some(key)) = (&self.tls_cert, &self.tls_chain, &self.tls_key) else {
            return Ok(None);
        };
        Ok(Some(TlsMaterial {
            cert: read(cert)?,
            chain: read(chain)?,
            key: read(key)?,
        }))
    }
}

fn read(path: &Path) -> Result<Vec<u8>, std::io::Error> {
    fs::read(path).map_err(|e| std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))
}

impl Cli {
    fn router_config(&self) -> Result<RouterConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => RouterConfig::default(),
        };
        if let Some(catalog) = &self.catalog {
            config.catalog.path = catalog.clone();
        }
        if let Some(app_id) = &self.app_id {
            config.catalog.app_id = app_id.clone();
        }
        if let Some(cluster_id) = &self.cluster_id {
            config.catalog.cluster_id = cluster_id.clone();
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

fn open_catalog(config: &RouterConfig) -> Result<EndpointCatalog, Box<dyn std::error::Error>> {
    let store = Arc::new(FileStore::open(&config.catalog.path)?);
    let prefix = KeyPrefix::new(config.catalog.app_id.as_str(), config.catalog.cluster_id.as_str())?;
    Ok(EndpointCatalog::new(store, prefix))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    if let Commands::Version = cli.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = cli.router_config()?;
    logging::init_logging(&config.observability);

    match cli.command {
        // Printed above, before any configuration is read.
        Commands::Version => {}
        Commands::Start => {
            tracing::info!("endpoint-router v{} starting", env!("CARGO_PKG_VERSION"));
            let shutdown = Shutdown::new();
            signals::spawn_signal_handler(shutdown.clone());
            println!("Router started");
            lifecycle::run(config, shutdown).await?;
        }
        Commands::AddEndpoint(args) => {
            let catalog = open_catalog(&config)?;
            let tls = args.tls_material()?;
            catalog.add_endpoint(
                &args.service_name,
                &args.node_name,
                Bind::new(args.ip, args.port),
                tls.as_ref(),
            )?;
            println!("Endpoint was added");
        }
        Commands::ListEndpoints => {
            let catalog = open_catalog(&config)?;
            println!("{}", serde_json::to_string_pretty(&catalog.list_tree()?)?);
        }
        Commands::DeleteEndpoint { service_name } => {
            let catalog = open_catalog(&config)?;
            if catalog.delete_endpoint(&service_name)? {
                println!("Endpoint was removed");
            } else {
                println!("No endpoint named {service_name}");
            }
        }
    }

    Ok(())
}
