//! gNMI server binary.
//!
//! Serves echo handlers for the `openconfig` and default origins. With TLS
//! enabled, certificates are read from the mounted-secret directory.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use gnmi_server::config::{read_config, validate_config, AppConfig, ConfigError, EnvSource};
use gnmi_server::demo;
use gnmi_server::lifecycle::{spawn_signal_handler, Shutdown};
use gnmi_server::observability::{logging, metrics};
use gnmi_server::proto::gnmi::update_result::Operation;
use gnmi_server::{DirSecretStore, GrpcServer};

#[derive(Debug, Parser)]
#[command(name = "gnmi-server", version, about = "gNMI and gRPC health server")]
struct Args {
    /// TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the config file.
    #[arg(short, long)]
    address: Option<String>,

    /// Serve plaintext HTTP/2.
    #[arg(long)]
    insecure: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(address) = args.address {
        config.server.address = address;
    }
    if args.insecure {
        config.server.insecure = true;
    }
    config.server = config.server.resolve(&EnvSource);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gnmi-server starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    tracing::info!(
        address = %config.server.address,
        insecure = config.server.insecure,
        namespace = %config.server.namespace,
        certificate_secret = %config.server.certificate_secret,
        max_rpc = config.server.max_rpc,
        timeout_secs = config.server.timeout_secs,
        "Configuration loaded"
    );

    let mut server = GrpcServer::new(config.server.clone())
        .with_check_handler(demo::serving_check());
    for origin in ["openconfig", ""] {
        server = server
            .with_read_handler(origin, demo::echo_read())
            .with_update_handler(origin, demo::echo_update(Operation::Update))
            .with_replace_handler(origin, demo::echo_update(Operation::Replace))
            .with_delete_handler(origin, demo::echo_delete());
    }
    if !config.server.insecure {
        server = server.with_secret_store(Arc::new(DirSecretStore::new(&config.secrets.directory)));
    }

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());
    server.start(shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
