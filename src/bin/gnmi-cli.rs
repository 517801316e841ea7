use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;

use gnmi_server::proto::gnmi::{typed_value, GetRequest, Path, SetRequest, TypedValue, Update};
use gnmi_server::proto::health::HealthCheckRequest;
use gnmi_server::GnmiClient;

#[derive(Parser)]
#[command(name = "gnmi-cli")]
#[command(about = "Query a plaintext gNMI server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "127.0.0.1:9999")]
    address: String,

    /// Per-call timeout in seconds.
    #[arg(short, long, default_value_t = 10)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read one or more paths
    Get {
        #[arg(long, default_value = "")]
        origin: String,
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Write a string value, or delete a path
    Set {
        #[arg(long, default_value = "")]
        origin: String,
        path: String,
        /// Value to write. Omit to delete the path.
        value: Option<String>,
        /// Use replace instead of update.
        #[arg(long)]
        replace: bool,
    },
    /// Probe server health
    Check {
        #[arg(long, default_value = "")]
        service: String,
    },
    /// Stream health updates until the server ends the stream
    Watch {
        #[arg(long, default_value = "")]
        service: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = GnmiClient::new(&cli.address)?.with_timeout(Duration::from_secs(cli.timeout));

    match cli.command {
        Commands::Get { origin, paths } => {
            let path = paths
                .iter()
                .map(|p| Path::parse(&origin, p))
                .collect::<Result<Vec<_>, _>>()?;
            let rsp = client
                .get(&GetRequest {
                    path,
                    ..Default::default()
                })
                .await?;
            print(&rsp)?;
        }
        Commands::Set {
            origin,
            path,
            value,
            replace,
        } => {
            let path = Path::parse(&origin, &path)?;
            let mut req = SetRequest::default();
            match value {
                Some(value) => {
                    let update = Update {
                        path: Some(path),
                        val: Some(TypedValue {
                            value: Some(typed_value::Value::StringVal(value)),
                        }),
                        ..Default::default()
                    };
                    if replace {
                        req.replace.push(update);
                    } else {
                        req.update.push(update);
                    }
                }
                None => req.delete.push(path),
            }
            let rsp = client.set(&req).await?;
            print(&rsp)?;
        }
        Commands::Check { service } => {
            let rsp = client.check(&HealthCheckRequest { service }).await?;
            print(&rsp)?;
        }
        Commands::Watch { service } => {
            let mut stream = client.watch(&HealthCheckRequest { service }).await?;
            while let Some(rsp) = stream.message().await? {
                print(&rsp)?;
            }
        }
    }

    Ok(())
}

fn print<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
