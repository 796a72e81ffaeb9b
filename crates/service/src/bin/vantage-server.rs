//! Run one node of the health observation exchange.

use std::path::PathBuf;

use clap::Parser;
use rand::Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vantage_service::HealthNode;
use vantage_types::NodeConfig;

#[derive(Parser)]
#[command(name = "vantage-server", about = "Run one node of the health observation exchange")]
struct Args {
    /// Initialize the node from a JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address; a bare host gets a random port appended.
    #[arg(long, default_value = "127.0.0.1")]
    addr: String,

    /// Database path for local observations.
    #[arg(long, default_value = "vantage.db")]
    dbfile: String,

    /// Start of the random port range.
    #[arg(long, default_value_t = 10000)]
    port_start: u16,

    /// End of the random port range.
    #[arg(long, default_value_t = 30000)]
    port_end: u16,

    /// Node id; required unless a config file is given.
    id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = build_config(&args)?;

    let filter = if config.log_level.is_empty() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::new(&config.log_level)
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let node = HealthNode::new(config);
    let addr = node.start().await?;
    info!(%addr, "node running, ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    node.stop(true).await?;
    Ok(())
}

fn build_config(args: &Args) -> Result<NodeConfig, Box<dyn std::error::Error>> {
    match &args.config {
        Some(path) => {
            let mut config = NodeConfig::from_file(path)?;
            let table_addr = config
                .peers
                .get(&config.id)
                .cloned()
                .ok_or("Id is not present in Peers")?;
            if config.addr.is_empty() {
                config.addr = table_addr;
            } else if config.addr != table_addr {
                return Err("Addr disagrees with the peer table".into());
            }
            Ok(config)
        }
        None => {
            let id = args
                .id
                .clone()
                .ok_or("node id is required without --config")?;
            let addr = if args.addr.contains(':') {
                args.addr.clone()
            } else {
                let port = rand::thread_rng().gen_range(args.port_start..args.port_end);
                format!("{}:{}", args.addr, port)
            };
            Ok(NodeConfig {
                id,
                addr,
                db_file: args.dbfile.clone(),
                ..Default::default()
            })
        }
    }
}
