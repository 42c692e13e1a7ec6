//! ORAKEL Node Binary

use clap::{Parser, Subcommand};
use orakel_core::{NodeConfig, StorageBackend};
use orakel_node::NodeBuilder;
use orakel_oracle::GenesisConfig;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "orakel-node")]
#[command(about = "ORAKEL Node - commit-reveal exchange rate oracle")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node
    Run {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Genesis file path
        #[arg(short, long)]
        genesis: Option<PathBuf>,

        /// API listen address
        #[arg(long)]
        api_addr: Option<String>,

        /// Data directory
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// State backend: memory or sled
        #[arg(long)]
        storage: Option<String>,
    },

    /// Generate genesis configuration
    Genesis {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Chain ID
        #[arg(long, default_value = "orakel-devnet")]
        chain_id: String,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn parse_storage(value: &str) -> anyhow::Result<StorageBackend> {
    match value {
        "memory" => Ok(StorageBackend::Memory),
        "sled" => Ok(StorageBackend::Sled),
        other => anyhow::bail!("unknown storage backend: {}", other),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            genesis,
            api_addr,
            data_dir,
            storage,
        } => {
            let mut node_config = match config {
                Some(path) => NodeConfig::from_json(&std::fs::read_to_string(&path)?)?,
                None => NodeConfig::default(),
            };
            if let Some(addr) = api_addr {
                node_config.api.listen_addr = addr;
            }
            if let Some(dir) = data_dir {
                node_config.data_dir = dir;
            }
            if let Some(storage) = storage {
                node_config.storage = parse_storage(&storage)?;
            }

            init_logging(&node_config.log_level);
            info!("Starting ORAKEL Node...");

            let genesis_config = match genesis {
                Some(path) => GenesisConfig::from_json(&std::fs::read_to_string(&path)?)?,
                None => GenesisConfig::devnet(),
            };

            let node = NodeBuilder::new()
                .config(node_config)
                .genesis(genesis_config)
                .build()?;

            node.start().await?;
        }

        Commands::Genesis { output, chain_id } => {
            let genesis = GenesisConfig {
                chain_id,
                ..GenesisConfig::devnet()
            };

            std::fs::write(&output, genesis.to_json()?)?;

            println!("Genesis configuration saved to: {}", output.display());
        }
    }

    Ok(())
}
