//! Full node implementation

use crate::api::start_api_server;
use crate::runtime::NodeRuntime;
use orakel_core::{NodeConfig, StorageBackend};
use orakel_oracle::GenesisConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{debug, error, info};

/// Full ORAKEL node
pub struct OrakelNode {
    runtime: Arc<NodeRuntime>,
}

impl OrakelNode {
    /// Create a new node
    pub fn new(config: NodeConfig, genesis: GenesisConfig) -> anyhow::Result<Self> {
        let runtime = Arc::new(NodeRuntime::new(config, genesis)?);
        Ok(Self { runtime })
    }

    /// Run until ctrl-c
    pub async fn start(&self) -> anyhow::Result<()> {
        info!("Starting ORAKEL node {}...", self.runtime.config().name);

        let api_handle = if self.runtime.config().api.enabled {
            let api_runtime = self.runtime.clone();
            let api_addr = self.runtime.config().api.listen_addr.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = start_api_server(api_runtime, &api_addr).await {
                    error!("API server error: {}", e);
                }
            }))
        } else {
            None
        };

        let block_runtime = self.runtime.clone();
        let block_time = Duration::from_millis(self.runtime.config().block_time_ms);
        let block_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(block_time);
            loop {
                ticker.tick().await;
                match block_runtime.produce_block() {
                    Ok(summary) => {
                        if let Some(tally) = &summary.tally {
                            info!(
                                "Period {} tallied: {} rates published",
                                tally.period,
                                tally.published().count()
                            );
                        }
                        debug!("Block {} produced", summary.height);
                    }
                    Err(e) => error!("Block production failed: {}", e),
                }
            }
        });

        info!("Node started successfully");
        info!("Chain ID: {}", self.runtime.chain_id());
        info!(
            "Validators: {} (total power {})",
            self.runtime.validators().len(),
            self.runtime.total_power()
        );

        // Wait for shutdown signal
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, stopping node...");
            }
            Err(e) => {
                error!("Error waiting for shutdown signal: {}", e);
            }
        }

        block_handle.abort();
        if let Some(handle) = api_handle {
            handle.abort();
        }

        info!("Node stopped at height {}", self.runtime.height());

        Ok(())
    }

    /// Get runtime reference
    pub fn runtime(&self) -> &Arc<NodeRuntime> {
        &self.runtime
    }
}

/// Node builder for easier configuration
pub struct NodeBuilder {
    config: NodeConfig,
    genesis: GenesisConfig,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self {
            config: NodeConfig::default(),
            genesis: GenesisConfig::devnet(),
        }
    }

    pub fn config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn genesis(mut self, genesis: GenesisConfig) -> Self {
        self.genesis = genesis;
        self
    }

    pub fn api_addr(mut self, addr: &str) -> Self {
        self.config.api.listen_addr = addr.to_string();
        self
    }

    pub fn data_dir(mut self, dir: PathBuf) -> Self {
        self.config.data_dir = dir;
        self
    }

    pub fn storage(mut self, storage: StorageBackend) -> Self {
        self.config.storage = storage;
        self
    }

    pub fn build(self) -> anyhow::Result<OrakelNode> {
        OrakelNode::new(self.config, self.genesis)
    }
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
