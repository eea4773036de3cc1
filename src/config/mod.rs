//! Node configuration
//!
//! Chain constants plus per-node settings read from the environment.
//! The config is a plain value handed to whoever needs it; handlers and
//! timers never reach for process-wide state.

use std::env;

/// Number of leading zero bits a valid block hash must carry.
pub const INITIAL_DIFFICULTY: u32 = 16;

/// Coins granted by the coinbase transaction of every block.
pub const MINING_REWARD: u64 = 100;

/// Payload of the genesis block; also the address its coinbase pays.
pub const GENESIS_DATA: &str = "forgechain-genesis";

const NODE_IP_KEY: &str = "NODE_IP";
const NODE_PORT_KEY: &str = "NODE_PORT";
const DATA_DIR_KEY: &str = "DATA_DIR";
const POW_WORKERS_KEY: &str = "POW_WORKERS";
const CACHE_CAPACITY_KEY: &str = "CACHE_CAPACITY";

const DEFAULT_IP: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "5000";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_POW_WORKERS: usize = 4;
const DEFAULT_CACHE_CAPACITY: usize = 10;

/// Per-node runtime settings.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Ip the gossip listener binds to
    pub listen_ip: String,
    /// Port the gossip listener binds to
    pub listen_port: String,
    /// Directory holding the sled database and the wallet file
    pub data_dir: String,
    /// Concurrent proof-of-work search workers (minimum 1)
    pub pow_workers: usize,
    /// Capacity of the block admission cache
    pub cache_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            listen_ip: DEFAULT_IP.to_string(),
            listen_port: DEFAULT_PORT.to_string(),
            data_dir: DEFAULT_DATA_DIR.to_string(),
            pow_workers: DEFAULT_POW_WORKERS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl NodeConfig {
    /// Build a config from environment variables, falling back to defaults.
    pub fn from_env() -> NodeConfig {
        let mut config = NodeConfig::default();
        if let Ok(ip) = env::var(NODE_IP_KEY) {
            config.listen_ip = ip;
        }
        if let Ok(port) = env::var(NODE_PORT_KEY) {
            config.listen_port = port;
        }
        if let Ok(dir) = env::var(DATA_DIR_KEY) {
            config.data_dir = dir;
        }
        if let Ok(workers) = env::var(POW_WORKERS_KEY) {
            if let Ok(workers) = workers.parse::<usize>() {
                config.pow_workers = workers.max(1);
            }
        }
        if let Ok(capacity) = env::var(CACHE_CAPACITY_KEY) {
            if let Ok(capacity) = capacity.parse::<usize>() {
                config.cache_capacity = capacity.max(1);
            }
        }
        config
    }

    /// "ip:port" string of the gossip listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_ip, self.listen_port)
    }

    /// Sled database path for a node storing under `data_dir`.
    pub fn db_path(&self) -> String {
        format!("{}/chain", self.data_dir)
    }

    /// Wallet file path for a node storing under `data_dir`.
    pub fn wallet_path(&self) -> String {
        format!("{}/wallet.dat", self.data_dir)
    }
}
