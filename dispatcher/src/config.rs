use std::path::Path;

use serde_derive::{Deserialize, Serialize};

fn default_port() -> u16 {
    28001
}

fn default_shard_count() -> u16 {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(default = "default_shard_count")]
    pub shard_count: u16,
    /// `host:port` of every dispatcher shard's peer-gossip listener, indexed by shard id.
    #[serde(default)]
    pub peers: Vec<String>,
    #[serde(default)]
    pub expected_games: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub server: Server,
    pub cluster: Cluster,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            server: Server { bind: default_bind(), port: default_port() },
            cluster: Cluster { shard_count: default_shard_count(), peers: Vec::new(), expected_games: 0 },
        }
    }
}

impl DispatcherConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<DispatcherConfig, serdeconv::Error> {
        serdeconv::from_toml_file(path)
    }
}
