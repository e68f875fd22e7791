use std::path::Path;

use serde_derive::{Deserialize, Serialize};

fn default_port() -> u16 {
    29001
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_heart_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherCluster {
    /// `host:port` of each dispatcher shard, indexed by shard id.
    pub shard_addrs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSettings {
    #[serde(default = "default_heart_interval_secs")]
    pub heart_interval_secs: u64,
}

fn default_gate_settings() -> GateSettings {
    GateSettings { heart_interval_secs: default_heart_interval_secs() }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    pub server: Server,
    pub dispatcher: DispatcherCluster,
    #[serde(default = "default_gate_settings")]
    pub gate: GateSettings,
}

impl Default for GateConfig {
    fn default() -> Self {
        GateConfig {
            server: Server { bind: default_bind(), port: default_port() },
            dispatcher: DispatcherCluster { shard_addrs: vec!["127.0.0.1:28001".to_string()] },
            gate: default_gate_settings(),
        }
    }
}

impl GateConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<GateConfig, serdeconv::Error> {
        serdeconv::from_toml_file(path)
    }
}
