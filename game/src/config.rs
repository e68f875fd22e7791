use std::path::Path;

use serde_derive::{Deserialize, Serialize};

fn default_save_interval() -> u64 {
    5
}

fn default_freeze_dir() -> String {
    "./freeze".to_string()
}

fn default_entity_types() -> Vec<EntityTypeConfig> {
    Vec::new()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherCluster {
    /// `host:port` of each dispatcher shard, indexed by shard id.
    pub shard_addrs: Vec<String>,
}

/// One entry of the type table a deployment registers at startup. This binary carries no entity
/// business logic of its own -- types, their attribute schemas and methods, live in the embedder
/// -- so the config is the only place a type name can come from before `main` calls
/// `register_type`/`register_service_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTypeConfig {
    pub name: String,
    #[serde(default)]
    pub persistent: bool,
    /// Registers via `register_service_type` (reconciler-managed singleton/sharded service)
    /// instead of a plain `register_type`.
    #[serde(default)]
    pub service: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSettings {
    #[serde(default = "default_save_interval")]
    pub save_interval_secs: u64,
    #[serde(default = "default_freeze_dir")]
    pub freeze_dir: String,
    #[serde(default = "default_entity_types")]
    pub entity_types: Vec<EntityTypeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    pub dispatcher: DispatcherCluster,
    #[serde(default = "default_game_settings")]
    pub game: GameSettings,
}

fn default_game_settings() -> GameSettings {
    GameSettings { save_interval_secs: default_save_interval(), freeze_dir: default_freeze_dir(), entity_types: default_entity_types() }
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig {
            dispatcher: DispatcherCluster { shard_addrs: vec!["127.0.0.1:28001".to_string()] },
            game: default_game_settings(),
        }
    }
}

impl GameConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<GameConfig, serdeconv::Error> {
        serdeconv::from_toml_file(path)
    }
}
