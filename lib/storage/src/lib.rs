pub mod entity_store;
pub mod error;
pub mod kv;
pub mod rank;

pub use entity_store::EntityStore;
pub use error::{is_connection_error, StorageError};
pub use kv::KvBackend;
pub use rank::{KvItem, RankBackend};
