use entity::EntityId;

use crate::error::StorageError;

/// `(type, EntityID) -> serialized attribute tree`. Concrete backends (file, Redis, ...) are out
/// of scope for this crate; this trait is the contract a game's persistence layer programs
/// against.
pub trait EntityStore: Send {
    fn write(&mut self, type_name: &str, id: EntityId, data: &[u8]) -> Result<(), StorageError>;
    fn read(&mut self, type_name: &str, id: EntityId) -> Result<Vec<u8>, StorageError>;
    fn exists(&mut self, type_name: &str, id: EntityId) -> Result<bool, StorageError>;
    fn list_entity_ids(&mut self, type_name: &str) -> Result<Vec<EntityId>, StorageError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;

    /// In-memory `EntityStore` used by game-crate tests; not a production backend.
    #[derive(Default)]
    pub struct MockEntityStore {
        data: HashMap<(String, EntityId), Vec<u8>>,
    }

    impl EntityStore for MockEntityStore {
        fn write(&mut self, type_name: &str, id: EntityId, data: &[u8]) -> Result<(), StorageError> {
            self.data.insert((type_name.to_string(), id), data.to_vec());
            Ok(())
        }

        fn read(&mut self, type_name: &str, id: EntityId) -> Result<Vec<u8>, StorageError> {
            self.data
                .get(&(type_name.to_string(), id))
                .cloned()
                .ok_or(StorageError::NotFound)
        }

        fn exists(&mut self, type_name: &str, id: EntityId) -> Result<bool, StorageError> {
            Ok(self.data.contains_key(&(type_name.to_string(), id)))
        }

        fn list_entity_ids(&mut self, type_name: &str) -> Result<Vec<EntityId>, StorageError> {
            Ok(self.data.keys().filter(|(t, _)| t == type_name).map(|(_, id)| *id).collect())
        }
    }

    #[test]
    fn write_then_read_roundtrips() {
        let mut store = MockEntityStore::default();
        let id = EntityId::generate();
        store.write("Avatar", id, b"payload").unwrap();
        assert_eq!(store.read("Avatar", id).unwrap(), b"payload");
        assert!(store.exists("Avatar", id).unwrap());
    }

    #[test]
    fn list_entity_ids_filters_by_type() {
        let mut store = MockEntityStore::default();
        let a = EntityId::generate();
        let b = EntityId::generate();
        store.write("Avatar", a, b"x").unwrap();
        store.write("Matchmaker", b, b"y").unwrap();

        let ids = store.list_entity_ids("Avatar").unwrap();
        assert_eq!(ids, vec![a]);
    }
}
