use hashbrown::{HashMap, HashSet};
use indexmap::IndexMap;

use crate::entity::Entity;
use crate::entity_id::EntityId;

#[derive(Debug, Copy, Clone)]
pub struct TypeDescriptor {
    pub persistent: bool,
}

/// Unknown entity type at create time is a programmer error per the error taxonomy: it panics
/// rather than returning a recoverable error, the same way a duplicate id does.
#[derive(Debug)]
pub enum RegistryError {
    UnknownType(&'static str),
    DuplicateId(EntityId),
}

/// `type name -> descriptor` and `EntityID -> live entity`, scoped to one game process.
#[derive(Default)]
pub struct EntityRegistry {
    descriptors: HashMap<&'static str, TypeDescriptor>,
    entities: IndexMap<EntityId, Entity>,
    by_type: HashMap<&'static str, HashSet<EntityId>>,
}

impl EntityRegistry {
    pub fn new() -> EntityRegistry {
        EntityRegistry::default()
    }

    pub fn register_type(&mut self, type_name: &'static str, persistent: bool) {
        self.descriptors.insert(type_name, TypeDescriptor { persistent });
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.descriptors.contains_key(type_name)
    }

    /// Resolves a runtime type-name string (as carried over the wire in a cross-game create
    /// request) back to the canonical `&'static str` key types are registered under, so the
    /// caller can build an `Entity` without leaking a new string per request.
    pub fn resolve_type_name(&self, name: &str) -> Option<&'static str> {
        self.descriptors.keys().find(|k| **k == name).copied()
    }

    /// Synchronous local creation: mints nothing itself, the caller supplies the id (so callers
    /// that need a shard-targeted id can mint it first and pass it in), places the entity into
    /// the registry and indexes it by type.
    pub fn create_locally(&mut self, mut entity: Entity) -> Result<EntityId, RegistryError> {
        let descriptor = self
            .descriptors
            .get(entity.type_name)
            .copied()
            .ok_or(RegistryError::UnknownType(entity.type_name))?;

        if self.entities.contains_key(&entity.id) {
            return Err(RegistryError::DuplicateId(entity.id));
        }

        entity.persistent = descriptor.persistent;
        let id = entity.id;
        let type_name = entity.type_name;
        entity.activate();

        self.entities.insert(id, entity);
        self.by_type.entry(type_name).or_default().insert(id);
        Ok(id)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn destroy(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.entities.shift_remove(&id)?;
        if let Some(set) = self.by_type.get_mut(entity.type_name) {
            set.remove(&id);
        }
        Some(entity)
    }

    pub fn ids_of_type(&self, type_name: &str) -> Vec<EntityId> {
        self.by_type.get(type_name).map(|s| s.iter().copied().collect()).unwrap_or_default()
    }

    pub fn count_of_type(&self, type_name: &str) -> usize {
        self.by_type.get(type_name).map(HashSet::len).unwrap_or(0)
    }

    pub fn all_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    /// Entity ids local to this game whose shard matches `shard_id` -- used both to answer
    /// `EntityIDsForDispatcher` during reconnect and to select entities for a freeze dump.
    pub fn ids_for_shard(&self, shard_id: u16, shard_count: u16) -> Vec<EntityId> {
        self.entities.keys().copied().filter(|id| id.shard(shard_count) == shard_id).collect()
    }

    pub fn dirty_entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values().filter(|e| e.is_dirty())
    }

    pub fn snapshot_all(&self) -> IndexMap<EntityId, &Entity> {
        self.entities.iter().map(|(id, e)| (*id, e)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity_id::EntityId;

    fn avatar(id: EntityId, space: EntityId) -> Entity {
        Entity::new("Avatar", id, space, true)
    }

    #[test]
    fn resolve_type_name_finds_registered_name() {
        let mut reg = EntityRegistry::new();
        reg.register_type("Avatar", true);
        assert_eq!(reg.resolve_type_name("Avatar"), Some("Avatar"));
        assert_eq!(reg.resolve_type_name("Ghost"), None);
    }

    #[test]
    fn create_rejects_unknown_type() {
        let mut reg = EntityRegistry::new();
        let space = EntityId::nil_space_for_game(1);
        let err = reg.create_locally(avatar(EntityId::generate(), space));
        assert!(matches!(err, Err(RegistryError::UnknownType("Avatar"))));
    }

    #[test]
    fn create_rejects_duplicate_id() {
        let mut reg = EntityRegistry::new();
        reg.register_type("Avatar", true);
        let space = EntityId::nil_space_for_game(1);
        let id = EntityId::generate();

        reg.create_locally(avatar(id, space)).unwrap();
        let err = reg.create_locally(avatar(id, space));
        assert!(matches!(err, Err(RegistryError::DuplicateId(_))));
    }

    #[test]
    fn destroy_removes_from_type_index() {
        let mut reg = EntityRegistry::new();
        reg.register_type("Avatar", true);
        let space = EntityId::nil_space_for_game(1);
        let id = reg.create_locally(avatar(EntityId::generate(), space)).unwrap();

        assert_eq!(reg.count_of_type("Avatar"), 1);
        reg.destroy(id);
        assert_eq!(reg.count_of_type("Avatar"), 0);
        assert!(!reg.contains(id));
    }

    #[test]
    fn ids_for_shard_filters_by_hash() {
        let mut reg = EntityRegistry::new();
        reg.register_type("Avatar", true);
        let space = EntityId::nil_space_for_game(1);

        for _ in 0..50 {
            reg.create_locally(avatar(EntityId::generate(), space)).unwrap();
        }

        let shard_count = 4;
        let mut total = 0;
        for shard in 0..shard_count {
            let ids = reg.ids_for_shard(shard, shard_count);
            total += ids.len();
            assert!(ids.iter().all(|id| id.shard(shard_count) == shard));
        }
        assert_eq!(total, 50);
    }
}
