use crate::attr::AttrMap;
use crate::client_id::ClientId;
use crate::entity_id::EntityId;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LifecycleState {
    Created,
    Live,
    Migrating,
    Freezing,
    Destroying,
    Terminal,
}

/// The unit of addressable state. A `Space` is just an `Entity` whose type was registered with
/// `RegisterSpace`; `kind` is only meaningful on those.
pub struct Entity {
    pub type_name: &'static str,
    pub id: EntityId,
    pub owner: Option<ClientId>,
    pub space: EntityId,
    pub attrs: AttrMap,
    pub persistent: bool,
    pub state: LifecycleState,
}

impl Entity {
    pub fn new(type_name: &'static str, id: EntityId, space: EntityId, persistent: bool) -> Entity {
        Entity {
            type_name,
            id,
            owner: None,
            space,
            attrs: AttrMap::new(),
            persistent,
            state: LifecycleState::Created,
        }
    }

    pub fn activate(&mut self) {
        debug_assert_eq!(self.state, LifecycleState::Created);
        self.state = LifecycleState::Live;
    }

    pub fn is_dirty(&self) -> bool {
        self.persistent && self.attrs.is_dirty()
    }

    pub fn begin_migrating(&mut self) {
        debug_assert_eq!(self.state, LifecycleState::Live);
        self.state = LifecycleState::Migrating;
    }

    /// Closes out a migration started with `begin_migrating` once the entity has a home on its
    /// new game.
    pub fn finish_migrating(&mut self) {
        debug_assert_eq!(self.state, LifecycleState::Migrating);
        self.state = LifecycleState::Live;
    }

    pub fn begin_freezing(&mut self) {
        debug_assert_eq!(self.state, LifecycleState::Live);
        self.state = LifecycleState::Freezing;
    }

    pub fn begin_destroying(&mut self) {
        self.state = LifecycleState::Destroying;
    }

    pub fn finish(&mut self) {
        self.state = LifecycleState::Terminal;
    }

    /// An entity bound to a client must be detached (or destroyed) before that client fully
    /// disconnects; this just answers whether that has happened yet.
    pub fn is_bound_to_client(&self) -> bool {
        self.owner.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::Attr;

    fn make_entity() -> Entity {
        let space = EntityId::nil_space_for_game(1);
        Entity::new("Avatar", EntityId::generate(), space, true)
    }

    #[test]
    fn new_entity_starts_created_and_clean() {
        let e = make_entity();
        assert_eq!(e.state, LifecycleState::Created);
        assert!(!e.is_dirty());
    }

    #[test]
    fn dirty_only_applies_to_persistent_entities() {
        let mut e = make_entity();
        e.persistent = false;
        e.attrs.set("hp", Attr::Int(5));
        assert!(!e.is_dirty());

        e.persistent = true;
        e.attrs.set("hp", Attr::Int(6));
        assert!(e.is_dirty());
    }

    #[test]
    fn unbound_entity_reports_no_owner() {
        let e = make_entity();
        assert!(!e.is_bound_to_client());
    }

    #[test]
    fn migration_round_trips_to_live() {
        let mut e = make_entity();
        e.activate();
        e.begin_migrating();
        assert_eq!(e.state, LifecycleState::Migrating);
        e.finish_migrating();
        assert_eq!(e.state, LifecycleState::Live);
    }
}
