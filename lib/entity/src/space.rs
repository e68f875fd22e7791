use crate::entity::Entity;
use crate::entity_id::EntityId;

pub type SpaceKind = u16;

pub const NIL_SPACE_KIND: SpaceKind = 0;
pub const NIL_SPACE_TYPE: &str = "__NilSpace__";

/// A `Space` is an ordinary `Entity` whose type was registered through `RegisterSpace`; `kind`
/// just partitions entities for spatial queries. Every game owns exactly one nil space (kind 0)
/// at a fixed, deterministic id, so newly created entities always have somewhere to live before
/// anything else exists.
///
/// Built `Created`, not `Live` -- the caller registers `NIL_SPACE_TYPE` and runs this through
/// `EntityRegistry::create_locally` like any other entity, so activation happens exactly once.
pub fn new_nil_space(gid: u16) -> Entity {
    let id = EntityId::nil_space_for_game(gid);
    Entity::new(NIL_SPACE_TYPE, id, id, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_space_is_its_own_space() {
        let space = new_nil_space(3);
        assert_eq!(space.space, space.id);
        assert_eq!(space.id, EntityId::nil_space_for_game(3));
    }
}
