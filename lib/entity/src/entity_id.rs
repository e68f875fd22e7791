use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Opaque, globally unique 16-byte identifier. Deterministically hashes to a dispatcher shard;
/// uniqueness is generated, never derived from content, so collisions are a practical
/// impossibility rather than something callers need to guard against.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct EntityId(u128);

impl EntityId {
    #[inline]
    pub fn generate() -> EntityId {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        EntityId(u128::from_be_bytes(bytes))
    }

    #[inline]
    pub fn from_u128(value: u128) -> EntityId {
        EntityId(value)
    }

    #[inline]
    pub fn as_u128(self) -> u128 {
        self.0
    }

    pub fn to_be_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(bytes: [u8; 16]) -> EntityId {
        EntityId(u128::from_be_bytes(bytes))
    }

    /// `shard = hash(EntityID) mod N`. Uses the low bits of the id directly rather than a
    /// secondary hash function: ids are already uniformly random, so this distributes evenly
    /// across shards without an extra mixing step.
    #[inline]
    pub fn shard(self, shard_count: u16) -> u16 {
        (self.0 % shard_count as u128) as u16
    }

    /// The fixed, deterministic id of a game's nil space: every game has exactly one, derived
    /// from its own game id so it never collides with a generated entity id (which always has
    /// at least one set bit above the 16-bit game id range).
    pub fn nil_space_for_game(gid: u16) -> EntityId {
        EntityId(1u128 << 120 | gid as u128)
    }

    /// Mints a fresh id whose `shard(shard_count)` is exactly `target_shard` -- used by
    /// `CreateEntitySomewhere` to negotiate an id that lands on a specific shard's routing lane
    /// before any game has announced ownership of it.
    pub fn generate_for_shard(target_shard: u16, shard_count: u16) -> EntityId {
        if shard_count == 0 {
            return EntityId::generate();
        }
        let raw = EntityId::generate().0;
        let count = shard_count as u128;
        let target = (target_shard as u128) % count;
        EntityId(raw - (raw % count) + target)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_is_stable_and_in_range() {
        let id = EntityId::generate();
        let a = id.shard(8);
        let b = id.shard(8);
        assert_eq!(a, b);
        assert!(a < 8);
    }

    #[test]
    fn nil_space_ids_are_distinct_per_game() {
        assert_ne!(EntityId::nil_space_for_game(1), EntityId::nil_space_for_game(2));
    }

    #[test]
    fn byte_roundtrip_is_exact() {
        let id = EntityId::generate();
        let bytes = id.to_be_bytes();
        assert_eq!(EntityId::from_be_bytes(bytes), id);
    }

    #[test]
    fn generate_for_shard_lands_on_requested_shard() {
        for target in 0..6u16 {
            let id = EntityId::generate_for_shard(target, 6);
            assert_eq!(id.shard(6), target);
        }
    }
}
