use std::time::{Duration, Instant};

use hashbrown::{HashMap, HashSet};

use entity::EntityId;
use service::{Registry, RegisterOutcome};

pub type GameId = u16;

const PENDING_TTL: Duration = Duration::from_secs(5);

/// Opaque connection identifier, mirroring `netfabric::ConnId` without creating a dependency on
/// that crate from this one -- `Shard` only ever echoes it back for the caller to address.
pub type ConnId = usize;

struct Pending {
    msg_type: u16,
    payload: Vec<u8>,
    queued_at: Instant,
    source_conn: ConnId,
}

/// One coordinator shard: owns a slice of the EntityID hash space plus its copy of the service
/// registry. `entity_owner` is learned purely from games announcing what they host; the shard
/// never infers ownership on its own.
pub struct Shard {
    pub id: u16,
    pub shard_count: u16,
    entity_owner: HashMap<EntityId, GameId>,
    live_games: HashSet<GameId>,
    pub registry: Registry,
    pending: HashMap<EntityId, Vec<Pending>>,
    expected_games: usize,
}

impl Shard {
    pub fn new(id: u16, shard_count: u16, expected_games: usize) -> Shard {
        Shard {
            id,
            shard_count,
            entity_owner: HashMap::new(),
            live_games: HashSet::new(),
            registry: Registry::new(),
            pending: HashMap::new(),
            expected_games,
        }
    }

    pub fn owns(&self, id: EntityId) -> bool {
        id.shard(self.shard_count) == self.id
    }

    pub fn deployment_ready(&self) -> bool {
        self.live_games.len() >= self.expected_games
    }

    pub fn game_connected(&mut self, gid: GameId) {
        self.live_games.insert(gid);
    }

    pub fn game_disconnected(&mut self, gid: GameId) {
        self.live_games.remove(&gid);
        self.entity_owner.retain(|_, owner| *owner != gid);
    }

    /// Learned from a game's `EntityAnnounce`: records that `gid` now hosts `id`, and flushes any
    /// packets that were parked waiting for ownership to resolve.
    pub fn announce(&mut self, gid: GameId, id: EntityId) -> Vec<(u16, Vec<u8>)> {
        self.entity_owner.insert(id, gid);
        self.pending
            .remove(&id)
            .map(|queued| queued.into_iter().map(|p| (p.msg_type, p.payload)).collect())
            .unwrap_or_default()
    }

    pub fn owner_of(&self, id: EntityId) -> Option<GameId> {
        self.entity_owner.get(&id).copied()
    }

    /// Forgets ownership of `id` on behalf of `gid`. Ignored if `gid` isn't the currently
    /// recorded owner, so a stale retract from a game that already lost a migration race can't
    /// clobber the new owner's announcement.
    pub fn retract(&mut self, gid: GameId, id: EntityId) {
        if self.entity_owner.get(&id) == Some(&gid) {
            self.entity_owner.remove(&id);
        }
    }

    /// Routes a packet addressed to `id`. If the owner is known, returns it directly for the
    /// caller to forward. If unknown, the packet is parked with a TTL; `drain_expired` later
    /// reports which parked entities timed out so the sender can be told `unknown-entity`.
    pub fn route(&mut self, id: EntityId, msg_type: u16, payload: Vec<u8>, source_conn: ConnId, now: Instant) -> Option<GameId> {
        if let Some(owner) = self.entity_owner.get(&id) {
            return Some(*owner);
        }

        self.pending.entry(id).or_default().push(Pending { msg_type, payload, queued_at: now, source_conn });
        None
    }

    /// Drops packets parked longer than `PENDING_TTL` whose owner never resolved, returning the
    /// entity id alongside the distinct senders waiting on it so the caller can notify each with
    /// an unknown-entity error.
    pub fn drain_expired(&mut self, now: Instant) -> Vec<(EntityId, Vec<ConnId>)> {
        let mut expired = Vec::new();
        self.pending.retain(|id, queue| {
            let mut timed_out_senders = Vec::new();
            queue.retain(|p| {
                let alive = now.duration_since(p.queued_at) < PENDING_TTL;
                if !alive {
                    timed_out_senders.push(p.source_conn);
                }
                alive
            });
            if queue.is_empty() {
                expired.push((*id, timed_out_senders));
                false
            } else {
                true
            }
        });
        expired
    }

    /// `Register("Service/<name>", "game<gid>", excl)`. The first successful write wins;
    /// conflicting writers are told who already owns the path so they can destroy their local
    /// candidate.
    pub fn register_service(&mut self, name: &str, gid: GameId, excl: bool) -> RegisterOutcome {
        self.registry.register(&service::service_path(name), format!("game{}", gid), gid, excl)
    }

    /// `Register("Service/<name>/EntityID", hex(id), excl)`. Separate from `register_service`
    /// because the owning entity id is decided by the game hosting the service, not by the
    /// dispatcher, and a game republishing after a registry mismatch needs to overwrite it with
    /// `excl = true` without touching the `Service/<name>` ownership entry.
    pub fn register_service_entity_id(&mut self, name: &str, id: EntityId, gid: GameId, excl: bool) -> RegisterOutcome {
        self.registry.register(&service::service_entity_path(name), hex::encode(id.to_be_bytes()), gid, excl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_parks_packet_until_owner_announced() {
        let mut shard = Shard::new(0, 4, 1);
        let id = EntityId::generate();
        let now = Instant::now();

        assert_eq!(shard.route(id, 1, vec![1, 2, 3], 9, now), None);

        let flushed = shard.announce(7, id);
        assert_eq!(flushed.len(), 1);
        assert_eq!(shard.owner_of(id), Some(7));

        assert_eq!(shard.route(id, 1, vec![], 9, now), Some(7));
    }

    #[test]
    fn expired_pending_packets_are_dropped() {
        let mut shard = Shard::new(0, 4, 1);
        let id = EntityId::generate();
        let now = Instant::now();

        shard.route(id, 1, vec![9], 9, now);
        let expired = shard.drain_expired(now + PENDING_TTL + Duration::from_millis(1));
        assert_eq!(expired, vec![(id, vec![9usize])]);
    }

    #[test]
    fn game_disconnect_clears_its_ownership() {
        let mut shard = Shard::new(0, 4, 1);
        let id = EntityId::generate();
        shard.announce(3, id);
        shard.game_disconnected(3);
        assert_eq!(shard.owner_of(id), None);
    }

    #[test]
    fn retract_only_removes_if_caller_is_current_owner() {
        let mut shard = Shard::new(0, 4, 1);
        let id = EntityId::generate();
        shard.announce(7, id);

        shard.retract(3, id);
        assert_eq!(shard.owner_of(id), Some(7));

        shard.retract(7, id);
        assert_eq!(shard.owner_of(id), None);
    }

    #[test]
    fn deployment_ready_waits_for_expected_games() {
        let mut shard = Shard::new(0, 4, 2);
        assert!(!shard.deployment_ready());
        shard.game_connected(1);
        assert!(!shard.deployment_ready());
        shard.game_connected(2);
        assert!(shard.deployment_ready());
    }

    #[test]
    fn register_service_entity_id_is_independent_of_service_ownership() {
        let mut shard = Shard::new(0, 4, 1);
        let id = EntityId::generate();

        let outcome = shard.register_service_entity_id("Matchmaker", id, 1, false);
        assert_eq!(outcome, RegisterOutcome::Registered);

        let entry = shard.registry.get("Service/Matchmaker/EntityID").unwrap();
        assert_eq!(entry.value, hex::encode(id.to_be_bytes()));

        let rejected = shard.register_service_entity_id("Matchmaker", EntityId::generate(), 2, false);
        assert!(matches!(rejected, RegisterOutcome::AlreadyOwned(_)));
    }
}
