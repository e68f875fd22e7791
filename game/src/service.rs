use std::convert::TryInto;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use byteorder::{BigEndian, ByteOrder};
use entity::{new_nil_space, ClientId, Entity, EntityId, EntityRegistry, NIL_SPACE_TYPE};
use netfabric::{ClientType, DispatcherClient};
use rtlog::{debug, error, info, o, warn, Logger};
use service::{Entry, Registry};
use storage::EntityStore;
use wire::{msgtype, Codec, MsgPackCodec};

use crate::call::Call;
use crate::freeze;
use crate::lbc::Lbc;
use crate::persistence::PersistenceQueue;
use crate::reconcile::{ReconcileAction, ServiceReconciler, ServiceType};

const RECONCILE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RunState {
    Init,
    Running,
    Freezing,
    Freezed,
    Terminating,
    Terminated,
}

/// The single process-wide game service. Everything that mutates shared state -- the entity
/// registry, the service registry mirror, dispatcher connections -- is driven from one `tick`
/// call per iteration of the main loop; there is no internal locking because there is no
/// internal concurrency at this layer, only background I/O workers feeding queues.
pub struct GameService {
    gid: u16,
    shard_count: u16,
    state: RunState,
    entities: EntityRegistry,
    nil_space: EntityId,
    dispatchers: Vec<DispatcherClient>,
    shard_registry: Registry,
    reconciler: ServiceReconciler,
    persistence: PersistenceQueue,
    lbc: Lbc,
    freeze_dir: PathBuf,
    save_interval: Duration,
    last_save_sweep: Instant,
    log: Logger,
}

impl GameService {
    pub fn new(
        gid: u16,
        shard_addrs: &[String],
        freeze_dir: PathBuf,
        save_interval: Duration,
        lbc_interval: Duration,
        storage: Box<dyn EntityStore>,
        log: Logger,
        now: Instant,
    ) -> GameService {
        let shard_count = shard_addrs.len() as u16;
        let dispatchers = shard_addrs
            .iter()
            .enumerate()
            .filter_map(|(shard_id, addr)| {
                addr.parse::<SocketAddr>()
                    .map(|addr| DispatcherClient::new(shard_id as u16, addr, ClientType::Game, gid, now))
                    .ok()
            })
            .collect();

        let mut entities = EntityRegistry::new();
        entities.register_type(NIL_SPACE_TYPE, false);
        let nil_space_entity = new_nil_space(gid);
        let nil_space = entities.create_locally(nil_space_entity).expect("nil space id is freshly derived from gid");

        GameService {
            gid,
            shard_count,
            state: RunState::Init,
            entities,
            nil_space,
            dispatchers,
            shard_registry: Registry::new(),
            reconciler: ServiceReconciler::new(gid, Vec::new(), now, log.new(o!("component" => "reconciler"))),
            persistence: PersistenceQueue::spawn(storage, log.clone()),
            lbc: Lbc::new(lbc_interval, log.clone()),
            freeze_dir,
            save_interval,
            last_save_sweep: now,
            log: log.new(o!("component" => "game_service")),
        }
    }

    pub fn register_type(&mut self, name: &'static str, persistent: bool) {
        self.entities.register_type(name, persistent);
    }

    pub fn register_service_type(&mut self, name: &'static str, persistent: bool) {
        self.entities.register_type(name, persistent);
        self.reconciler.add_type(ServiceType { name, persistent });
    }

    pub fn begin_running(&mut self) {
        self.state = RunState::Running;
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn request_freeze(&mut self) {
        if self.state == RunState::Running {
            self.state = RunState::Freezing;
        }
    }

    pub fn request_terminate(&mut self) {
        if matches!(self.state, RunState::Running | RunState::Freezing) {
            self.state = RunState::Terminating;
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.state == RunState::Terminated || self.state == RunState::Freezed
    }

    /// Restores entities from a prior freeze dump and re-announces each to its owning shard.
    /// Called once at startup when the process is launched with `-restore`.
    pub fn restore_from_file(&mut self, path: &std::path::Path) -> std::io::Result<usize> {
        let restored = freeze::restore_from_file(path)?;
        let mut reinstall_ok = 0usize;

        for entry in restored {
            let id = entry.id;
            match freeze::reinstall(&mut self.entities, entry) {
                Ok(_) => {
                    reinstall_ok += 1;
                    let shard_id = id.shard(self.shard_count);
                    if let Some(client) = self.dispatchers.get_mut(shard_id as usize) {
                        client.push(msgtype::ENTITY_ANNOUNCE, id.to_be_bytes().to_vec(), Instant::now());
                    }
                }
                Err(e) => error!(self.log, "failed to reinstall restored entity"; "error" => ?e),
            }
        }

        info!(self.log, "restored entities from freeze file"; "count" => reinstall_ok);
        Ok(reinstall_ok)
    }

    /// Creates in the game's nil space, per the usual "new entity with no explicit home" path.
    pub fn create_entity_locally(&mut self, type_name: &'static str, persistent: bool, now: Instant) -> Option<EntityId> {
        let space = self.nil_space;
        self.create_entity_in_space(type_name, persistent, space, now)
    }

    /// Creates at an explicit space, for callers (migration targets, space-aware spawns) that
    /// can't use the nil-space default.
    pub fn create_entity_in_space(&mut self, type_name: &'static str, persistent: bool, space: EntityId, now: Instant) -> Option<EntityId> {
        let id = EntityId::generate();
        self.install_entity(type_name, id, space, persistent, now)
    }

    /// `CreateEntitySomewhere`: negotiates an id whose shard lands on `target_gid`'s routing lane
    /// and asks that game to create it, since the requesting game has no connection to another
    /// game except through the dispatcher cluster.
    pub fn create_entity_somewhere(&mut self, target_gid: u16, type_name: &'static str, persistent: bool, now: Instant) -> EntityId {
        let target_shard = shard_for_game(target_gid, self.shard_count);
        let id = EntityId::generate_for_shard(target_shard, self.shard_count);

        let mut inner = Vec::with_capacity(2 + type_name.len() + 17);
        inner.extend_from_slice(&(type_name.len() as u16).to_be_bytes());
        inner.extend_from_slice(type_name.as_bytes());
        inner.extend_from_slice(&id.to_be_bytes());
        inner.push(persistent as u8);

        self.forward_to_game(target_gid, msgtype::ENTITY_CREATE_REQUEST, inner, now);
        id
    }

    /// `LoadEntityOnGame`: no-ops if `id` is already live here, or if storage has no record of it
    /// under `type_name` -- otherwise instantiates it fresh in the nil space. A true cross-game
    /// "already live elsewhere" race is resolved after the fact by the dispatcher's single-owner
    /// announce, not checked synchronously here.
    pub fn load_entity_on_game(&mut self, type_name: &'static str, id: EntityId, persistent: bool, now: Instant) -> Option<EntityId> {
        if self.entities.contains(id) {
            return None;
        }
        if !self.persistence.list_entity_ids(type_name).contains(&id) {
            return None;
        }
        let space = self.nil_space;
        self.install_entity(type_name, id, space, persistent, now)
    }

    fn install_entity(&mut self, type_name: &'static str, id: EntityId, space: EntityId, persistent: bool, now: Instant) -> Option<EntityId> {
        let entity = Entity::new(type_name, id, space, persistent);
        match self.entities.create_locally(entity) {
            Ok(id) => {
                self.announce(id, now);
                Some(id)
            }
            Err(e) => {
                error!(self.log, "failed to create entity locally"; "error" => ?e);
                None
            }
        }
    }

    pub fn destroy_entity(&mut self, id: EntityId, now: Instant) {
        if let Some(mut entity) = self.entities.destroy(id) {
            entity.begin_destroying();
            entity.finish();
            let shard_id = id.shard(self.shard_count);
            if let Some(client) = self.dispatchers.get_mut(shard_id as usize) {
                client.push(msgtype::ENTITY_RETRACT, id.to_be_bytes().to_vec(), now);
            }
        }
    }

    pub fn send_call(&mut self, target: EntityId, method: &str, args: Vec<u8>, now: Instant) {
        let call = Call { target, method: method.to_string(), args };
        let shard_id = target.shard(self.shard_count);

        let mut outer = Vec::with_capacity(18 + call.method.len() + call.args.len());
        outer.extend_from_slice(&target.to_be_bytes());
        outer.extend_from_slice(&msgtype::ENTITY_CALL.to_be_bytes());
        outer.extend_from_slice(&call.encode());

        if let Some(client) = self.dispatchers.get_mut(shard_id as usize) {
            client.push(msgtype::PACKET_FORWARD, outer, now);
        }
    }

    fn announce(&mut self, id: EntityId, now: Instant) {
        let shard_id = id.shard(self.shard_count);
        if let Some(client) = self.dispatchers.get_mut(shard_id as usize) {
            client.push(msgtype::ENTITY_ANNOUNCE, id.to_be_bytes().to_vec(), now);
        }
    }

    /// One iteration of the main loop: drives every dispatcher connection, drains and handles
    /// inbound frames, sweeps dirty entities to storage, samples load, and runs service
    /// reconciliation when due. Everything here is synchronous and single-threaded by design --
    /// only the persistence worker and the dispatcher sockets themselves do blocking I/O.
    pub fn tick(&mut self, now: Instant) {
        self.sync_dispatchers(now);
        self.drain_dispatcher_frames(now);

        if self.state == RunState::Running {
            self.run_save_sweep(now);
            self.run_lbc(now);
            self.run_reconciliation(now);
        }

        if self.state == RunState::Freezing {
            self.run_freeze(now);
        }

        if self.state == RunState::Terminating && self.persistence_drained() {
            self.state = RunState::Terminated;
        }
    }

    fn persistence_drained(&self) -> bool {
        self.persistence.pending_count() == 0
    }

    fn sync_dispatchers(&mut self, now: Instant) {
        for shard_id in 0..self.dispatchers.len() {
            let reconnected = self.dispatchers[shard_id].sync(now).unwrap_or(false);
            if reconnected {
                info!(self.log, "reconnected to dispatcher shard"; "shard" => shard_id);
                let ids = self.entities.ids_for_shard(shard_id as u16, self.shard_count);
                for id in ids {
                    self.dispatchers[shard_id].push(msgtype::ENTITY_ANNOUNCE, id.to_be_bytes().to_vec(), now);
                }
            }
        }
    }

    fn drain_dispatcher_frames(&mut self, now: Instant) {
        for shard_id in 0..self.dispatchers.len() {
            let frames = self.dispatchers[shard_id].pull();
            for frame in frames {
                self.handle_dispatcher_frame(shard_id as u16, frame.msg_type, &frame.payload, now);
            }
        }
    }

    fn handle_dispatcher_frame(&mut self, shard_id: u16, msg_type: u16, payload: &[u8], now: Instant) {
        match msg_type {
            msgtype::SERVICE_GOSSIP => self.apply_gossip(payload, now),
            msgtype::ENTITY_UNKNOWN if payload.len() == 16 => {
                let id = EntityId::from_be_bytes(payload[..16].try_into().unwrap());
                warn!(self.log, "call target never resolved an owner"; "entity" => %id);
            }
            msgtype::ENTITY_CALL => match Call::decode(payload) {
                Ok(call) => self.handle_call(call),
                Err(e) => warn!(self.log, "dropping malformed call"; "error" => %e),
            },
            msgtype::CLIENT_DISCONNECT if payload.len() == 16 => {
                let id = EntityId::from_be_bytes(payload[..16].try_into().unwrap());
                if let Some(entity) = self.entities.get_mut(id) {
                    entity.owner = None;
                    debug!(self.log, "client detached from entity"; "entity" => %id);
                }
            }
            msgtype::CLIENT_INBOUND if payload.len() >= 24 => {
                let entity_id = EntityId::from_be_bytes(payload[..16].try_into().unwrap());
                let client_id = ClientId::from_be_bytes(payload[16..24].try_into().unwrap());
                self.handle_client_inbound(entity_id, client_id, &payload[24..]);
            }
            msgtype::ENTITY_CREATE_REQUEST => self.handle_create_request(payload, now),
            _ => {
                debug!(self.log, "ignoring frame from dispatcher shard"; "shard" => shard_id, "msg_type" => msg_type);
            }
        }
    }

    fn handle_call(&mut self, call: Call) {
        match self.entities.get_mut(call.target) {
            Some(entity) => {
                let count = entity.attrs.get("__call_count").and_then(|a| a.as_int()).unwrap_or(0);
                entity.attrs.set("__call_count", entity::Attr::Int(count + 1));
                debug!(self.log, "delivered call"; "entity" => %call.target, "method" => %call.method);
            }
            None => {
                warn!(self.log, "call to unknown local entity dropped"; "entity" => %call.target, "method" => %call.method);
            }
        }
    }

    /// A raw packet a gate relayed from a client bound to `entity_id`. Delivery is generic here --
    /// the entity gains no opinion about payload contents, just an up-to-date owner in case this
    /// is the first traffic seen from a freshly bound client.
    fn handle_client_inbound(&mut self, entity_id: EntityId, client_id: ClientId, payload: &[u8]) {
        match self.entities.get_mut(entity_id) {
            Some(entity) => {
                entity.owner = Some(client_id);
                debug!(self.log, "delivered client packet"; "entity" => %entity_id, "client" => %client_id, "bytes" => payload.len());
            }
            None => {
                warn!(self.log, "client packet for unknown local entity dropped"; "entity" => %entity_id, "client" => %client_id);
            }
        }
    }

    /// Tells the gate that minted `client_id` to treat it as bound to `entity_id`. Travels via
    /// the dispatcher because games never hold a direct connection to gates.
    pub fn bind_client(&mut self, client_id: ClientId, entity_id: EntityId, now: Instant) {
        let mut inner = Vec::with_capacity(24);
        inner.extend_from_slice(&client_id.to_be_bytes());
        inner.extend_from_slice(&entity_id.to_be_bytes());
        self.forward_to_gate(client_id.gate_id(), msgtype::CLIENT_BIND, inner, now);
    }

    /// Pushes a filter property onto a client's proxy for later `broadcast_to_filter` matching.
    pub fn set_client_filter(&mut self, client_id: ClientId, key: &str, value: &str, now: Instant) {
        let mut inner = Vec::with_capacity(10 + key.len() + value.len());
        inner.extend_from_slice(&client_id.to_be_bytes());
        inner.extend_from_slice(&(key.len() as u16).to_be_bytes());
        inner.extend_from_slice(key.as_bytes());
        inner.extend_from_slice(value.as_bytes());
        self.forward_to_gate(client_id.gate_id(), msgtype::CLIENT_FILTER_SET, inner, now);
    }

    /// Fans a packet out to every client across every gate whose filter property `key` is
    /// currently set to `value`. Sent to a single shard -- every gate keeps a connection to every
    /// shard, so any one shard's gate set is the whole cluster's.
    pub fn broadcast_to_filter(&mut self, key: &str, value: &str, inner_type: u16, inner_payload: &[u8], now: Instant) {
        let mut payload = Vec::with_capacity(6 + key.len() + value.len() + inner_payload.len());
        payload.extend_from_slice(&(key.len() as u16).to_be_bytes());
        payload.extend_from_slice(key.as_bytes());
        payload.extend_from_slice(&(value.len() as u16).to_be_bytes());
        payload.extend_from_slice(value.as_bytes());
        payload.extend_from_slice(&inner_type.to_be_bytes());
        payload.extend_from_slice(inner_payload);

        if let Some(client) = self.dispatchers.first_mut() {
            client.push(msgtype::BROADCAST_FILTER, payload, now);
        }
    }

    fn forward_to_gate(&mut self, gate_id: u16, inner_type: u16, inner_payload: Vec<u8>, now: Instant) {
        let mut outer = Vec::with_capacity(4 + inner_payload.len());
        outer.extend_from_slice(&gate_id.to_be_bytes());
        outer.extend_from_slice(&inner_type.to_be_bytes());
        outer.extend_from_slice(&inner_payload);

        if let Some(client) = self.dispatchers.first_mut() {
            client.push(msgtype::GATE_FORWARD, outer, now);
        }
    }

    fn forward_to_game(&mut self, target_gid: u16, inner_type: u16, inner_payload: Vec<u8>, now: Instant) {
        let mut outer = Vec::with_capacity(4 + inner_payload.len());
        outer.extend_from_slice(&target_gid.to_be_bytes());
        outer.extend_from_slice(&inner_type.to_be_bytes());
        outer.extend_from_slice(&inner_payload);

        if let Some(client) = self.dispatchers.first_mut() {
            client.push(msgtype::GAME_FORWARD, outer, now);
        }
    }

    /// `[type_name_len u16][type_name][entity_id 16][persistent u8]`, delivered by the dispatcher
    /// after a peer game's `create_entity_somewhere` landed an id on one of our shards.
    fn handle_create_request(&mut self, payload: &[u8], now: Instant) {
        if payload.len() < 2 {
            return;
        }
        let name_len = BigEndian::read_u16(&payload[..2]) as usize;
        if payload.len() < 2 + name_len + 17 {
            warn!(self.log, "dropping malformed entity create request");
            return;
        }
        let name = String::from_utf8_lossy(&payload[2..2 + name_len]).to_string();
        let mut cursor = 2 + name_len;
        let id = EntityId::from_be_bytes(payload[cursor..cursor + 16].try_into().unwrap());
        cursor += 16;
        let persistent = payload[cursor] != 0;

        match self.entities.resolve_type_name(&name) {
            Some(type_name) => {
                let space = self.nil_space;
                // The entity's first home was the negotiation itself, not this game, so it
                // arrives here already mid-migration rather than via a fresh local spawn.
                if let Some(id) = self.install_entity(type_name, id, space, persistent, now) {
                    if let Some(entity) = self.entities.get_mut(id) {
                        entity.begin_migrating();
                        entity.finish_migrating();
                    }
                }
            }
            None => warn!(self.log, "dropping create request for unregistered type"; "type" => %name),
        }
    }

    fn apply_gossip(&mut self, payload: &[u8], now: Instant) {
        if payload.len() < 2 {
            return;
        }
        let path_len = BigEndian::read_u16(&payload[0..2]) as usize;
        let mut cursor = 2;
        if payload.len() < cursor + path_len + 10 {
            return;
        }
        let path = String::from_utf8_lossy(&payload[cursor..cursor + path_len]).to_string();
        cursor += path_len;
        let epoch = BigEndian::read_u64(&payload[cursor..cursor + 8]);
        cursor += 8;
        let gid = BigEndian::read_u16(&payload[cursor..cursor + 2]);
        cursor += 2;
        if payload.len() < cursor + 2 {
            return;
        }
        let value_len = BigEndian::read_u16(&payload[cursor..cursor + 2]) as usize;
        cursor += 2;
        if payload.len() < cursor + value_len {
            return;
        }
        let value = String::from_utf8_lossy(&payload[cursor..cursor + value_len]).to_string();

        self.shard_registry.merge(&path, Entry { value, epoch, gid });
        self.reconciler.trigger_now(now);
    }

    fn run_save_sweep(&mut self, now: Instant) {
        if now.duration_since(self.last_save_sweep) < self.save_interval {
            return;
        }
        self.last_save_sweep = now;

        let codec = MsgPackCodec;
        let dirty_ids: Vec<EntityId> = self.entities.dirty_entities().map(|e| e.id).collect();
        for id in dirty_ids {
            if let Some(entity) = self.entities.get_mut(id) {
                let delta = entity.attrs.take_save_delta();
                match codec.encode(&delta) {
                    Ok(bytes) => self.persistence.enqueue(entity.type_name, id, bytes),
                    Err(e) => error!(self.log, "failed to encode save delta"; "entity" => %id, "error" => %e),
                }
            }
        }
    }

    fn run_lbc(&mut self, now: Instant) {
        if let Some(cpu) = self.lbc.tick(now) {
            let mut payload = Vec::with_capacity(6);
            payload.extend_from_slice(&self.gid.to_be_bytes());
            payload.extend_from_slice(&cpu.to_be_bytes());
            for client in &mut self.dispatchers {
                client.push(msgtype::LBC_REPORT, payload.clone(), now);
            }
        }
    }

    fn run_reconciliation(&mut self, now: Instant) {
        if !self.reconciler.due(now) {
            self.run_due_registrations(now);
            return;
        }

        // Reconciliation consults storage synchronously for the "persistent, zero local copies"
        // case; it runs at most once every sweep interval so the brief blocking round trip
        // through the persistence worker doesn't compete with the main loop's latency budget.
        let actions = self.reconciler.reconcile(now, &self.shard_registry, &mut self.entities, &self.persistence);

        for action in actions {
            match action {
                ReconcileAction::Announce(id) => self.announce(id, now),
                ReconcileAction::Register { name, entity_id, excl } => {
                    self.send_register(&name, entity_id, excl, now);
                }
                ReconcileAction::ScheduleRegister { .. } => {}
            }
        }

        self.run_due_registrations(now);
    }

    fn run_due_registrations(&mut self, now: Instant) {
        for name in self.reconciler.due_registrations(now) {
            let shard_id = name_shard(&name, self.shard_count);
            let mut payload = vec![0u8];
            payload.extend_from_slice(name.as_bytes());
            if let Some(client) = self.dispatchers.get_mut(shard_id as usize) {
                client.push(msgtype::SERVICE_REGISTER, payload, now);
            }
        }
    }

    fn send_register(&mut self, name: &str, entity_id: EntityId, excl: bool, now: Instant) {
        let shard_id = name_shard(name, self.shard_count);
        let mut register_payload = vec![excl as u8];
        register_payload.extend_from_slice(name.as_bytes());

        let mut entity_id_payload = vec![excl as u8];
        entity_id_payload.extend_from_slice(&entity_id.to_be_bytes());
        entity_id_payload.extend_from_slice(name.as_bytes());

        if let Some(client) = self.dispatchers.get_mut(shard_id as usize) {
            client.push(msgtype::SERVICE_REGISTER, register_payload, now);
            client.push(msgtype::SERVICE_REGISTER_ENTITY_ID, entity_id_payload, now);
        }
    }

    fn run_freeze(&mut self, now: Instant) {
        if !self.persistence_drained() {
            return;
        }

        let path = self.freeze_dir.join(format!("game{}.freeze", self.gid));
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match freeze::freeze_to_file(&self.entities, &path) {
            Ok(()) => {
                info!(self.log, "froze game state"; "path" => %path.display());
                self.state = RunState::Freezed;
            }
            Err(e) => {
                error!(self.log, "freeze failed, will retry next tick"; "error" => %e);
            }
        }
        let _ = now;
    }
}

/// `CreateEntitySomewhere`'s notion of "the target game's shard". Shard ownership here is
/// announced dynamically rather than fixed per game, so there's no inherent game-to-shard
/// binding to consult; this is this implementation's own deterministic convention for picking a
/// shard to negotiate an id against before the target game has announced anything.
fn shard_for_game(gid: u16, shard_count: u16) -> u16 {
    if shard_count == 0 {
        return 0;
    }
    gid % shard_count
}

fn name_shard(name: &str, shard_count: u16) -> u16 {
    if shard_count == 0 {
        return 0;
    }
    let mut hash: u64 = 1469598103934665603;
    for b in name.as_bytes() {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    (hash % shard_count as u64) as u16
}

