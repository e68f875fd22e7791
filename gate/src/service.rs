use std::convert::TryInto;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use byteorder::{BigEndian, ByteOrder};
use entity::{ClientId, ClientIdGenerator, EntityId};
use hashbrown::{HashMap, HashSet};
use netfabric::{ClientType, ConnId, ConnectionChange, DispatcherClient, Endpoint};
use rtlog::{debug, info, o, warn, Logger};
use wire::msgtype;

use crate::client_proxy::{ClientProxy, ProxyState};

/// The gate's single consumer: owns the client table, the filter inverted index, and the
/// dispatcher connections. Every mutation of gate-wide state happens inside `tick` -- there is no
/// concurrent access from the per-connection readers, which only ever hand frames to `Endpoint`'s
/// internal buffers.
pub struct GateService {
    gid: u16,
    shard_count: u16,
    endpoint: Endpoint,
    dispatchers: Vec<DispatcherClient>,
    id_gen: ClientIdGenerator,
    proxies: HashMap<ConnId, ClientProxy>,
    client_conns: HashMap<ClientId, ConnId>,
    filter_index: HashMap<(String, String), HashSet<ClientId>>,
    heart_interval: Duration,
    last_heartbeat_sweep: Instant,
    terminating: bool,
    log: Logger,
}

impl GateService {
    pub fn new(
        gid: u16,
        bind_addr: &str,
        shard_addrs: &[String],
        heart_interval: Duration,
        log: Logger,
        now: Instant,
    ) -> std::io::Result<GateService> {
        let endpoint = Endpoint::bind(bind_addr, now)?;
        let shard_count = shard_addrs.len() as u16;
        let dispatchers = shard_addrs
            .iter()
            .enumerate()
            .filter_map(|(shard_id, addr)| {
                addr.parse::<SocketAddr>()
                    .map(|addr| DispatcherClient::new(shard_id as u16, addr, ClientType::Gate, gid, now))
                    .ok()
            })
            .collect();

        Ok(GateService {
            gid,
            shard_count,
            endpoint,
            dispatchers,
            id_gen: ClientIdGenerator::new(gid),
            proxies: HashMap::new(),
            client_conns: HashMap::new(),
            filter_index: HashMap::new(),
            heart_interval,
            last_heartbeat_sweep: now,
            terminating: false,
            log: log.new(o!("component" => "gate_service")),
        })
    }

    pub fn request_terminate(&mut self) {
        self.terminating = true;
    }

    /// `true` once every dispatcher shard connection has gone down without reconnecting -- a
    /// gate with no entity state of its own has nothing left to preserve, so total dispatcher
    /// loss is fatal rather than something to retry through.
    pub fn dispatcher_cluster_lost(&self) -> bool {
        !self.dispatchers.is_empty() && self.dispatchers.iter().all(|c| !c.is_connected())
    }

    pub fn is_terminated(&self) -> bool {
        self.terminating && self.proxies.is_empty()
    }

    pub fn tick(&mut self, now: Instant) {
        if let Err(e) = self.endpoint.sync(now) {
            warn!(self.log, "client endpoint sync error"; "error" => %e);
        }
        self.handle_endpoint_changes(now);
        self.drain_client_frames(now);

        self.sync_dispatchers(now);
        self.drain_dispatcher_frames();

        if now.duration_since(self.last_heartbeat_sweep) >= Duration::from_secs(1) {
            self.last_heartbeat_sweep = now;
            self.sweep_heartbeats(now);
            self.handle_endpoint_changes(now);
        }

        if self.terminating {
            for id in self.proxies.keys().copied().collect::<Vec<_>>() {
                self.endpoint.disconnect(id);
            }
            self.handle_endpoint_changes(now);
        }
    }

    fn handle_endpoint_changes(&mut self, now: Instant) {
        for change in self.endpoint.changes().collect::<Vec<_>>() {
            match change {
                ConnectionChange::Connected(id) => {
                    let client_id = self.id_gen.next();
                    self.client_conns.insert(client_id, id);
                    self.proxies.insert(id, ClientProxy::new(client_id, id, now));
                    debug!(self.log, "client connected"; "client" => %client_id);
                }
                ConnectionChange::Disconnected(id) => {
                    self.close_proxy(id, now);
                }
            }
        }
    }

    fn close_proxy(&mut self, conn_id: ConnId, now: Instant) {
        let proxy = match self.proxies.remove(&conn_id) {
            Some(p) => p,
            None => return,
        };

        self.client_conns.remove(&proxy.client_id);
        for key in &proxy.filter_keys {
            if let Some(set) = self.filter_index.get_mut(key) {
                set.remove(&proxy.client_id);
                if set.is_empty() {
                    self.filter_index.remove(key);
                }
            }
        }

        info!(self.log, "client disconnected"; "client" => %proxy.client_id);

        if let Some(entity_id) = proxy.entity_id {
            self.forward_to_game(entity_id, msgtype::CLIENT_DISCONNECT, entity_id.to_be_bytes().to_vec(), now);
        }
    }

    fn drain_client_frames(&mut self, now: Instant) {
        for conn_id in self.proxies.keys().copied().collect::<Vec<_>>() {
            let frames = self.endpoint.pull(conn_id);
            if frames.is_empty() {
                continue;
            }
            if let Some(proxy) = self.proxies.get_mut(&conn_id) {
                proxy.touch(now);
            }

            for frame in frames {
                let (entity_id, client_id) = match self.proxies.get(&conn_id) {
                    Some(p) => (p.entity_id, p.client_id),
                    None => continue,
                };

                match entity_id {
                    Some(entity_id) => {
                        let mut inner = Vec::with_capacity(24 + frame.payload.len());
                        inner.extend_from_slice(&entity_id.to_be_bytes());
                        inner.extend_from_slice(&client_id.to_be_bytes());
                        inner.extend_from_slice(&frame.payload);
                        self.forward_to_game(entity_id, msgtype::CLIENT_INBOUND, inner, now);
                    }
                    None => {
                        debug!(self.log, "dropping inbound frame from unbound client"; "client" => %client_id);
                    }
                }
            }
        }
    }

    fn forward_to_game(&mut self, entity_id: EntityId, inner_type: u16, inner_payload: Vec<u8>, now: Instant) {
        let shard_id = entity_id.shard(self.shard_count);

        let mut outer = Vec::with_capacity(18 + inner_payload.len());
        outer.extend_from_slice(&entity_id.to_be_bytes());
        outer.extend_from_slice(&inner_type.to_be_bytes());
        outer.extend_from_slice(&inner_payload);

        if let Some(client) = self.dispatchers.get_mut(shard_id as usize) {
            client.push(msgtype::PACKET_FORWARD, outer, now);
        }
    }

    fn sync_dispatchers(&mut self, now: Instant) {
        for shard_id in 0..self.dispatchers.len() {
            if self.dispatchers[shard_id].sync(now).unwrap_or(false) {
                info!(self.log, "reconnected to dispatcher shard"; "shard" => shard_id);
            }
        }
    }

    fn drain_dispatcher_frames(&mut self) {
        for shard_id in 0..self.dispatchers.len() {
            let frames = self.dispatchers[shard_id].pull();
            for frame in frames {
                self.handle_dispatcher_frame(frame.msg_type, &frame.payload);
            }
        }
    }

    fn handle_dispatcher_frame(&mut self, msg_type: u16, payload: &[u8]) {
        match msg_type {
            msgtype::CLIENT_BIND if payload.len() >= 24 => {
                let client_id = ClientId::from_be_bytes(payload[..8].try_into().unwrap());
                let entity_id = EntityId::from_be_bytes(payload[8..24].try_into().unwrap());
                if let Some(&conn_id) = self.client_conns.get(&client_id) {
                    if let Some(proxy) = self.proxies.get_mut(&conn_id) {
                        proxy.bind(entity_id);
                        debug!(self.log, "client bound"; "client" => %client_id, "entity" => %entity_id);
                    }
                }
            }
            msgtype::CLIENT_FILTER_SET if payload.len() >= 10 => {
                self.apply_filter_set(payload);
            }
            msgtype::BROADCAST_FILTER if payload.len() >= 4 => {
                self.apply_broadcast(payload);
            }
            _ => {
                debug!(self.log, "ignoring frame from dispatcher shard"; "msg_type" => msg_type);
            }
        }
    }

    fn apply_filter_set(&mut self, payload: &[u8]) {
        let client_id = ClientId::from_be_bytes(payload[..8].try_into().unwrap());
        let key_len = BigEndian::read_u16(&payload[8..10]) as usize;
        if payload.len() < 10 + key_len {
            return;
        }
        let key = String::from_utf8_lossy(&payload[10..10 + key_len]).to_string();
        let value = String::from_utf8_lossy(&payload[10 + key_len..]).to_string();

        let conn_id = match self.client_conns.get(&client_id) {
            Some(&id) => id,
            None => return,
        };

        let proxy = match self.proxies.get_mut(&conn_id) {
            Some(p) => p,
            None => return,
        };

        if let Some(pos) = proxy.filter_keys.iter().position(|(k, _)| *k == key) {
            let (_, old_value) = proxy.filter_keys.remove(pos);
            if let Some(set) = self.filter_index.get_mut(&(key.clone(), old_value.clone())) {
                set.remove(&client_id);
                if set.is_empty() {
                    self.filter_index.remove(&(key.clone(), old_value));
                }
            }
        }

        proxy.filter_keys.push((key.clone(), value.clone()));
        self.filter_index.entry((key, value)).or_insert_with(HashSet::new).insert(client_id);
    }

    fn apply_broadcast(&mut self, payload: &[u8]) {
        let key_len = BigEndian::read_u16(&payload[0..2]) as usize;
        let mut cursor = 2;
        if payload.len() < cursor + key_len + 2 {
            return;
        }
        let key = String::from_utf8_lossy(&payload[cursor..cursor + key_len]).to_string();
        cursor += key_len;

        let value_len = BigEndian::read_u16(&payload[cursor..cursor + 2]) as usize;
        cursor += 2;
        if payload.len() < cursor + value_len + 2 {
            return;
        }
        let value = String::from_utf8_lossy(&payload[cursor..cursor + value_len]).to_string();
        cursor += value_len;

        let inner_type = BigEndian::read_u16(&payload[cursor..cursor + 2]);
        cursor += 2;
        let inner_payload = &payload[cursor..];

        if let Some(targets) = self.filter_index.get(&(key, value)) {
            for client_id in targets.iter().copied().collect::<Vec<_>>() {
                if let Some(&conn_id) = self.client_conns.get(&client_id) {
                    self.endpoint.queue(conn_id, inner_type, inner_payload);
                }
            }
        }
    }

    fn sweep_heartbeats(&mut self, now: Instant) {
        let stale: Vec<ConnId> = self
            .proxies
            .values()
            .filter(|p| p.state != ProxyState::Closing && p.is_stale(now, self.heart_interval))
            .map(|p| p.conn_id)
            .collect();

        for conn_id in stale {
            if let Some(proxy) = self.proxies.get_mut(&conn_id) {
                proxy.state = ProxyState::Closing;
            }
            warn!(self.log, "client heartbeat timed out"; "conn" => conn_id);
            self.endpoint.disconnect(conn_id);
        }
    }
}
