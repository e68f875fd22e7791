use std::convert::TryInto;
use std::net::SocketAddr;
use std::time::Instant;

use byteorder::{BigEndian, ByteOrder};
use hashbrown::HashMap;

use entity::EntityId;
use netfabric::{ClientType, ConnId, ConnectionChange, DispatcherClient, Endpoint};
use rtlog::{debug, info, o, warn, Logger};
use wire::msgtype;

use crate::shard::Shard;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum PeerKind {
    Game,
    Gate,
}

struct PeerConn {
    kind: PeerKind,
    gid: u16,
    handshaken: bool,
}

/// Ties a `Shard` to the network: accepts games and gates, speaks the typed handshake, forwards
/// addressed packets, and gossips the service registry to the other shards.
pub struct Cluster {
    pub shard: Shard,
    endpoint: Endpoint,
    conns: HashMap<ConnId, PeerConn>,
    game_conns: HashMap<u16, ConnId>,
    gate_conns: HashMap<u16, ConnId>,
    peers: Vec<DispatcherClient>,
    log: Logger,
}

impl Cluster {
    pub fn new(bind_addr: &str, peer_addrs: &[String], shard: Shard, now: Instant, log: Logger) -> std::io::Result<Cluster> {
        let endpoint = Endpoint::bind(bind_addr, now)?;
        let peers = peer_addrs
            .iter()
            .filter_map(|a| a.parse::<SocketAddr>().ok())
            .map(|addr| DispatcherClient::new(shard.id, addr, ClientType::Peer, shard.id, now))
            .collect();

        Ok(Cluster { shard, endpoint, conns: HashMap::new(), game_conns: HashMap::new(), gate_conns: HashMap::new(), peers, log })
    }

    pub fn sync(&mut self, now: Instant) -> std::io::Result<()> {
        self.endpoint.sync(now)?;

        for change in self.endpoint.changes().collect::<Vec<_>>() {
            match change {
                ConnectionChange::Connected(id) => {
                    self.conns.insert(id, PeerConn { kind: PeerKind::Game, gid: 0, handshaken: false });
                }
                ConnectionChange::Disconnected(id) => {
                    if let Some(peer) = self.conns.remove(&id) {
                        if peer.handshaken && peer.kind == PeerKind::Game {
                            self.shard.game_disconnected(peer.gid);
                            self.game_conns.remove(&peer.gid);
                            info!(self.log, "game disconnected"; "gid" => peer.gid);
                        } else if peer.handshaken && peer.kind == PeerKind::Gate {
                            self.gate_conns.remove(&peer.gid);
                            info!(self.log, "gate disconnected"; "gid" => peer.gid);
                        }
                    }
                }
            }
        }

        for id in self.conns.keys().copied().collect::<Vec<_>>() {
            for frame in self.endpoint.pull(id) {
                self.handle_frame(id, frame.msg_type, &frame.payload, now);
            }
        }

        for (entity_id, senders) in self.shard.drain_expired(now) {
            warn!(self.log, "packet expired waiting for owner"; "entity" => %entity_id);
            for conn_id in senders {
                if self.conns.contains_key(&conn_id) {
                    self.endpoint.queue(conn_id, msgtype::ENTITY_UNKNOWN, &entity_id.to_be_bytes());
                }
            }
        }

        self.sync_peers(now);
        Ok(())
    }

    fn handle_frame(&mut self, id: ConnId, msg_type: u16, payload: &[u8], now: Instant) {
        if !self.conns[&id].handshaken {
            self.handle_handshake(id, msg_type, payload);
            return;
        }

        match msg_type {
            msgtype::ENTITY_ANNOUNCE if payload.len() == 16 => {
                let entity_id = EntityId::from_be_bytes(payload[..16].try_into().unwrap());
                let gid = self.conns[&id].gid;
                let flushed = self.shard.announce(gid, entity_id);
                for (ft, fp) in flushed {
                    self.endpoint.queue(id, ft, &fp);
                }
            }
            msgtype::PACKET_FORWARD if payload.len() >= 18 => {
                let entity_id = EntityId::from_be_bytes(payload[..16].try_into().unwrap());
                let inner_type = BigEndian::read_u16(&payload[16..18]);
                let inner_payload = payload[18..].to_vec();

                match self.shard.route(entity_id, inner_type, inner_payload.clone(), id, now) {
                    Some(owner_gid) => {
                        if let Some(&conn_id) = self.game_conns.get(&owner_gid) {
                            self.endpoint.queue(conn_id, inner_type, &inner_payload);
                        }
                    }
                    None => debug!(self.log, "packet parked pending owner"; "entity" => %entity_id),
                }
            }
            msgtype::GATE_FORWARD if payload.len() >= 4 => {
                let gate_id = BigEndian::read_u16(&payload[..2]);
                let inner_type = BigEndian::read_u16(&payload[2..4]);
                let inner_payload = &payload[4..];
                if let Some(&conn_id) = self.gate_conns.get(&gate_id) {
                    self.endpoint.queue(conn_id, inner_type, inner_payload);
                } else {
                    debug!(self.log, "dropping gate-forward to unknown gate"; "gate" => gate_id);
                }
            }
            msgtype::GAME_FORWARD if payload.len() >= 4 => {
                let target_gid = BigEndian::read_u16(&payload[..2]);
                let inner_type = BigEndian::read_u16(&payload[2..4]);
                let inner_payload = &payload[4..];
                if let Some(&conn_id) = self.game_conns.get(&target_gid) {
                    self.endpoint.queue(conn_id, inner_type, inner_payload);
                } else {
                    debug!(self.log, "dropping game-forward to unknown game"; "game" => target_gid);
                }
            }
            msgtype::BROADCAST_FILTER => {
                for &conn_id in self.gate_conns.values() {
                    self.endpoint.queue(conn_id, msgtype::BROADCAST_FILTER, payload);
                }
            }
            msgtype::ENTITY_RETRACT if payload.len() == 16 => {
                let entity_id = EntityId::from_be_bytes(payload[..16].try_into().unwrap());
                let gid = self.conns[&id].gid;
                self.shard.retract(gid, entity_id);
            }
            msgtype::SERVICE_REGISTER if !payload.is_empty() => {
                let excl = payload[0] != 0;
                let name = String::from_utf8_lossy(&payload[1..]).to_string();
                let gid = self.conns[&id].gid;
                self.shard.register_service(&name, gid, excl);
            }
            msgtype::SERVICE_REGISTER_ENTITY_ID if payload.len() >= 17 => {
                let excl = payload[0] != 0;
                let entity_id = EntityId::from_be_bytes(payload[1..17].try_into().unwrap());
                let name = String::from_utf8_lossy(&payload[17..]).to_string();
                let gid = self.conns[&id].gid;
                self.shard.register_service_entity_id(&name, entity_id, gid, excl);
            }
            _ => warn!(self.log, "dropping unrecognized frame"; "msg_type" => msg_type),
        }
    }

    fn handle_handshake(&mut self, id: ConnId, msg_type: u16, payload: &[u8]) {
        if payload.len() < 2 {
            return;
        }
        let gid = BigEndian::read_u16(payload);

        let kind = match msg_type {
            msgtype::HANDSHAKE_GAME | msgtype::HANDSHAKE_GAME_RESTORE => PeerKind::Game,
            msgtype::HANDSHAKE_GATE => PeerKind::Gate,
            _ => return,
        };

        if let Some(conn) = self.conns.get_mut(&id) {
            conn.kind = kind;
            conn.gid = gid;
            conn.handshaken = true;
        }

        if kind == PeerKind::Game {
            self.shard.game_connected(gid);
            self.game_conns.insert(gid, id);
            let is_restore = msg_type == msgtype::HANDSHAKE_GAME_RESTORE;
            info!(self.log, "game connected"; "gid" => gid, "restore" => is_restore);
        } else {
            self.gate_conns.insert(gid, id);
            info!(self.log, "gate connected"; "gid" => gid);
        }
    }

    fn sync_peers(&mut self, now: Instant) {
        let mut gossip_payloads = Vec::new();
        for peer in &mut self.peers {
            let reconnected = peer.sync(now).unwrap_or(false);
            if reconnected {
                info!(self.log, "peer shard reconnected"; "shard" => peer.shard_id());
            }

            for frame in peer.pull() {
                if frame.msg_type == msgtype::SERVICE_GOSSIP {
                    gossip_payloads.push(frame.payload);
                }
            }
        }
        for payload in &gossip_payloads {
            self.apply_gossip(payload);
        }

        for (path, entry) in self.shard.registry.traverse_by_prefix(service::SERVICE_PREFIX).collect::<Vec<_>>() {
            let mut payload = Vec::new();
            payload.extend_from_slice(&(path.len() as u16).to_be_bytes());
            payload.extend_from_slice(path.as_bytes());
            payload.extend_from_slice(&entry.epoch.to_be_bytes());
            payload.extend_from_slice(&entry.gid.to_be_bytes());
            payload.extend_from_slice(&(entry.value.len() as u16).to_be_bytes());
            payload.extend_from_slice(entry.value.as_bytes());

            for peer in &mut self.peers {
                peer.push(msgtype::SERVICE_GOSSIP, payload.clone(), now);
            }
        }
    }

    fn apply_gossip(&mut self, payload: &[u8]) {
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

        self.shard.registry.merge(&path, service::Entry { value, epoch, gid });
    }
}
