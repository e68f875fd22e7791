use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use mio::net::TcpStream;
use wire::Frame;

use crate::connection::Connection;

/// The first frame sent after connecting tells the shard which kind of node is on the other end,
/// and whether a game is rejoining after a freeze.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ClientType {
    Game,
    Gate,
    GameRestore,
    Peer,
}

impl ClientType {
    pub fn handshake_msg_type(self) -> u16 {
        match self {
            ClientType::Game => wire::msgtype::HANDSHAKE_GAME,
            ClientType::Gate => wire::msgtype::HANDSHAKE_GATE,
            ClientType::GameRestore => wire::msgtype::HANDSHAKE_GAME_RESTORE,
            ClientType::Peer => wire::msgtype::HANDSHAKE_PEER,
        }
    }
}

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Pending frames accumulate here while a shard connection is down. Bounded on both axes so a
/// long outage can't turn into an unbounded memory leak: once either limit is hit, the oldest
/// queued frames are dropped to make room for new ones, and the connection is considered stale
/// enough that a fresh handshake (rather than silent resumption) is forced on reconnect.
const RETAIN_BYTES_LIMIT: usize = 8 * 1024 * 1024;
const RETAIN_AGE_LIMIT: Duration = Duration::from_secs(30);

struct Pending {
    msg_type: u16,
    payload: Vec<u8>,
    queued_at: Instant,
}

/// One outbound connection from a game or gate process to a single dispatcher shard. The caller
/// drives `sync` every tick; reconnection with exponential-capped backoff happens transparently.
pub struct DispatcherClient {
    shard_id: u16,
    addr: SocketAddr,
    client_type: ClientType,
    gid: u16,
    conn: Option<Connection>,
    handshake_sent: bool,
    backoff: Duration,
    next_attempt: Instant,
    pending: Vec<Pending>,
    pending_bytes: usize,
}

impl DispatcherClient {
    pub fn new(shard_id: u16, addr: SocketAddr, client_type: ClientType, gid: u16, now: Instant) -> DispatcherClient {
        DispatcherClient {
            shard_id,
            addr,
            client_type,
            gid,
            conn: None,
            handshake_sent: false,
            backoff: INITIAL_BACKOFF,
            next_attempt: now,
            pending: Vec::new(),
            pending_bytes: 0,
        }
    }

    pub fn shard_id(&self) -> u16 {
        self.shard_id
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some() && self.handshake_sent
    }

    /// Queues a message for delivery to this shard. If disconnected, the message is buffered up
    /// to `RETAIN_BYTES_LIMIT` / `RETAIN_AGE_LIMIT`; overflow drops the oldest entries first.
    pub fn push(&mut self, msg_type: u16, payload: Vec<u8>, now: Instant) {
        if let Some(conn) = &mut self.conn {
            if self.handshake_sent && conn.queue(msg_type, &payload).is_ok() {
                return;
            }
        }

        self.pending_bytes += payload.len();
        self.pending.push(Pending { msg_type, payload, queued_at: now });
        self.evict_overflow(now);
    }

    fn evict_overflow(&mut self, now: Instant) {
        while self.pending_bytes > RETAIN_BYTES_LIMIT
            || self.pending.first().map_or(false, |p| now.duration_since(p.queued_at) > RETAIN_AGE_LIMIT)
        {
            match self.pending.first() {
                Some(p) if self.pending.len() > 1 => {
                    self.pending_bytes -= p.payload.len();
                    self.pending.remove(0);
                }
                _ => break,
            }
        }
    }

    /// Drains all frames received from the shard since the last call.
    pub fn pull(&mut self) -> Vec<Frame> {
        match &mut self.conn {
            Some(conn) => conn.drain_frames().unwrap_or_default(),
            None => Vec::new(),
        }
    }

    /// Drives connection lifecycle: attempts reconnection on backoff, sends the typed handshake
    /// once connected, flushes egress/ingress. Returns `true` if a fresh connection was
    /// established this tick (caller should treat this as `isReconnect` per the handshake type).
    pub fn sync(&mut self, now: Instant) -> io::Result<bool> {
        let mut reconnected = false;

        if self.conn.is_none() {
            if now >= self.next_attempt {
                match self.try_connect(now) {
                    Ok(()) => {
                        reconnected = true;
                        self.backoff = INITIAL_BACKOFF;
                    }
                    Err(_) => {
                        self.next_attempt = now + self.backoff;
                        self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
            return Ok(reconnected);
        }

        if !self.handshake_sent {
            let msg_type = self.client_type.handshake_msg_type();
            let mut payload = Vec::with_capacity(2);
            payload.extend_from_slice(&self.gid.to_be_bytes());
            if self.conn.as_mut().unwrap().queue(msg_type, &payload).is_ok() {
                self.handshake_sent = true;
                self.flush_pending(now);
            }
        }

        let lost = {
            let conn = self.conn.as_mut().unwrap();
            conn.receive(now).is_err() || (conn.has_egress() && conn.send(now).is_err())
        };

        if lost {
            self.conn = None;
            self.handshake_sent = false;
            self.next_attempt = now + self.backoff;
            self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
        }

        Ok(reconnected)
    }

    fn flush_pending(&mut self, now: Instant) {
        let conn = match &mut self.conn {
            Some(c) => c,
            None => return,
        };

        let mut remaining = Vec::new();
        for p in self.pending.drain(..) {
            if conn.queue(p.msg_type, &p.payload).is_err() {
                remaining.push(p);
            }
        }
        self.pending_bytes = remaining.iter().map(|p| p.payload.len()).sum();
        self.pending = remaining;
        self.evict_overflow(now);
    }

    fn try_connect(&mut self, now: Instant) -> io::Result<()> {
        let stream = TcpStream::connect(&self.addr)?;
        self.conn = Some(Connection::new(stream, now)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_msg_types_are_distinct() {
        assert_ne!(ClientType::Game.handshake_msg_type(), ClientType::Gate.handshake_msg_type());
        assert_ne!(ClientType::Game.handshake_msg_type(), ClientType::GameRestore.handshake_msg_type());
    }

    #[test]
    fn push_while_disconnected_buffers_and_evicts_by_size() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let now = Instant::now();
        let mut client = DispatcherClient::new(0, addr, ClientType::Game, 1, now);

        for i in 0..32 {
            client.push(1, vec![0u8; RETAIN_BYTES_LIMIT / 16], now + Duration::from_millis(i));
        }

        assert!(client.pending_bytes <= RETAIN_BYTES_LIMIT);
        assert!(!client.pending.is_empty());
    }

    #[test]
    fn push_while_disconnected_evicts_by_age() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let now = Instant::now();
        let mut client = DispatcherClient::new(0, addr, ClientType::Gate, 1, now);

        client.push(1, vec![1, 2, 3], now);
        let later = now + RETAIN_AGE_LIMIT + Duration::from_secs(1);
        client.push(1, vec![4, 5, 6], later);

        assert_eq!(client.pending.len(), 1);
        assert_eq!(client.pending[0].payload, vec![4, 5, 6]);
    }
}
