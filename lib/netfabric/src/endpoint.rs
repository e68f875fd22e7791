use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use indexmap::IndexSet;
use mio::net::TcpListener;
use mio::{Events, Poll, PollOpt, Ready, Token};

use crate::connection::Connection;
use wire::Frame;

pub type ConnId = usize;

const SERVER_TOKEN: Token = Token(usize::max_value());
const INGRESS_TIMEOUT: Duration = Duration::from_secs(30);
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Copy, Clone)]
pub enum ConnectionChange {
    Connected(ConnId),
    Disconnected(ConnId),
}

/// Accepts inbound TCP connections and drives their framed I/O on every `sync` tick. Shared by
/// the dispatcher's shard listeners (accepting games and gates) and the gate's client listener
/// (accepting players).
pub struct Endpoint {
    listener: TcpListener,
    poll: Poll,
    events: Events,
    conns: Vec<Option<Connection>>,
    free: Vec<ConnId>,
    live: IndexSet<ConnId>,
    changes: Vec<ConnectionChange>,
    housekeeping_at: Instant,
}

impl Endpoint {
    pub fn bind(address: &str, now: Instant) -> io::Result<Endpoint> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid bind address"))?;
        let listener = TcpListener::bind(&addr)?;
        let poll = Poll::new()?;
        poll.register(&listener, SERVER_TOKEN, Ready::readable(), PollOpt::edge())?;

        Ok(Endpoint {
            listener,
            poll,
            events: Events::with_capacity(4096),
            conns: Vec::new(),
            free: Vec::new(),
            live: IndexSet::new(),
            changes: Vec::new(),
            housekeeping_at: now,
        })
    }

    pub fn queue(&mut self, id: ConnId, msg_type: u16, payload: &[u8]) {
        if let Some(conn) = &mut self.conns[id] {
            let _ = conn.queue(msg_type, payload);
        }
    }

    pub fn pull(&mut self, id: ConnId) -> Vec<Frame> {
        match &mut self.conns[id] {
            Some(conn) => conn.drain_frames().unwrap_or_default(),
            None => Vec::new(),
        }
    }

    pub fn changes(&mut self) -> impl Iterator<Item = ConnectionChange> + '_ {
        self.changes.drain(..)
    }

    pub fn disconnect(&mut self, id: ConnId) {
        if let Some(conn) = self.conns[id].take() {
            let _ = self.poll.deregister(conn.stream());
            self.live.shift_remove(&id);
            self.free.push(id);
            self.changes.push(ConnectionChange::Disconnected(id));
        }
    }

    pub fn sync(&mut self, now: Instant) -> io::Result<()> {
        if now.duration_since(self.housekeeping_at) >= HOUSEKEEPING_INTERVAL {
            self.housekeeping(now);
            self.housekeeping_at = now;
        }

        self.poll.poll(&mut self.events, Some(Duration::from_millis(0)))?;

        let mut accepted = Vec::new();
        let mut to_disconnect = Vec::new();

        for event in &self.events {
            if event.token() == SERVER_TOKEN {
                loop {
                    match self.listener.accept() {
                        Ok((stream, _)) => accepted.push(stream),
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(e) => return Err(e),
                    }
                }
                continue;
            }

            let id: ConnId = event.token().0;
            let readiness = event.readiness();

            if let Some(conn) = &mut self.conns[id] {
                if readiness.is_readable() && conn.receive(now).is_err() {
                    to_disconnect.push(id);
                    continue;
                }
                if conn.has_egress() && conn.send(now).is_err() {
                    to_disconnect.push(id);
                }
            }
        }

        for stream in accepted {
            let id = match self.free.pop() {
                Some(id) => id,
                None => {
                    let id = self.conns.len();
                    self.conns.push(None);
                    id
                }
            };

            stream.set_nodelay(true).ok();
            self.poll
                .register(&stream, Token(id), Ready::readable() | Ready::writable(), PollOpt::edge())?;

            let conn = Connection::new(stream, now)?;
            self.conns[id] = Some(conn);
            self.live.insert(id);
            self.changes.push(ConnectionChange::Connected(id));
        }

        for id in to_disconnect {
            self.disconnect(id);
        }

        Ok(())
    }

    fn housekeeping(&mut self, now: Instant) {
        let conns = &mut self.conns;
        let changes = &mut self.changes;
        let free = &mut self.free;

        self.live.retain(|&id| {
            let keep = match &conns[id] {
                Some(conn) => conn.last_ingress_elapsed(now) < INGRESS_TIMEOUT,
                None => false,
            };

            if !keep {
                conns[id] = None;
                free.push(id);
                changes.push(ConnectionChange::Disconnected(id));
            }

            keep
        });
    }
}
