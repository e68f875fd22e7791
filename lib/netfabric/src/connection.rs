use std::io;
use std::time::Instant;

use mio::net::TcpStream;
use wire::{frame, Buffer, Frame};

pub const WRITE_BUF_SIZE: usize = 8 * 65536;
pub const READ_BUF_SIZE: usize = 65536;

/// One TCP connection carrying framed messages in both directions. Used for dispatcher-to-game,
/// dispatcher-to-gate and gate-to-client links alike; none of them encrypt or sequence the wire,
/// so a single plain buffered codec serves all three.
pub struct Connection {
    stream: TcpStream,
    egress: Buffer,
    ingress: Buffer,
    last_egress: Instant,
    last_ingress: Instant,
}

impl Connection {
    pub fn new(stream: TcpStream, now: Instant) -> io::Result<Connection> {
        Ok(Connection {
            stream,
            egress: Buffer::new(WRITE_BUF_SIZE),
            ingress: Buffer::new(READ_BUF_SIZE),
            last_egress: now,
            last_ingress: now,
        })
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    #[inline]
    pub fn has_egress(&self) -> bool {
        !self.egress.is_empty()
    }

    #[inline]
    pub fn last_egress_elapsed(&self, now: Instant) -> std::time::Duration {
        now.duration_since(self.last_egress)
    }

    #[inline]
    pub fn last_ingress_elapsed(&self, now: Instant) -> std::time::Duration {
        now.duration_since(self.last_ingress)
    }

    /// Appends a framed message to the egress buffer. Returns an error if the connection's
    /// egress buffer is already full (the caller owns backpressure policy above this layer).
    pub fn queue(&mut self, msg_type: u16, payload: &[u8]) -> Result<(), frame::FrameError> {
        let mut framed = Vec::with_capacity(frame::HEADER_SIZE + payload.len());
        frame::encode(msg_type, payload, &mut framed)?;
        self.egress.push(&framed).map_err(|_| frame::FrameError::PayloadTooLarge(payload.len()))
    }

    /// Drains as many complete frames as are currently buffered.
    pub fn drain_frames(&mut self) -> Result<Vec<Frame>, frame::FrameError> {
        let mut frames = Vec::new();
        while let Some(f) = frame::try_decode(&mut self.ingress)? {
            frames.push(f);
        }
        Ok(frames)
    }

    pub fn send(&mut self, now: Instant) -> io::Result<usize> {
        let written = self.egress.egress(&mut self.stream)?;
        if written > 0 {
            self.last_egress = now;
        }
        Ok(written)
    }

    pub fn receive(&mut self, now: Instant) -> io::Result<usize> {
        match self.ingress.ingress(&mut self.stream) {
            Ok(n) => {
                if n > 0 {
                    self.last_ingress = now;
                }
                Ok(n)
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }
}
