use byteorder::{BigEndian, ByteOrder};
use std::fmt;

use crate::buffer::Buffer;

/// `[u32 size][u16 msgtype][payload]`. `size` counts only the payload bytes, not the header.
pub const HEADER_SIZE: usize = 4 + 2;

/// Upper bound on a single frame's payload. Chosen to keep a misbehaving peer from forcing an
/// unbounded allocation while parsing; comfortably above anything a legitimate entity message or
/// service packet should need.
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Eq, PartialEq)]
pub enum FrameError {
    PayloadTooLarge(usize),
    Incomplete,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::PayloadTooLarge(n) => write!(f, "frame payload of {} bytes exceeds limit", n),
            FrameError::Incomplete => write!(f, "incomplete frame"),
        }
    }
}

impl std::error::Error for FrameError {}

/// A decoded frame boundary: message type plus the payload bytes, owned and detached from the
/// buffer they were parsed out of.
#[derive(Debug, PartialEq)]
pub struct Frame {
    pub msg_type: u16,
    pub payload: Vec<u8>,
}

/// Writes a complete frame (header + payload) into `out`. Used when the payload is already
/// serialized in memory.
pub fn encode(msg_type: u16, payload: &[u8], out: &mut Vec<u8>) -> Result<(), FrameError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(FrameError::PayloadTooLarge(payload.len()));
    }

    let mut header = [0u8; HEADER_SIZE];
    BigEndian::write_u32(&mut header[0..4], payload.len() as u32);
    BigEndian::write_u16(&mut header[4..6], msg_type);

    out.reserve(HEADER_SIZE + payload.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(payload);
    Ok(())
}

/// Attempts to pull one complete frame off the head of `buffer`. Returns `Ok(None)` when the
/// buffer doesn't yet hold a full frame (caller should keep reading from the socket). Consumes
/// the frame's bytes from `buffer` only when a full frame is returned.
pub fn try_decode(buffer: &mut Buffer) -> Result<Option<Frame>, FrameError> {
    if buffer.len() < HEADER_SIZE {
        return Ok(None);
    }

    let header = &buffer.read_slice()[..HEADER_SIZE];
    let payload_size = BigEndian::read_u32(&header[0..4]) as usize;
    let msg_type = BigEndian::read_u16(&header[4..6]);

    if payload_size > MAX_PAYLOAD_SIZE {
        return Err(FrameError::PayloadTooLarge(payload_size));
    }

    if buffer.len() < HEADER_SIZE + payload_size {
        return Ok(None);
    }

    let payload = buffer.read_slice()[HEADER_SIZE..HEADER_SIZE + payload_size].to_vec();
    buffer.move_head(HEADER_SIZE + payload_size);

    Ok(Some(Frame { msg_type, payload }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_recovers_message_type_and_payload() {
        let mut out = Vec::new();
        encode(7, b"hello", &mut out).unwrap();

        let mut buffer = Buffer::new(65536);
        buffer.push(&out).unwrap();

        let frame = try_decode(&mut buffer).unwrap().unwrap();
        assert_eq!(frame.msg_type, 7);
        assert_eq!(frame.payload, b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn decode_waits_for_a_full_header() {
        let mut buffer = Buffer::new(65536);
        buffer.push(&[0, 0, 0, 1]).unwrap();
        assert_eq!(try_decode(&mut buffer).unwrap(), None);
    }

    #[test]
    fn decode_waits_for_a_full_payload() {
        let mut out = Vec::new();
        encode(1, &[0u8; 10], &mut out).unwrap();

        let mut buffer = Buffer::new(65536);
        buffer.push(&out[..HEADER_SIZE + 4]).unwrap();

        assert!(try_decode(&mut buffer).unwrap().is_none());
    }

    #[test]
    fn decode_rejects_oversized_payload_claim() {
        let mut header = [0u8; HEADER_SIZE];
        BigEndian::write_u32(&mut header[0..4], (MAX_PAYLOAD_SIZE + 1) as u32);

        let mut buffer = Buffer::new(65536);
        buffer.push(&header).unwrap();

        assert_eq!(try_decode(&mut buffer), Err(FrameError::PayloadTooLarge(MAX_PAYLOAD_SIZE + 1)));
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let mut out = Vec::new();
        let big = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        assert_eq!(encode(1, &big, &mut out), Err(FrameError::PayloadTooLarge(MAX_PAYLOAD_SIZE + 1)));
    }
}
