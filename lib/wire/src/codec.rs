use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

#[derive(Debug)]
pub enum CodecError {
    MsgPackEncode(rmp_serde::encode::Error),
    MsgPackDecode(rmp_serde::decode::Error),
    Json(serde_json::Error),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::MsgPackEncode(e) => write!(f, "msgpack encode error: {}", e),
            CodecError::MsgPackDecode(e) => write!(f, "msgpack decode error: {}", e),
            CodecError::Json(e) => write!(f, "json codec error: {}", e),
        }
    }
}

impl std::error::Error for CodecError {}

/// Payload serialization is pluggable: every node agrees on one codec at build time. MessagePack
/// is the reference format used on the wire between nodes; JSON exists purely so packets can be
/// inspected by hand while debugging a connection.
pub trait Codec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError>;
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

pub struct MsgPackCodec;

impl Codec for MsgPackCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec(value).map_err(CodecError::MsgPackEncode)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        rmp_serde::from_slice(bytes).map_err(CodecError::MsgPackDecode)
    }
}

pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(CodecError::Json)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_derive::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        id: u64,
        name: String,
    }

    #[test]
    fn msgpack_roundtrips() {
        let codec = MsgPackCodec;
        let value = Sample { id: 42, name: "entity".into() };
        let bytes = codec.encode(&value).unwrap();
        let decoded: Sample = codec.decode(&bytes).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn json_roundtrips() {
        let codec = JsonCodec;
        let value = Sample { id: 7, name: "debug".into() };
        let bytes = codec.encode(&value).unwrap();
        let decoded: Sample = codec.decode(&bytes).unwrap();
        assert_eq!(value, decoded);
    }
}
