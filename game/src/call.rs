use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use entity::EntityId;
use std::io::{self, Read, Write};

/// Wire payload for `ENTITY_CALL`: `[target 16][method_len u16][method][args]`. `args` is an
/// opaque blob -- callers agree on its shape (typically MessagePack) out of band.
pub struct Call {
    pub target: EntityId,
    pub method: String,
    pub args: Vec<u8>,
}

impl Call {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(18 + self.method.len() + self.args.len());
        out.write_all(&self.target.to_be_bytes()).unwrap();
        out.write_u16::<BigEndian>(self.method.len() as u16).unwrap();
        out.write_all(self.method.as_bytes()).unwrap();
        out.write_all(&self.args).unwrap();
        out
    }

    pub fn decode(payload: &[u8]) -> io::Result<Call> {
        let mut cursor = payload;

        let mut id_bytes = [0u8; 16];
        cursor.read_exact(&mut id_bytes)?;
        let target = EntityId::from_be_bytes(id_bytes);

        let method_len = cursor.read_u16::<BigEndian>()? as usize;
        if cursor.len() < method_len {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "call payload truncated"));
        }
        let method = String::from_utf8(cursor[..method_len].to_vec())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        cursor = &cursor[method_len..];

        Ok(Call { target, method, args: cursor.to_vec() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrips() {
        let call = Call { target: EntityId::generate(), method: "Greet".to_string(), args: vec![1, 2, 3] };
        let encoded = call.encode();
        let decoded = Call::decode(&encoded).unwrap();

        assert_eq!(decoded.target, call.target);
        assert_eq!(decoded.method, "Greet");
        assert_eq!(decoded.args, vec![1, 2, 3]);
    }

    #[test]
    fn decode_rejects_truncated_method() {
        let mut bytes = EntityId::generate().to_be_bytes().to_vec();
        bytes.extend_from_slice(&100u16.to_be_bytes());
        assert!(Call::decode(&bytes).is_err());
    }
}
