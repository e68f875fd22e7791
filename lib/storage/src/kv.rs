use crate::error::StorageError;

/// Flat and hash key/value operations against a pluggable KV backend (Redis in the reference
/// deployment). `find` is optional: backends built on a hash-slot store (Redis included) cannot
/// do an ordered range scan and should return `StorageError::Unsupported`; callers must fall
/// back to `EntityStore::list_entity_ids` in that case rather than treating it as fatal.
pub trait KvBackend: Send {
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    fn hget(&mut self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StorageError>;
    fn hput(&mut self, key: &str, field: &str, value: &[u8]) -> Result<(), StorageError>;

    fn find(&mut self, _begin: &str, _end: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        Err(StorageError::Unsupported("find"))
    }

    fn close(&mut self);
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct MockKvBackend {
        flat: HashMap<String, Vec<u8>>,
        hashes: HashMap<String, HashMap<String, Vec<u8>>>,
        closed: bool,
    }

    impl KvBackend for MockKvBackend {
        fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            Ok(self.flat.get(key).cloned())
        }

        fn put(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
            self.flat.insert(key.to_string(), value.to_vec());
            Ok(())
        }

        fn hget(&mut self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StorageError> {
            Ok(self.hashes.get(key).and_then(|h| h.get(field)).cloned())
        }

        fn hput(&mut self, key: &str, field: &str, value: &[u8]) -> Result<(), StorageError> {
            self.hashes.entry(key.to_string()).or_default().insert(field.to_string(), value.to_vec());
            Ok(())
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[test]
    fn flat_and_hash_values_are_independent() {
        let mut kv = MockKvBackend::default();
        kv.put("a", b"1").unwrap();
        kv.hput("a", "field", b"2").unwrap();

        assert_eq!(kv.get("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(kv.hget("a", "field").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn find_is_unsupported_by_default() {
        let mut kv = MockKvBackend::default();
        let err = kv.find("a", "z").unwrap_err();
        assert!(matches!(err, StorageError::Unsupported("find")));
    }
}
