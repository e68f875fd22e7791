use std::fs;
use std::path::PathBuf;

use entity::EntityId;
use storage::{EntityStore, StorageError};

/// Filesystem-backed `EntityStore`: one file per `(type, id)` under `root/<type>/<hex id>`.
/// Production deployments plug in a real backend (Redis via `KvBackend`, ...); this is the
/// concrete store shipped for local runs and for the test fleet this crate's own tests drive
/// against.
pub struct FileEntityStore {
    root: PathBuf,
}

impl FileEntityStore {
    pub fn new(root: PathBuf) -> FileEntityStore {
        FileEntityStore { root }
    }

    fn path_for(&self, type_name: &str, id: EntityId) -> PathBuf {
        self.root.join(type_name).join(hex::encode(id.to_be_bytes()))
    }

    fn type_dir(&self, type_name: &str) -> PathBuf {
        self.root.join(type_name)
    }
}

impl EntityStore for FileEntityStore {
    fn write(&mut self, type_name: &str, id: EntityId, data: &[u8]) -> Result<(), StorageError> {
        let dir = self.type_dir(type_name);
        fs::create_dir_all(&dir)?;
        fs::write(self.path_for(type_name, id), data)?;
        Ok(())
    }

    fn read(&mut self, type_name: &str, id: EntityId) -> Result<Vec<u8>, StorageError> {
        fs::read(self.path_for(type_name, id)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound
            } else {
                StorageError::Io(e)
            }
        })
    }

    fn exists(&mut self, type_name: &str, id: EntityId) -> Result<bool, StorageError> {
        Ok(self.path_for(type_name, id).is_file())
    }

    fn list_entity_ids(&mut self, type_name: &str) -> Result<Vec<EntityId>, StorageError> {
        let dir = self.type_dir(type_name);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = match name.to_str() {
                Some(n) => n,
                None => continue,
            };
            if let Ok(bytes) = hex::decode(name) {
                if bytes.len() == 16 {
                    let mut arr = [0u8; 16];
                    arr.copy_from_slice(&bytes);
                    ids.push(EntityId::from_be_bytes(arr));
                }
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileEntityStore::new(dir.path().to_path_buf());
        let id = EntityId::generate();

        store.write("Avatar", id, b"payload").unwrap();
        assert_eq!(store.read("Avatar", id).unwrap(), b"payload");
        assert!(store.exists("Avatar", id).unwrap());
    }

    #[test]
    fn read_of_missing_entity_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileEntityStore::new(dir.path().to_path_buf());
        let err = store.read("Avatar", EntityId::generate()).unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[test]
    fn list_entity_ids_filters_by_type() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileEntityStore::new(dir.path().to_path_buf());
        let a = EntityId::generate();
        let b = EntityId::generate();

        store.write("Avatar", a, b"x").unwrap();
        store.write("Matchmaker", b, b"y").unwrap();

        assert_eq!(store.list_entity_ids("Avatar").unwrap(), vec![a]);
    }
}
