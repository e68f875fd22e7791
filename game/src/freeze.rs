use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use entity::{Attr, AttrMap, Entity, EntityId, EntityRegistry};
use indexmap::IndexMap;
use wire::{Codec, MsgPackCodec};

/// Per-game binary dump: `[count][entity...]`, each entity `[type][id][space-id][attr-tree]`.
/// Triggered by the freeze signal; its inverse runs on `-restore` at startup.
pub fn freeze_to_file(registry: &EntityRegistry, path: &Path) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    let ids: Vec<EntityId> = registry.all_ids().collect();

    out.write_u32::<BigEndian>(ids.len() as u32)?;

    let codec = MsgPackCodec;
    for id in ids {
        let entity = registry.get(id).expect("id came from registry.all_ids()");
        write_str(&mut out, entity.type_name)?;
        out.write_all(&entity.id.to_be_bytes())?;
        out.write_all(&entity.space.to_be_bytes())?;

        let snapshot = entity.attrs.snapshot();
        let bytes = codec
            .encode(&snapshot)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        out.write_u32::<BigEndian>(bytes.len() as u32)?;
        out.write_all(&bytes)?;
    }

    out.flush()
}

pub struct RestoredEntity {
    pub type_name: String,
    pub id: EntityId,
    pub space: EntityId,
    pub attrs: AttrMap,
}

pub fn restore_from_file(path: &Path) -> io::Result<Vec<RestoredEntity>> {
    let mut input = BufReader::new(File::open(path)?);
    let count = input.read_u32::<BigEndian>()?;

    let codec = MsgPackCodec;
    let mut out = Vec::with_capacity(count as usize);

    for _ in 0..count {
        let type_name = read_str(&mut input)?;

        let mut id_bytes = [0u8; 16];
        input.read_exact(&mut id_bytes)?;
        let id = EntityId::from_be_bytes(id_bytes);

        let mut space_bytes = [0u8; 16];
        input.read_exact(&mut space_bytes)?;
        let space = EntityId::from_be_bytes(space_bytes);

        let attr_len = input.read_u32::<BigEndian>()? as usize;
        let mut attr_bytes = vec![0u8; attr_len];
        input.read_exact(&mut attr_bytes)?;
        let values: IndexMap<String, Attr> = codec
            .decode(&attr_bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        out.push(RestoredEntity { type_name, id, space, attrs: AttrMap::restore(values) });
    }

    Ok(out)
}

fn write_str<W: Write>(out: &mut W, s: &str) -> io::Result<()> {
    out.write_u16::<BigEndian>(s.len() as u16)?;
    out.write_all(s.as_bytes())
}

fn read_str<R: Read>(input: &mut R) -> io::Result<String> {
    let len = input.read_u16::<BigEndian>()? as usize;
    let mut buf = vec![0u8; len];
    input.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

/// Used by `reconcile` and restart paths to rehydrate a previously frozen entity back into a
/// live registry under its original id.
pub fn reinstall(registry: &mut EntityRegistry, restored: RestoredEntity) -> Result<EntityId, entity::RegistryError> {
    // Entity::type_name is `&'static str`; restore only runs once at startup so leaking the
    // handful of distinct type names read from the freeze file is cheaper than re-plumbing the
    // registry to own strings just for this path.
    let type_name: &'static str = Box::leak(restored.type_name.into_boxed_str());
    let mut entity = Entity::new(type_name, restored.id, restored.space, true);
    entity.attrs = restored.attrs;
    registry.create_locally(entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use entity::new_nil_space;
    use tempfile::tempdir;

    #[test]
    fn freeze_then_restore_preserves_ids_and_attributes() {
        let mut registry = EntityRegistry::new();
        registry.register_type("Avatar", true);

        let space = new_nil_space(1);
        let space_id = space.id;

        let mut avatar = Entity::new("Avatar", EntityId::generate(), space_id, true);
        avatar.attrs.set("hp", Attr::Int(42));
        avatar.attrs.set("name", Attr::Str("Aria".into()));
        let original_id = avatar.id;
        registry.create_locally(avatar).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("game1.freeze");
        freeze_to_file(&registry, &path).unwrap();

        let restored = restore_from_file(&path).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].id, original_id);
        assert_eq!(restored[0].attrs.get("hp"), Some(&Attr::Int(42)));
        assert_eq!(restored[0].attrs.get("name"), Some(&Attr::Str("Aria".into())));
    }
}
