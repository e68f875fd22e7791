use indexmap::IndexMap;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// A single value in an entity's attribute tree. Trees only: nothing here can hold a reference
/// back to an ancestor, so cycles are impossible by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Attr {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Attr>),
    Map(IndexMap<String, Attr>),
}

impl Attr {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Attr::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Attr::Str(v) => Some(v),
            _ => None,
        }
    }
}

/// Top-level attribute container for one entity. Changes are tracked per top-level key: `save`
/// serializes only the keys touched since the last save (a delta), while `freeze` always
/// serializes the whole tree. This matches how the attribute tree is actually consumed: saves
/// are frequent and should be cheap, freezes are rare and must be complete.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttrMap {
    values: IndexMap<String, Attr>,
    #[serde(skip)]
    dirty: IndexSet<String>,
}

impl AttrMap {
    pub fn new() -> AttrMap {
        AttrMap::default()
    }

    pub fn get(&self, key: &str) -> Option<&Attr> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Attr) {
        let key = key.into();
        self.values.insert(key.clone(), value);
        self.dirty.insert(key);
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Drains and returns the delta since the last save: only the keys that changed, with their
    /// current values.
    pub fn take_save_delta(&mut self) -> IndexMap<String, Attr> {
        let mut delta = IndexMap::new();
        for key in self.dirty.drain(..) {
            if let Some(value) = self.values.get(&key) {
                delta.insert(key, value.clone());
            }
        }
        delta
    }

    /// Full snapshot for freeze; does not clear the dirty set since freezing isn't a save.
    pub fn snapshot(&self) -> IndexMap<String, Attr> {
        self.values.clone()
    }

    pub fn restore(values: IndexMap<String, Attr>) -> AttrMap {
        AttrMap { values, dirty: IndexSet::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_marks_key_dirty_until_saved() {
        let mut attrs = AttrMap::new();
        assert!(!attrs.is_dirty());

        attrs.set("hp", Attr::Int(10));
        assert!(attrs.is_dirty());

        let delta = attrs.take_save_delta();
        assert_eq!(delta.get("hp"), Some(&Attr::Int(10)));
        assert!(!attrs.is_dirty());
    }

    #[test]
    fn snapshot_includes_clean_keys() {
        let mut attrs = AttrMap::new();
        attrs.set("name", Attr::Str("avatar".into()));
        attrs.take_save_delta();

        let snap = attrs.snapshot();
        assert_eq!(snap.get("name"), Some(&Attr::Str("avatar".into())));
    }

    #[test]
    fn restore_rebuilds_a_clean_map() {
        let mut values = IndexMap::new();
        values.insert("x".to_string(), Attr::Float(1.5));
        let attrs = AttrMap::restore(values);
        assert!(!attrs.is_dirty());
        assert_eq!(attrs.get("x"), Some(&Attr::Float(1.5)));
    }
}
