use indexmap::IndexMap;

/// One registered path. `epoch` is bumped on every write and used, together with `gid` as a
/// tiebreak, to resolve conflicting writes deterministically when registries from different
/// shards are merged (gossip is last-writer-wins on `(path, epoch, gid)`).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Entry {
    pub value: String,
    pub epoch: u64,
    pub gid: u16,
}

#[derive(Debug, Eq, PartialEq)]
pub enum RegisterOutcome {
    /// This write became (or remains) the recorded value.
    Registered,
    /// Someone else already holds this path and `excl` was false, so the write was rejected.
    AlreadyOwned(Entry),
}

/// The path-prefix registry mirrored across dispatcher shards (`srvdis` in the reference
/// implementation). Paths are plain strings (`Service/<name>`, `Service/<name>/EntityID`, ...);
/// there is no nesting semantics beyond prefix matching.
#[derive(Default)]
pub struct Registry {
    entries: IndexMap<String, Entry>,
    next_epoch: u64,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Writes `path = value` on behalf of `gid`. When `excl` is false this is a register-if-
    /// absent: if the path is already owned, the existing entry is returned unchanged and the
    /// caller knows it lost the race. When `excl` is true the write always wins -- used by a
    /// game republishing its own entity as authoritative after noticing the registry disagrees
    /// with local state.
    pub fn register(&mut self, path: &str, value: impl Into<String>, gid: u16, excl: bool) -> RegisterOutcome {
        if !excl {
            if let Some(existing) = self.entries.get(path) {
                return RegisterOutcome::AlreadyOwned(existing.clone());
            }
        }

        self.next_epoch += 1;
        let entry = Entry { value: value.into(), epoch: self.next_epoch, gid };
        self.entries.insert(path.to_string(), entry);
        RegisterOutcome::Registered
    }

    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    pub fn remove(&mut self, path: &str) -> Option<Entry> {
        self.entries.shift_remove(path)
    }

    pub fn traverse_by_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a Entry)> + 'a {
        self.entries
            .iter()
            .filter(move |(path, _)| path.starts_with(prefix))
            .map(|(path, entry)| (path.as_str(), entry))
    }

    /// Merges an entry observed from a peer shard's gossip. Higher epoch wins; on a tie, the
    /// lower gid wins (arbitrary but deterministic, matching last-writer-wins semantics without
    /// needing synchronized clocks).
    pub fn merge(&mut self, path: &str, incoming: Entry) {
        let replace = match self.entries.get(path) {
            None => true,
            Some(current) => {
                incoming.epoch > current.epoch
                    || (incoming.epoch == current.epoch && incoming.gid < current.gid)
            }
        };

        if replace {
            self.next_epoch = self.next_epoch.max(incoming.epoch);
            self.entries.insert(path.to_string(), incoming);
        }
    }
}

pub const SERVICE_PREFIX: &str = "Service/";

pub fn service_path(name: &str) -> String {
    format!("{}{}", SERVICE_PREFIX, name)
}

pub fn service_entity_path(name: &str) -> String {
    format!("{}{}/EntityID", SERVICE_PREFIX, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_if_absent_lets_first_writer_win() {
        let mut reg = Registry::new();
        let first = reg.register("Service/Matchmaker", "game1", 1, false);
        assert_eq!(first, RegisterOutcome::Registered);

        let second = reg.register("Service/Matchmaker", "game2", 2, false);
        match second {
            RegisterOutcome::AlreadyOwned(entry) => assert_eq!(entry.gid, 1),
            _ => panic!("expected AlreadyOwned"),
        }
    }

    #[test]
    fn exclusive_register_always_overwrites() {
        let mut reg = Registry::new();
        reg.register("Service/Matchmaker", "game1", 1, false);
        let outcome = reg.register("Service/Matchmaker", "game2", 2, true);
        assert_eq!(outcome, RegisterOutcome::Registered);
        assert_eq!(reg.get("Service/Matchmaker").unwrap().gid, 2);
    }

    #[test]
    fn traverse_by_prefix_only_returns_matches() {
        let mut reg = Registry::new();
        reg.register("Service/Matchmaker", "game1", 1, false);
        reg.register("Service/Matchmaker/EntityID", "abc", 1, false);
        reg.register("Other/Thing", "x", 1, false);

        let matches: Vec<_> = reg.traverse_by_prefix("Service/").map(|(p, _)| p).collect();
        assert_eq!(matches.len(), 2);
        assert!(matches.contains(&"Service/Matchmaker"));
        assert!(matches.contains(&"Service/Matchmaker/EntityID"));
    }

    #[test]
    fn merge_prefers_higher_epoch() {
        let mut reg = Registry::new();
        reg.merge("Service/X", Entry { value: "game1".into(), epoch: 5, gid: 1 });
        reg.merge("Service/X", Entry { value: "game2".into(), epoch: 3, gid: 2 });
        assert_eq!(reg.get("Service/X").unwrap().value, "game1");

        reg.merge("Service/X", Entry { value: "game3".into(), epoch: 9, gid: 3 });
        assert_eq!(reg.get("Service/X").unwrap().value, "game3");
    }

    #[test]
    fn merge_breaks_epoch_ties_with_lower_gid() {
        let mut reg = Registry::new();
        reg.merge("Service/X", Entry { value: "game2".into(), epoch: 1, gid: 2 });
        reg.merge("Service/X", Entry { value: "game1".into(), epoch: 1, gid: 1 });
        assert_eq!(reg.get("Service/X").unwrap().gid, 1);
    }
}
