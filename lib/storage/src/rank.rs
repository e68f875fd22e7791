use crate::error::StorageError;

#[derive(Debug, Clone, PartialEq)]
pub struct KvItem {
    pub key: String,
    pub val: Vec<u8>,
}

/// Sorted-set operations over a pluggable backend, used for leaderboards and similar ranked
/// data. Values are opaque bytes; callers serialize with whatever packer they've agreed on
/// (MessagePack in the reference deployment).
pub trait RankBackend: Send {
    fn get(&mut self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StorageError>;
    fn put(&mut self, key: &str, field: &str, score: f64, val: &[u8]) -> Result<(), StorageError>;
    fn get_rank(&mut self, key: &str, field: &str) -> Result<Option<u64>, StorageError>;
    fn list(&mut self, key: &str, begin_idx: u64, end_idx: u64) -> Result<Vec<KvItem>, StorageError>;
    fn close(&mut self);
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct MockRankBackend {
        sets: HashMap<String, Vec<(String, f64, Vec<u8>)>>,
    }

    impl RankBackend for MockRankBackend {
        fn get(&mut self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StorageError> {
            Ok(self
                .sets
                .get(key)
                .and_then(|entries| entries.iter().find(|(f, _, _)| f == field))
                .map(|(_, _, v)| v.clone()))
        }

        fn put(&mut self, key: &str, field: &str, score: f64, val: &[u8]) -> Result<(), StorageError> {
            let entries = self.sets.entry(key.to_string()).or_default();
            entries.retain(|(f, _, _)| f != field);
            entries.push((field.to_string(), score, val.to_vec()));
            entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
            Ok(())
        }

        fn get_rank(&mut self, key: &str, field: &str) -> Result<Option<u64>, StorageError> {
            Ok(self
                .sets
                .get(key)
                .and_then(|entries| entries.iter().position(|(f, _, _)| f == field))
                .map(|idx| idx as u64))
        }

        fn list(&mut self, key: &str, begin_idx: u64, end_idx: u64) -> Result<Vec<KvItem>, StorageError> {
            let entries = self.sets.get(key).cloned().unwrap_or_default();
            Ok(entries
                .into_iter()
                .skip(begin_idx as usize)
                .take((end_idx.saturating_sub(begin_idx)) as usize)
                .map(|(field, _, val)| KvItem { key: field, val })
                .collect())
        }

        fn close(&mut self) {}
    }

    #[test]
    fn put_then_get_rank_orders_by_score_descending() {
        let mut rank = MockRankBackend::default();
        rank.put("leaderboard", "alice", 100.0, b"a").unwrap();
        rank.put("leaderboard", "bob", 200.0, b"b").unwrap();

        assert_eq!(rank.get_rank("leaderboard", "bob").unwrap(), Some(0));
        assert_eq!(rank.get_rank("leaderboard", "alice").unwrap(), Some(1));
    }

    #[test]
    fn list_returns_requested_window() {
        let mut rank = MockRankBackend::default();
        rank.put("lb", "a", 3.0, b"1").unwrap();
        rank.put("lb", "b", 2.0, b"2").unwrap();
        rank.put("lb", "c", 1.0, b"3").unwrap();

        let page = rank.list("lb", 1, 3).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].key, "b");
    }
}
