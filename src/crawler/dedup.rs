use crate::record::{DedupScope, Record};
use crate::storage::{DedupStore, StorageResult};
use std::sync::Arc;

/// Result of observing one record against the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First sighting; the record was stored
    Insert,
    /// Already stored; keep going
    SkipDuplicate,
    /// Already stored non-pinned item in incremental mode; everything older is synced
    StopSignal,
}

/// Incremental membership test and insert
///
/// Pinned items are exempt from the stop signal because they sit at the top of a
/// timeline regardless of age.
#[derive(Clone)]
pub struct DedupSync {
    store: Arc<dyn DedupStore>,
}

impl DedupSync {
    pub fn new(store: Arc<dyn DedupStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DedupStore> {
        &self.store
    }

    pub fn observe(
        &self,
        scope: &DedupScope,
        record: &Record,
        increase: bool,
    ) -> StorageResult<Observation> {
        let key = scope.key();

        if !self.store.exists(&key, &record.id)? {
            self.store.insert(&key, &record.id, &record.payload)?;
            return Ok(Observation::Insert);
        }

        if increase && !record.pinned {
            Ok(Observation::StopSignal)
        } else {
            Ok(Observation::SkipDuplicate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;
    use chrono::DateTime;
    use serde_json::json;

    fn record(id: &str, pinned: bool) -> Record {
        Record {
            id: id.to_string(),
            created_at: DateTime::from_timestamp(0, 0).unwrap(),
            pinned,
            payload: json!({ "aweme_id": id }),
        }
    }

    fn sync() -> DedupSync {
        DedupSync::new(Arc::new(SqliteStorage::open_in_memory().unwrap()))
    }

    #[test]
    fn test_first_sighting_inserts() {
        let sync = sync();
        let scope = DedupScope::new("post", "u1");

        assert_eq!(
            sync.observe(&scope, &record("a", false), false).unwrap(),
            Observation::Insert
        );
        assert!(sync.store().exists("post:u1", "a").unwrap());
    }

    #[test]
    fn test_duplicate_outcomes() {
        let sync = sync();
        let scope = DedupScope::new("post", "u1");
        sync.observe(&scope, &record("a", false), false).unwrap();
        sync.observe(&scope, &record("p", true), false).unwrap();

        assert_eq!(
            sync.observe(&scope, &record("a", false), false).unwrap(),
            Observation::SkipDuplicate
        );
        assert_eq!(
            sync.observe(&scope, &record("a", false), true).unwrap(),
            Observation::StopSignal
        );
        assert_eq!(
            sync.observe(&scope, &record("p", true), true).unwrap(),
            Observation::SkipDuplicate
        );
    }

    #[test]
    fn test_replay_is_idempotent() {
        let sync = sync();
        let scope = DedupScope::new("mix", "m9");
        let page: Vec<Record> = (1..=5).map(|i| record(&i.to_string(), false)).collect();

        for r in &page {
            sync.observe(&scope, r, false).unwrap();
        }
        let before = sync.store().scope_counts().unwrap();

        for r in &page {
            assert_eq!(
                sync.observe(&scope, r, false).unwrap(),
                Observation::SkipDuplicate
            );
        }
        assert_eq!(sync.store().scope_counts().unwrap(), before);
        assert_eq!(sync.store().count_total().unwrap(), 5);
    }

    #[test]
    fn test_scopes_do_not_collide() {
        let sync = sync();
        sync.observe(&DedupScope::new("post", "u1"), &record("a", false), true)
            .unwrap();

        assert_eq!(
            sync.observe(&DedupScope::new("like", "u1"), &record("a", false), true)
                .unwrap(),
            Observation::Insert
        );
    }
}
