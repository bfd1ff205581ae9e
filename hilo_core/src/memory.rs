//! In-process store implementations.
//!
//! Useful for tests and for running the service without a database. Both
//! stores are cheap to clone; clones share the same underlying state, which
//! lets several allocator instances contend on one [`MemoryCounterStore`] the
//! same way separate processes contend on one database table.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    async_trait, findable_column, CasOutcome, CounterStore, Fetchable, Identifiable, Insertable,
    ParamValue, RepoError, RepoResult, Repository,
};

fn invalid_input(msg: String) -> RepoError {
    RepoError::backend(std::io::Error::new(std::io::ErrorKind::InvalidInput, msg))
}

/// Entity rows kept in key order.
pub struct MemoryRepository<T: Identifiable> {
    rows: Arc<Mutex<BTreeMap<T::Key, T>>>,
}

impl<T: Identifiable> MemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Identifiable> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Identifiable> Clone for MemoryRepository<T> {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
        }
    }
}

#[async_trait]
impl<T> Repository<T> for MemoryRepository<T>
where
    T: Fetchable + Identifiable + Insertable + Clone + Send + Sync + 'static,
    T::Key: Ord + Clone + Send + Sync,
{
    async fn find_by_id(&self, id: &T::Key) -> RepoResult<Option<T>> {
        Ok(self.rows.lock().get(id).cloned())
    }

    async fn find_by_field(&self, field_name: &str, value: ParamValue) -> RepoResult<Vec<T>> {
        let column = findable_column::<T>(field_name)?;
        let idx = T::INSERT_COLUMNS
            .iter()
            .position(|c| *c == column)
            .ok_or_else(|| invalid_input(format!("findable column {column} is not stored")))?;
        let rows = self.rows.lock();
        Ok(rows
            .values()
            .filter(|row| row.insert_values().get(idx) == Some(&value))
            .cloned()
            .collect())
    }

    async fn insert(&self, entity: &T) -> RepoResult<T> {
        let key = entity
            .id()
            .ok_or_else(|| invalid_input("entity has no assigned id".to_string()))?;
        let mut rows = self.rows.lock();
        if rows.contains_key(&key) {
            return Err(RepoError::Conflict);
        }
        rows.insert(key, entity.clone());
        Ok(entity.clone())
    }

    async fn update(&self, entity: &T) -> RepoResult<T> {
        let key = entity.id().ok_or(RepoError::NotFound)?;
        let mut rows = self.rows.lock();
        match rows.get_mut(&key) {
            Some(row) => {
                *row = entity.clone();
                Ok(entity.clone())
            }
            None => Err(RepoError::NotFound),
        }
    }

    async fn delete_by_id(&self, id: &T::Key) -> RepoResult<bool> {
        Ok(self.rows.lock().remove(id).is_some())
    }
}

/// Counter rows in a shared map.
#[derive(Clone, Default)]
pub struct MemoryCounterStore {
    counters: Arc<Mutex<HashMap<String, i64>>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a counter row, overwriting any existing value.
    pub fn with_counter(self, block: &str, next_high: i64) -> Self {
        self.counters.lock().insert(block.to_string(), next_high);
        self
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn load(&self, block: &str) -> RepoResult<Option<i64>> {
        Ok(self.counters.lock().get(block).copied())
    }

    async fn insert_if_absent(&self, block: &str, value: i64) -> RepoResult<CasOutcome> {
        let mut counters = self.counters.lock();
        if counters.contains_key(block) {
            return Ok(CasOutcome::Conflict);
        }
        counters.insert(block.to_string(), value);
        Ok(CasOutcome::Swapped)
    }

    async fn compare_and_swap(
        &self,
        block: &str,
        expected: i64,
        new: i64,
    ) -> RepoResult<CasOutcome> {
        let mut counters = self.counters.lock();
        match counters.get_mut(block) {
            Some(current) if *current == expected => {
                *current = new;
                Ok(CasOutcome::Swapped)
            }
            _ => Ok(CasOutcome::Conflict),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AssignId;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: Option<u64>,
        label: String,
    }

    impl Fetchable for Item {
        const TABLE: &'static str = "items";
        const SELECT_COLUMNS: &'static [&'static str] = &["id", "label"];
        const FINDABLE_COLUMNS: &'static [(&'static str, &'static str)] = &[("label", "String")];
    }

    impl Identifiable for Item {
        type Key = u64;
        const ID_COLUMN: &'static str = "id";
        fn id(&self) -> Option<u64> {
            self.id
        }
    }

    impl AssignId for Item {
        fn assign_id(&mut self, id: u64) {
            self.id = Some(id);
        }
    }

    impl Insertable for Item {
        const INSERT_COLUMNS: &'static [&'static str] = &["id", "label"];
        fn insert_values(&self) -> Vec<ParamValue> {
            vec![
                self.id.map_or(ParamValue::Null, ParamValue::U64),
                ParamValue::String(self.label.clone()),
            ]
        }
    }

    fn item(id: u64, label: &str) -> Item {
        Item {
            id: Some(id),
            label: label.to_string(),
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_and_unassigned_keys() {
        let repo = MemoryRepository::<Item>::new();
        repo.insert(&item(1, "a")).await.unwrap();
        assert!(matches!(
            repo.insert(&item(1, "b")).await,
            Err(RepoError::Conflict)
        ));
        let mut unassigned = item(0, "c");
        unassigned.id = None;
        assert!(matches!(
            repo.insert(&unassigned).await,
            Err(RepoError::Backend { .. })
        ));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn find_by_field_filters_on_column_value() {
        let repo = MemoryRepository::<Item>::new();
        repo.insert(&item(1, "x")).await.unwrap();
        repo.insert(&item(2, "y")).await.unwrap();
        repo.insert(&item(3, "x")).await.unwrap();

        let found = repo
            .find_by_field("label", ParamValue::String("x".into()))
            .await
            .unwrap();
        assert_eq!(
            found.iter().map(|i| i.id).collect::<Vec<_>>(),
            vec![Some(1), Some(3)]
        );

        let err = repo
            .find_by_field("missing", ParamValue::Null)
            .await
            .expect_err("unknown column should fail");
        assert!(matches!(err, RepoError::UnknownField { .. }));
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_rows() {
        let repo = MemoryRepository::<Item>::new();
        assert!(matches!(
            repo.update(&item(9, "z")).await,
            Err(RepoError::NotFound)
        ));
        repo.insert(&item(9, "z")).await.unwrap();
        let mut changed = item(9, "zz");
        changed.assign_id(9);
        repo.update(&changed).await.unwrap();
        assert_eq!(repo.find_by_id(&9).await.unwrap(), Some(changed));
        assert!(repo.delete_by_id(&9).await.unwrap());
        assert!(!repo.delete_by_id(&9).await.unwrap());
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn counter_cas_only_applies_to_expected_value() {
        let store = MemoryCounterStore::new();
        assert_eq!(store.load("users").await.unwrap(), None);
        assert_eq!(
            store.compare_and_swap("users", 0, 1).await.unwrap(),
            CasOutcome::Conflict
        );
        assert!(store.insert_if_absent("users", 1).await.unwrap().is_swapped());
        assert_eq!(
            store.insert_if_absent("users", 5).await.unwrap(),
            CasOutcome::Conflict
        );
        assert_eq!(
            store.compare_and_swap("users", 0, 1).await.unwrap(),
            CasOutcome::Conflict
        );
        assert!(store.compare_and_swap("users", 1, 2).await.unwrap().is_swapped());
        assert_eq!(store.load("users").await.unwrap(), Some(2));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_swaps_of_one_value_have_one_winner() {
        let store = MemoryCounterStore::new().with_counter("users", 3);
        let attempts = (0..16).map(|_| {
            let s = store.clone();
            async move { s.compare_and_swap("users", 3, 4).await }
        });
        let outcomes = futures::future::join_all(attempts).await;
        let winners = outcomes
            .into_iter()
            .filter(|o| matches!(o, Ok(CasOutcome::Swapped)))
            .count();
        assert_eq!(winners, 1);
        assert_eq!(store.load("users").await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn clones_share_counter_rows() {
        let a = MemoryCounterStore::new().with_counter("users", 7);
        let b = a.clone();
        assert!(a.compare_and_swap("users", 7, 8).await.unwrap().is_swapped());
        assert_eq!(
            b.compare_and_swap("users", 7, 8).await.unwrap(),
            CasOutcome::Conflict
        );
        assert_eq!(b.load("users").await.unwrap(), Some(8));
    }
}
