//! In-memory versioned entity store
//!
//! Each call takes the store's lock once, so every call is atomic on its
//! own, and nothing spans calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use core_kernel::{
    CreateOutcome, DomainPort, Entity, EntityStore, IdempotencyKey, PortError, Predicate, Versioned,
};

struct Table<E: Entity> {
    rows: HashMap<E::Id, Versioned<E>>,
    /// Insertion order, so listings are stable
    order: Vec<E::Id>,
    keys: HashMap<IdempotencyKey, E::Id>,
}

impl<E: Entity> Default for Table<E> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            order: Vec::new(),
            keys: HashMap::new(),
        }
    }
}

impl<E: Entity> Table<E> {
    fn insert(&mut self, entity: E) -> Result<Versioned<E>, PortError> {
        let id = entity.id();
        if self.rows.contains_key(&id) {
            return Err(PortError::conflict(format!("{} {} already exists", E::KIND, id)));
        }
        let stored = Versioned::new(1, entity);
        self.rows.insert(id, stored.clone());
        self.order.push(id);
        Ok(stored)
    }
}

/// Entity store backed by a `HashMap` behind a tokio `RwLock`
///
/// Versions start at 1 and grow by one on every update. Writes can be made
/// to fail on demand to exercise partial saga failures.
pub struct InMemoryEntityStore<E: Entity> {
    table: RwLock<Table<E>>,
    failing_writes: AtomicU32,
}

impl<E: Entity> Default for InMemoryEntityStore<E> {
    fn default() -> Self {
        Self {
            table: RwLock::new(Table::default()),
            failing_writes: AtomicU32::new(0),
        }
    }
}

impl<E: Entity> InMemoryEntityStore<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` writes fail with a connection error
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn injected_failure(&self) -> Result<(), PortError> {
        let taken = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match taken {
            Ok(_) => Err(PortError::connection(format!("{} store unavailable", E::KIND))),
            Err(_) => Ok(()),
        }
    }
}

impl<E: Entity> DomainPort for InMemoryEntityStore<E> {}

#[async_trait]
impl<E: Entity> EntityStore<E> for InMemoryEntityStore<E> {
    async fn get(&self, id: E::Id) -> Result<Versioned<E>, PortError> {
        self.table
            .read()
            .await
            .rows
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found(E::KIND, id))
    }

    async fn list(&self) -> Result<Vec<Versioned<E>>, PortError> {
        let table = self.table.read().await;
        Ok(table.order.iter().filter_map(|id| table.rows.get(id).cloned()).collect())
    }

    async fn filter(&self, predicate: Predicate<'_, E>) -> Result<Vec<Versioned<E>>, PortError> {
        let table = self.table.read().await;
        Ok(table
            .order
            .iter()
            .filter_map(|id| table.rows.get(id))
            .filter(|row| predicate(&row.entity))
            .cloned()
            .collect())
    }

    #[instrument(skip_all, fields(kind = E::KIND))]
    async fn create(&self, entity: E) -> Result<Versioned<E>, PortError> {
        self.injected_failure()?;
        self.table.write().await.insert(entity)
    }

    #[instrument(skip_all, fields(kind = E::KIND, key = %key))]
    async fn create_once(&self, key: &IdempotencyKey, entity: E) -> Result<CreateOutcome<E>, PortError> {
        self.injected_failure()?;
        let mut table = self.table.write().await;

        if let Some(existing) = table.keys.get(key).and_then(|id| table.rows.get(id)) {
            debug!("idempotency key already used");
            return Ok(CreateOutcome::Existing(existing.clone()));
        }

        let id = entity.id();
        let stored = table.insert(entity)?;
        table.keys.insert(key.clone(), id);
        Ok(CreateOutcome::Created(stored))
    }

    async fn update(&self, entity: E, expected_version: u64) -> Result<Versioned<E>, PortError> {
        self.injected_failure()?;
        let id = entity.id();
        let mut table = self.table.write().await;

        let row = table
            .rows
            .get_mut(&id)
            .ok_or_else(|| PortError::not_found(E::KIND, id))?;
        if row.version != expected_version {
            return Err(PortError::conflict(format!(
                "{} {} is at version {}, expected {}",
                E::KIND,
                id,
                row.version,
                expected_version
            )));
        }

        *row = Versioned::new(expected_version + 1, entity);
        Ok(row.clone())
    }

    async fn bulk_create(&self, entities: Vec<E>) -> Result<Vec<Versioned<E>>, PortError> {
        let mut created = Vec::with_capacity(entities.len());
        for entity in entities {
            created.push(self.create(entity).await?);
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    struct RowId(u32);

    impl fmt::Display for RowId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "ROW-{}", self.0)
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: RowId,
        value: &'static str,
    }

    impl Entity for Row {
        type Id = RowId;
        const KIND: &'static str = "Row";

        fn id(&self) -> RowId {
            self.id
        }
    }

    fn row(id: u32, value: &'static str) -> Row {
        Row { id: RowId(id), value }
    }

    #[tokio::test]
    async fn test_update_requires_current_version() {
        let store = InMemoryEntityStore::<Row>::new();
        let created = store.create(row(1, "a")).await.unwrap();
        assert_eq!(created.version, 1);

        let updated = store.update(row(1, "b"), 1).await.unwrap();
        assert_eq!(updated.version, 2);

        let stale = store.update(row(1, "c"), 1).await.unwrap_err();
        assert!(stale.is_conflict());
        assert_eq!(store.get(RowId(1)).await.unwrap().value, "b");
    }

    #[tokio::test]
    async fn test_create_once_returns_existing_on_replay() {
        let store = InMemoryEntityStore::<Row>::new();
        let key = IdempotencyKey::new("row", "natural");

        let first = store.create_once(&key, row(1, "a")).await.unwrap();
        assert!(first.was_created());

        let second = store.create_once(&key, row(2, "b")).await.unwrap();
        assert!(!second.was_created());
        assert_eq!(second.into_inner().id, RowId(1));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_id_conflicts() {
        let store = InMemoryEntityStore::<Row>::new();
        store.create(row(1, "a")).await.unwrap();
        assert!(store.create(row(1, "b")).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_listing_keeps_insertion_order() {
        let store = InMemoryEntityStore::<Row>::new();
        store.bulk_create(vec![row(3, "c"), row(1, "a"), row(2, "b")]).await.unwrap();

        let ids: Vec<_> = store.list().await.unwrap().iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![3, 1, 2]);

        let odd = store.filter(&|r: &Row| r.id.0 % 2 == 1).await.unwrap();
        assert_eq!(odd.len(), 2);
    }

    #[tokio::test]
    async fn test_injected_failures_are_transient_and_run_out() {
        let store = InMemoryEntityStore::<Row>::new();
        store.create(row(1, "a")).await.unwrap();
        store.fail_next_writes(1);

        let err = store.update(row(1, "b"), 1).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.update(row(1, "b"), 1).await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_missing_row_is_not_found() {
        let store: InMemoryEntityStore<Row> = InMemoryEntityStore::new();
        assert!(store.get(RowId(9)).await.unwrap_err().is_not_found());
        assert!(store.update(row(9, "x"), 1).await.unwrap_err().is_not_found());
    }
}
