//! EmbeddedStore — redb-backed todo persistence.
//!
//! Rows are JSON-serialized into redb's `&[u8]` value column under their
//! numeric id. Ids come from a sequence kept in the `meta` table and
//! committed in the same transaction as the insert, so an id is never
//! handed out twice, even after the row is deleted or the file reopened.
//! The `meta` table also holds per-state row counts, maintained by every
//! write, so counting never decodes rows.
//!
//! redb is synchronous and commits fsync, so every operation runs on the
//! blocking pool. The store supports both on-disk and in-memory backends
//! (the latter for tests and local development).

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, Table};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::repository::TodoRepository;
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Thread-safe todo store backed by redb.
#[derive(Clone)]
pub struct EmbeddedStore {
    db: Arc<Database>,
}

impl EmbeddedStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "embedded todo store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory todo store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet, and rebuild the row
    /// counts for files written without them.
    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            // Opening a table in a write transaction creates it if absent.
            let todos = txn.open_table(TODOS).map_err(map_err!(Table))?;
            let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
            let seeded = meta.get(ACTIVE_COUNT_KEY).map_err(map_err!(Read))?.is_some()
                && meta.get(COMPLETED_COUNT_KEY).map_err(map_err!(Read))?.is_some();
            if !seeded {
                let (mut active, mut completed) = (0u64, 0u64);
                for entry in todos.iter().map_err(map_err!(Read))? {
                    let (_, value) = entry.map_err(map_err!(Read))?;
                    if decode(value.value())?.completed {
                        completed += 1;
                    } else {
                        active += 1;
                    }
                }
                meta.insert(ACTIVE_COUNT_KEY, active).map_err(map_err!(Write))?;
                meta.insert(COMPLETED_COUNT_KEY, completed)
                    .map_err(map_err!(Write))?;
                info!(active, completed, "todo counts rebuilt");
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Run a synchronous redb operation on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> StoreResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| StoreError::Transaction(format!("store task failed: {e}")))?
    }
}

fn decode(bytes: &[u8]) -> StoreResult<Todo> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

fn read_counter<T>(meta: &T, key: &str) -> StoreResult<u64>
where
    T: ReadableTable<&'static str, u64>,
{
    Ok(meta
        .get(key)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0))
}

/// Move one row into (`Some(to)`) and/or out of (`Some(from)`) a state count.
fn shift_count(
    meta: &mut Table<'_, &'static str, u64>,
    from: Option<bool>,
    to: Option<bool>,
) -> StoreResult<()> {
    if from == to {
        return Ok(());
    }
    if let Some(state) = from {
        let key = count_key(state);
        let value = read_counter(&*meta, key)?.saturating_sub(1);
        meta.insert(key, value).map_err(map_err!(Write))?;
    }
    if let Some(state) = to {
        let key = count_key(state);
        let value = read_counter(&*meta, key)? + 1;
        meta.insert(key, value).map_err(map_err!(Write))?;
    }
    Ok(())
}

fn insert_row(db: &Database, input: &NewTodo) -> StoreResult<Todo> {
    let txn = db.begin_write().map_err(map_err!(Transaction))?;
    let todo;
    {
        let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
        let id = read_counter(&meta, LAST_ID_KEY)? + 1;
        meta.insert(LAST_ID_KEY, id).map_err(map_err!(Write))?;

        let now = Utc::now();
        todo = Todo {
            id: id as TodoId,
            title: input.title.clone(),
            description: input.description.clone(),
            completed: false,
            created_at: now,
            updated_at: now,
        };
        let value = serde_json::to_vec(&todo).map_err(map_err!(Serialize))?;
        let mut table = txn.open_table(TODOS).map_err(map_err!(Table))?;
        table
            .insert(id, value.as_slice())
            .map_err(map_err!(Write))?;
        shift_count(&mut meta, None, Some(todo.completed))?;
    }
    txn.commit().map_err(map_err!(Transaction))?;
    Ok(todo)
}

fn read_all(db: &Database) -> StoreResult<Vec<Todo>> {
    let txn = db.begin_read().map_err(map_err!(Transaction))?;
    let table = txn.open_table(TODOS).map_err(map_err!(Table))?;
    let mut results = Vec::new();
    for entry in table.iter().map_err(map_err!(Read))? {
        let (_, value) = entry.map_err(map_err!(Read))?;
        results.push(decode(value.value())?);
    }
    Ok(results)
}

fn read_one(db: &Database, key: u64) -> StoreResult<Option<Todo>> {
    let txn = db.begin_read().map_err(map_err!(Transaction))?;
    let table = txn.open_table(TODOS).map_err(map_err!(Table))?;
    match table.get(key).map_err(map_err!(Read))? {
        Some(guard) => Ok(Some(decode(guard.value())?)),
        None => Ok(None),
    }
}

fn save_row(db: &Database, key: u64, saved: &Todo) -> StoreResult<()> {
    let value = serde_json::to_vec(saved).map_err(map_err!(Serialize))?;
    let txn = db.begin_write().map_err(map_err!(Transaction))?;
    {
        let mut table = txn.open_table(TODOS).map_err(map_err!(Table))?;
        let previous = match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => decode(guard.value())?,
            None => {
                return Err(StoreError::Write(format!("todo {} does not exist", saved.id)));
            }
        };
        table
            .insert(key, value.as_slice())
            .map_err(map_err!(Write))?;

        let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
        shift_count(&mut meta, Some(previous.completed), Some(saved.completed))?;
    }
    txn.commit().map_err(map_err!(Transaction))?;
    Ok(())
}

fn remove_row(db: &Database, key: u64) -> StoreResult<bool> {
    let txn = db.begin_write().map_err(map_err!(Transaction))?;
    let existed;
    {
        let mut table = txn.open_table(TODOS).map_err(map_err!(Table))?;
        let removed = match table.remove(key).map_err(map_err!(Write))? {
            Some(guard) => Some(decode(guard.value())?.completed),
            None => None,
        };
        existed = removed.is_some();
        if existed {
            let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
            shift_count(&mut meta, removed, None)?;
        }
    }
    txn.commit().map_err(map_err!(Transaction))?;
    Ok(existed)
}

fn read_count(db: &Database, completed: Option<bool>) -> StoreResult<u64> {
    let txn = db.begin_read().map_err(map_err!(Transaction))?;
    let meta = txn.open_table(META).map_err(map_err!(Table))?;
    match completed {
        Some(state) => read_counter(&meta, count_key(state)),
        None => Ok(read_counter(&meta, ACTIVE_COUNT_KEY)?
            + read_counter(&meta, COMPLETED_COUNT_KEY)?),
    }
}

impl TodoRepository for EmbeddedStore {
    async fn insert(&self, input: &NewTodo) -> StoreResult<Todo> {
        let input = input.clone();
        let todo = self.blocking(move |db| insert_row(db, &input)).await?;
        debug!(id = todo.id, "todo inserted");
        Ok(todo)
    }

    async fn find_all(&self) -> StoreResult<Vec<Todo>> {
        let mut todos = self.blocking(read_all).await?;
        todos.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(todos)
    }

    async fn find_by_id(&self, id: TodoId) -> StoreResult<Option<Todo>> {
        let Ok(key) = u64::try_from(id) else {
            return Ok(None);
        };
        self.blocking(move |db| read_one(db, key)).await
    }

    async fn save(&self, todo: &Todo) -> StoreResult<Todo> {
        let key = u64::try_from(todo.id)
            .map_err(|_| StoreError::Write(format!("invalid todo id {}", todo.id)))?;
        let mut saved = todo.clone();
        saved.updated_at = Utc::now();

        let saved = self
            .blocking(move |db| save_row(db, key, &saved).map(|()| saved))
            .await?;
        debug!(id = saved.id, "todo saved");
        Ok(saved)
    }

    async fn remove(&self, id: TodoId) -> StoreResult<bool> {
        let Ok(key) = u64::try_from(id) else {
            return Ok(false);
        };
        let existed = self.blocking(move |db| remove_row(db, key)).await?;
        debug!(id, existed, "todo removed");
        Ok(existed)
    }

    async fn count(&self, completed: Option<bool>) -> StoreResult<u64> {
        self.blocking(move |db| read_count(db, completed)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> EmbeddedStore {
        EmbeddedStore::open_in_memory().unwrap()
    }

    #[tokio::test]
    async fn insert_assigns_sequential_ids() {
        let store = store();
        let a = store.insert(&NewTodo::new("a")).await.unwrap();
        let b = store.insert(&NewTodo::new("b")).await.unwrap();

        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert!(!a.completed);
        assert_eq!(a.created_at, a.updated_at);
    }

    #[tokio::test]
    async fn ids_are_not_reused_after_delete() {
        let store = store();
        let first = store.insert(&NewTodo::new("first")).await.unwrap();
        assert!(store.remove(first.id).await.unwrap());

        let second = store.insert(&NewTodo::new("second")).await.unwrap();
        assert_eq!(second.id, first.id + 1);
    }

    #[tokio::test]
    async fn find_by_id_missing_returns_none() {
        let store = store();
        assert!(store.find_by_id(42).await.unwrap().is_none());
        assert!(store.find_by_id(-1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_all_is_newest_first() {
        let store = store();
        for title in ["one", "two", "three"] {
            store.insert(&NewTodo::new(title)).await.unwrap();
        }

        let titles: Vec<String> = store
            .find_all()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["three", "two", "one"]);
    }

    #[tokio::test]
    async fn save_refreshes_updated_at_only() {
        let store = store();
        let mut todo = store.insert(&NewTodo::new("draft")).await.unwrap();
        let created_at = todo.created_at;

        todo.completed = true;
        let saved = store.save(&todo).await.unwrap();

        assert!(saved.completed);
        assert_eq!(saved.created_at, created_at);
        assert!(saved.updated_at >= created_at);
        assert_eq!(store.find_by_id(todo.id).await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn save_missing_row_fails() {
        let store = store();
        let mut todo = store.insert(&NewTodo::new("gone")).await.unwrap();
        store.remove(todo.id).await.unwrap();

        todo.title = "back".to_string();
        let err = store.save(&todo).await.unwrap_err();
        assert_eq!(err.kind(), "write");
    }

    #[tokio::test]
    async fn remove_reports_existence() {
        let store = store();
        let todo = store.insert(&NewTodo::new("x")).await.unwrap();

        assert!(store.remove(todo.id).await.unwrap());
        assert!(!store.remove(todo.id).await.unwrap());
    }

    #[tokio::test]
    async fn count_filters_by_completion() {
        let store = store();
        for i in 0..5 {
            let mut todo = store.insert(&NewTodo::new(format!("t{i}"))).await.unwrap();
            if i % 2 == 0 {
                todo.completed = true;
                store.save(&todo).await.unwrap();
            }
        }

        assert_eq!(store.count(None).await.unwrap(), 5);
        assert_eq!(store.count(Some(true)).await.unwrap(), 3);
        assert_eq!(store.count(Some(false)).await.unwrap(), 2);
        assert_eq!(store.active_connections(), None);
    }

    #[tokio::test]
    async fn counts_follow_toggles_and_removals() {
        let store = store();
        let mut a = store.insert(&NewTodo::new("a")).await.unwrap();
        let b = store.insert(&NewTodo::new("b")).await.unwrap();

        a.completed = true;
        store.save(&a).await.unwrap();
        // Saving without a state change leaves the counts alone.
        a.title = "renamed".to_string();
        store.save(&a).await.unwrap();
        assert_eq!(store.count(Some(true)).await.unwrap(), 1);
        assert_eq!(store.count(Some(false)).await.unwrap(), 1);

        assert!(store.remove(a.id).await.unwrap());
        assert!(!store.remove(a.id).await.unwrap());
        assert_eq!(store.count(Some(true)).await.unwrap(), 0);
        assert_eq!(store.count(None).await.unwrap(), 1);

        assert!(store.remove(b.id).await.unwrap());
        assert_eq!(store.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_save_leaves_counts_unchanged() {
        let store = store();
        let mut todo = store.insert(&NewTodo::new("gone")).await.unwrap();
        store.remove(todo.id).await.unwrap();

        todo.completed = true;
        assert!(store.save(&todo).await.is_err());
        assert_eq!(store.count(Some(true)).await.unwrap(), 0);
        assert_eq!(store.count(Some(false)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn counts_are_rebuilt_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("todos.redb");

        {
            let store = EmbeddedStore::open(&db_path).unwrap();
            for i in 0..3 {
                let mut todo = store.insert(&NewTodo::new(format!("t{i}"))).await.unwrap();
                if i == 0 {
                    todo.completed = true;
                    store.save(&todo).await.unwrap();
                }
            }

            // Drop the counters, as in a file written before they existed.
            let txn = store.db.begin_write().unwrap();
            {
                let mut meta = txn.open_table(META).unwrap();
                meta.remove(ACTIVE_COUNT_KEY).unwrap();
                meta.remove(COMPLETED_COUNT_KEY).unwrap();
            }
            txn.commit().unwrap();
        }

        let store = EmbeddedStore::open(&db_path).unwrap();
        assert_eq!(store.count(Some(true)).await.unwrap(), 1);
        assert_eq!(store.count(Some(false)).await.unwrap(), 2);
        assert_eq!(store.count(None).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("todos.redb");

        {
            let store = EmbeddedStore::open(&db_path).unwrap();
            store.insert(&NewTodo::new("keep me")).await.unwrap();
        }

        let store = EmbeddedStore::open(&db_path).unwrap();
        let todos = store.find_all().await.unwrap();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].title, "keep me");

        let next = store.insert(&NewTodo::new("next")).await.unwrap();
        assert_eq!(next.id, 2);
        assert_eq!(store.count(Some(false)).await.unwrap(), 2);
    }
}
