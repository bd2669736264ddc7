//! The persistence seam consumed by the todo service.

use std::future::Future;

use crate::error::StoreResult;
use crate::types::{NewTodo, Todo, TodoId};

/// CRUD access to the todo table.
///
/// Implementations own id assignment and timestamps: `insert` sets both
/// `created_at` and `updated_at`, `save` refreshes `updated_at`.
pub trait TodoRepository: Send + Sync + 'static {
    /// Insert a new row and return it with its assigned id.
    fn insert(&self, input: &NewTodo) -> impl Future<Output = StoreResult<Todo>> + Send;

    /// All rows, newest `created_at` first.
    fn find_all(&self) -> impl Future<Output = StoreResult<Vec<Todo>>> + Send;

    fn find_by_id(&self, id: TodoId) -> impl Future<Output = StoreResult<Option<Todo>>> + Send;

    /// Persist the mutable fields of an existing row.
    fn save(&self, todo: &Todo) -> impl Future<Output = StoreResult<Todo>> + Send;

    /// Delete a row. Returns true if it existed.
    fn remove(&self, id: TodoId) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Count rows, optionally filtered by completion state.
    fn count(&self, completed: Option<bool>) -> impl Future<Output = StoreResult<u64>> + Send;

    /// Connections currently checked out of the backend's pool, if it has one.
    fn active_connections(&self) -> Option<u32> {
        None
    }
}
