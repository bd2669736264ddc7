//! redb table definitions for the embedded todo store.

use redb::TableDefinition;

/// Todo rows keyed by id, JSON-serialized.
pub const TODOS: TableDefinition<u64, &[u8]> = TableDefinition::new("todos");

/// Store bookkeeping: the id sequence and per-state row counts.
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Key in [`META`] holding the last id handed out.
pub const LAST_ID_KEY: &str = "last_id";

/// Key in [`META`] holding the number of open todos.
pub const ACTIVE_COUNT_KEY: &str = "active_count";

/// Key in [`META`] holding the number of completed todos.
pub const COMPLETED_COUNT_KEY: &str = "completed_count";

/// The [`META`] counter tracking rows in the given completion state.
pub fn count_key(completed: bool) -> &'static str {
    if completed {
        COMPLETED_COUNT_KEY
    } else {
        ACTIVE_COUNT_KEY
    }
}

/// Table name reported to query metrics, shared by every backend.
pub const TODO_TABLE_NAME: &str = "todos";
