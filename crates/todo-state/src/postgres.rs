//! PgStore — Postgres-backed todo persistence over a sqlx pool.

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::{debug, info};

use crate::error::StoreResult;
use crate::repository::TodoRepository;
use crate::types::*;

const COLUMNS: &str = "id, title, description, completed, created_at, updated_at";

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS todos (
    id BIGSERIAL PRIMARY KEY,
    title VARCHAR(255) NOT NULL,
    description TEXT NULL,
    completed BOOLEAN NOT NULL DEFAULT false,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)";

/// Todo store over a Postgres connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool to the given `postgres://` URL.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let options: PgConnectOptions = url.parse()?;
        Self::connect_with(options, max_connections).await
    }

    /// Connect a pool with explicit connection options.
    pub async fn connect_with(options: PgConnectOptions, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        info!(max_connections, "postgres pool connected");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `todos` table if it is missing.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        debug!("todos schema ensured");
        Ok(())
    }
}

impl TodoRepository for PgStore {
    async fn insert(&self, input: &NewTodo) -> StoreResult<Todo> {
        let sql = format!(
            "INSERT INTO todos (title, description) VALUES ($1, $2) RETURNING {COLUMNS}"
        );
        let todo = sqlx::query_as::<_, Todo>(&sql)
            .bind(&input.title)
            .bind(&input.description)
            .fetch_one(&self.pool)
            .await?;
        debug!(id = todo.id, "todo inserted");
        Ok(todo)
    }

    async fn find_all(&self) -> StoreResult<Vec<Todo>> {
        let sql = format!("SELECT {COLUMNS} FROM todos ORDER BY created_at DESC, id DESC");
        Ok(sqlx::query_as::<_, Todo>(&sql).fetch_all(&self.pool).await?)
    }

    async fn find_by_id(&self, id: TodoId) -> StoreResult<Option<Todo>> {
        let sql = format!("SELECT {COLUMNS} FROM todos WHERE id = $1");
        Ok(sqlx::query_as::<_, Todo>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn save(&self, todo: &Todo) -> StoreResult<Todo> {
        let sql = format!(
            "UPDATE todos SET title = $2, description = $3, completed = $4, updated_at = now() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        let saved = sqlx::query_as::<_, Todo>(&sql)
            .bind(todo.id)
            .bind(&todo.title)
            .bind(&todo.description)
            .bind(todo.completed)
            .fetch_one(&self.pool)
            .await?;
        debug!(id = saved.id, "todo saved");
        Ok(saved)
    }

    async fn remove(&self, id: TodoId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM todos WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        let existed = result.rows_affected() > 0;
        debug!(id, existed, "todo removed");
        Ok(existed)
    }

    async fn count(&self, completed: Option<bool>) -> StoreResult<u64> {
        let count: i64 = match completed {
            Some(state) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM todos WHERE completed = $1")
                    .bind(state)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM todos")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count.max(0) as u64)
    }

    fn active_connections(&self) -> Option<u32> {
        let idle = self.pool.num_idle() as u32;
        Some(self.pool.size().saturating_sub(idle))
    }
}
