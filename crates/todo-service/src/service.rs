//! TodoService — the only code that mutates todos.
//!
//! Every repository call is timed into `db_query_duration_seconds`, every
//! store failure is counted in `db_errors_total`, and the active/completed
//! gauges are recomputed from count queries after each mutation.
//! Concurrent mutations may publish their recounts in either order; the
//! last one wins.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use todo_metrics::AppMetrics;
use todo_state::{NewTodo, StoreError, TODO_TABLE_NAME, Todo, TodoId, TodoPatch, TodoRepository};

use crate::error::{DbOperation, ServiceError, ServiceResult};

pub struct TodoService<R> {
    repo: R,
    metrics: Arc<AppMetrics>,
}

impl<R: TodoRepository> TodoService<R> {
    pub fn new(repo: R, metrics: Arc<AppMetrics>) -> Self {
        Self { repo, metrics }
    }

    pub fn metrics(&self) -> &Arc<AppMetrics> {
        &self.metrics
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Align metrics with the store after a process start.
    ///
    /// Lifetime counters live in memory and restart at zero, so they are
    /// reset and re-seeded from current totals: `todos_created_total` gets
    /// the row count and `todos_completed_total` the completed count.
    pub async fn sync_metrics(&self) -> ServiceResult<()> {
        let (active, completed, total) = tokio::try_join!(
            self.repo.count(Some(false)),
            self.repo.count(Some(true)),
            self.repo.count(None),
        )
        .map_err(|e| self.persistence_failure(DbOperation::Count, e))?;

        self.metrics.update_todo_counts(active, completed);
        self.metrics.sync_counters(total, completed);
        info!(total, active, completed, "todo metrics synced with store");
        Ok(())
    }

    pub async fn create(&self, input: NewTodo) -> ServiceResult<Todo> {
        validate_title(&input.title)?;

        let start = Instant::now();
        let todo = self
            .repo
            .insert(&input)
            .await
            .map_err(|e| self.persistence_failure(DbOperation::Insert, e))?;
        self.record_query(DbOperation::Insert, start);

        self.metrics.todo_created();
        self.refresh_todo_counts().await;
        debug!(id = todo.id, "todo created");
        Ok(todo)
    }

    /// All todos, newest first. Filtering is left to clients.
    pub async fn list(&self) -> ServiceResult<Vec<Todo>> {
        let start = Instant::now();
        let todos = self
            .repo
            .find_all()
            .await
            .map_err(|e| self.persistence_failure(DbOperation::Select, e))?;
        self.record_query(DbOperation::Select, start);
        Ok(todos)
    }

    pub async fn get(&self, id: TodoId) -> ServiceResult<Todo> {
        let start = Instant::now();
        let found = self
            .repo
            .find_by_id(id)
            .await
            .map_err(|e| self.persistence_failure(DbOperation::Select, e))?;
        self.record_query(DbOperation::Select, start);
        found.ok_or(ServiceError::NotFound(id))
    }

    pub async fn update(&self, id: TodoId, patch: TodoPatch) -> ServiceResult<Todo> {
        if let Some(title) = &patch.title {
            validate_title(title)?;
        }

        let start = Instant::now();
        let mut todo = self.get(id).await?;
        let was_completed = todo.completed;
        patch.apply_to(&mut todo);

        let saved = self
            .repo
            .save(&todo)
            .await
            .map_err(|e| self.persistence_failure(DbOperation::Update, e))?;
        self.record_query(DbOperation::Update, start);

        if !was_completed && saved.completed {
            self.metrics.todo_completed();
        }
        self.refresh_todo_counts().await;
        debug!(id, "todo updated");
        Ok(saved)
    }

    pub async fn remove(&self, id: TodoId) -> ServiceResult<()> {
        let start = Instant::now();
        let todo = self.get(id).await?;

        let existed = self
            .repo
            .remove(todo.id)
            .await
            .map_err(|e| self.persistence_failure(DbOperation::Delete, e))?;
        self.record_query(DbOperation::Delete, start);

        // Lost a race with another delete.
        if !existed {
            return Err(ServiceError::NotFound(id));
        }

        self.metrics.todo_deleted();
        self.refresh_todo_counts().await;
        debug!(id, "todo removed");
        Ok(())
    }

    /// Flip `completed`. Only the incomplete → complete transition counts
    /// towards `todos_completed_total`.
    pub async fn toggle_complete(&self, id: TodoId) -> ServiceResult<Todo> {
        let start = Instant::now();
        let mut todo = self.get(id).await?;
        let was_completed = todo.completed;
        todo.completed = !todo.completed;

        let saved = self
            .repo
            .save(&todo)
            .await
            .map_err(|e| self.persistence_failure(DbOperation::Update, e))?;
        self.record_query(DbOperation::Update, start);

        if !was_completed && saved.completed {
            self.metrics.todo_completed();
        }
        self.refresh_todo_counts().await;
        debug!(id, completed = saved.completed, "todo toggled");
        Ok(saved)
    }

    /// Copy the repository's pool usage into `db_connections_active`.
    pub fn publish_pool_usage(&self) {
        if let Some(active) = self.repo.active_connections() {
            self.metrics.set_db_connections_active(active);
        }
    }

    /// Recount active/completed rows and republish the gauges.
    ///
    /// Runs after a committed mutation, so a failing count is recorded and
    /// logged rather than failing the request.
    async fn refresh_todo_counts(&self) {
        let counts = tokio::try_join!(self.repo.count(Some(false)), self.repo.count(Some(true)));
        match counts {
            Ok((active, completed)) => self.metrics.update_todo_counts(active, completed),
            Err(e) => {
                self.metrics
                    .record_db_error(DbOperation::Count.as_str(), e.kind());
                warn!(error = %e, "todo gauges not refreshed");
            }
        }
    }

    fn record_query(&self, operation: DbOperation, start: Instant) {
        self.metrics
            .record_db_query(operation.as_str(), TODO_TABLE_NAME, start.elapsed());
    }

    fn persistence_failure(&self, operation: DbOperation, source: StoreError) -> ServiceError {
        self.metrics
            .record_db_error(operation.as_str(), source.kind());
        warn!(%operation, error = %source, "todo store call failed");
        ServiceError::Persistence { operation, source }
    }
}

fn validate_title(title: &str) -> ServiceResult<()> {
    if title.trim().is_empty() {
        return Err(ServiceError::Validation("title should not be empty".to_string()));
    }
    Ok(())
}
