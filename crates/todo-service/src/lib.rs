//! todo-service — instrumented CRUD over a [`TodoRepository`].
//!
//! [`TodoService`] validates input, delegates to the repository, and keeps
//! the todo and database series of [`AppMetrics`] in step with the store.
//!
//! [`TodoRepository`]: todo_state::TodoRepository
//! [`AppMetrics`]: todo_metrics::AppMetrics

pub mod error;
pub mod service;

pub use error::{DbOperation, ServiceError, ServiceResult};
pub use service::TodoService;
