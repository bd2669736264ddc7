//! todo-state — persistence for todo items.
//!
//! Defines the `Todo` entity, the [`TodoRepository`] seam the service layer
//! talks to, and two backends:
//!
//! - [`EmbeddedStore`], backed by [redb](https://docs.rs/redb), on disk or
//!   in memory. Used for local runs and tests.
//! - [`PgStore`], backed by a sqlx Postgres pool. Used in deployments.
//!
//! # Architecture
//!
//! ```text
//! TodoRepository
//!   ├── EmbeddedStore  (redb, JSON rows keyed by u64 id)
//!   └── PgStore        (sqlx, `todos` table)
//! ```
//!
//! Both stores are `Clone` + `Send` + `Sync` and can be shared across
//! async tasks.

pub mod error;
pub mod postgres;
pub mod repository;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use postgres::PgStore;
pub use repository::TodoRepository;
pub use store::EmbeddedStore;
pub use tables::TODO_TABLE_NAME;
pub use types::*;
