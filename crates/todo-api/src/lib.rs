//! todo-api — REST API for the todo service.
//!
//! Provides axum route handlers over [`TodoService`] and the Prometheus
//! scrape endpoint. Every todo route is wrapped by the HTTP metrics
//! interceptor; `/metrics` is not.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/todos` | List all todos, newest first |
//! | POST | `/todos` | Create a todo |
//! | GET | `/todos/{id}` | Get a todo |
//! | PATCH | `/todos/{id}` | Update title, description or completed |
//! | DELETE | `/todos/{id}` | Delete a todo |
//! | PATCH | `/todos/{id}/toggle` | Flip completed |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;
pub mod interceptor;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, patch};
use todo_service::TodoService;
use todo_state::TodoRepository;

/// Path of the scrape endpoint, excluded from HTTP metrics.
pub const METRICS_PATH: &str = "/metrics";

/// Shared state for API handlers.
pub struct ApiState<R> {
    pub service: Arc<TodoService<R>>,
}

impl<R> Clone for ApiState<R> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

/// Build the complete API router (todo routes + metrics).
pub fn build_router<R: TodoRepository>(service: Arc<TodoService<R>>) -> Router {
    let metrics = Arc::clone(service.metrics());
    let api_state = ApiState { service };

    let todo_routes = Router::new()
        .route(
            "/todos",
            get(handlers::list_todos::<R>).post(handlers::create_todo::<R>),
        )
        .route(
            "/todos/{id}",
            get(handlers::get_todo::<R>)
                .patch(handlers::update_todo::<R>)
                .delete(handlers::delete_todo::<R>),
        )
        .route("/todos/{id}/toggle", patch(handlers::toggle_todo::<R>))
        .route_layer(middleware::from_fn_with_state(
            metrics,
            interceptor::track_http,
        ))
        .with_state(api_state.clone());

    Router::new().merge(todo_routes).route(
        METRICS_PATH,
        get(handlers::prometheus_metrics::<R>).with_state(api_state),
    )
}
