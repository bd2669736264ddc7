//! REST API handlers.
//!
//! Each handler delegates to `TodoService` and returns the todo JSON
//! directly. Failures become `{"success": false, "error": ...}` with a
//! status derived from the service error.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{debug, error};

use todo_metrics::CONTENT_TYPE;
use todo_service::ServiceError;
use todo_state::{NewTodo, Todo, TodoId, TodoPatch, TodoRepository};

use crate::ApiState;

/// Error category attached to error responses for the interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCategory(pub &'static str);

/// Error response body.
#[derive(serde::Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

/// A failed API call.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    category: &'static str,
    message: String,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            category: "validation",
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Persistence { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            category: err.category(),
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.message, "request failed");
        } else {
            debug!(status = %self.status, error = %self.message, "request rejected");
        }

        let mut response = (
            self.status,
            Json(ErrorBody {
                success: false,
                error: self.message,
            }),
        )
            .into_response();
        response.extensions_mut().insert(ErrorCategory(self.category));
        response
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ── Todos ──────────────────────────────────────────────────────

/// GET /todos
pub async fn list_todos<R: TodoRepository>(
    State(state): State<ApiState<R>>,
) -> ApiResult<Json<Vec<Todo>>> {
    Ok(Json(state.service.list().await?))
}

/// GET /todos/{id}
pub async fn get_todo<R: TodoRepository>(
    State(state): State<ApiState<R>>,
    id: Result<Path<TodoId>, PathRejection>,
) -> ApiResult<Json<Todo>> {
    let Path(id) = id?;
    Ok(Json(state.service.get(id).await?))
}

/// POST /todos
pub async fn create_todo<R: TodoRepository>(
    State(state): State<ApiState<R>>,
    body: Result<Json<NewTodo>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Todo>)> {
    let Json(input) = body?;
    let todo = state.service.create(input).await?;
    Ok((StatusCode::CREATED, Json(todo)))
}

/// PATCH /todos/{id}
pub async fn update_todo<R: TodoRepository>(
    State(state): State<ApiState<R>>,
    id: Result<Path<TodoId>, PathRejection>,
    body: Result<Json<TodoPatch>, JsonRejection>,
) -> ApiResult<Json<Todo>> {
    let Path(id) = id?;
    let Json(patch) = body?;
    Ok(Json(state.service.update(id, patch).await?))
}

/// PATCH /todos/{id}/toggle
pub async fn toggle_todo<R: TodoRepository>(
    State(state): State<ApiState<R>>,
    id: Result<Path<TodoId>, PathRejection>,
) -> ApiResult<Json<Todo>> {
    let Path(id) = id?;
    Ok(Json(state.service.toggle_complete(id).await?))
}

/// DELETE /todos/{id}
pub async fn delete_todo<R: TodoRepository>(
    State(state): State<ApiState<R>>,
    id: Result<Path<TodoId>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = id?;
    state.service.remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics<R: TodoRepository>(
    State(state): State<ApiState<R>>,
) -> impl IntoResponse {
    let body = state.service.metrics().render();
    (StatusCode::OK, [("content-type", CONTENT_TYPE)], body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::to_bytes;
    use todo_metrics::{AppMetrics, Registry};
    use todo_service::TodoService;
    use todo_state::EmbeddedStore;

    fn test_state() -> ApiState<EmbeddedStore> {
        let metrics = Arc::new(AppMetrics::new(&Registry::new()).unwrap());
        let store = EmbeddedStore::open_in_memory().unwrap();
        ApiState {
            service: Arc::new(TodoService::new(store, metrics)),
        }
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn list_todos_empty() {
        let state = test_state();
        let resp = list_todos(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn create_and_get_todo() {
        let state = test_state();

        let resp = create_todo(State(state.clone()), Ok(Json(NewTodo::new("Buy milk"))))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created = body_json(resp).await;
        assert_eq!(created["id"], 1);
        assert_eq!(created["title"], "Buy milk");
        assert!(created["description"].is_null());
        assert_eq!(created["completed"], false);

        let resp = get_todo(State(state), Ok(Path(1))).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_with_blank_title_is_bad_request() {
        let state = test_state();
        let resp = create_todo(State(state.clone()), Ok(Json(NewTodo::new("  "))))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            resp.extensions().get::<ErrorCategory>(),
            Some(&ErrorCategory("validation"))
        );

        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "title should not be empty");
    }

    #[tokio::test]
    async fn get_nonexistent_todo() {
        let state = test_state();
        let resp = get_todo(State(state), Ok(Path(42))).await.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            resp.extensions().get::<ErrorCategory>(),
            Some(&ErrorCategory("not_found"))
        );
        assert_eq!(body_json(resp).await["error"], "Todo with ID 42 not found");
    }

    #[tokio::test]
    async fn toggle_then_delete() {
        let state = test_state();
        state.service.create(NewTodo::new("walk")).await.unwrap();

        let resp = toggle_todo(State(state.clone()), Ok(Path(1)))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["completed"], true);

        let resp = delete_todo(State(state.clone()), Ok(Path(1)))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = delete_todo(State(state), Ok(Path(1))).await.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_applies_patch() {
        let state = test_state();
        state.service.create(NewTodo::new("draft")).await.unwrap();

        let patch = TodoPatch {
            description: Some(Some("more detail".to_string())),
            ..Default::default()
        };
        let resp = update_todo(State(state), Ok(Path(1)), Ok(Json(patch)))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["title"], "draft");
        assert_eq!(body["description"], "more detail");
    }

    #[tokio::test]
    async fn prometheus_endpoint_returns_text() {
        let state = test_state();
        let resp = prometheus_metrics(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
        assert_eq!(content_type, CONTENT_TYPE);

        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("# TYPE todos_created_total counter"));
    }
}
