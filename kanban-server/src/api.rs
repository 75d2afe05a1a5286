//! REST handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kanban_proto::api::{
    CreateTaskRequest, ErrorBody, ReorderRequest, ReorderResponse, UpdateTaskRequest,
};
use kanban_proto::task::{Task, TaskId};

use crate::server::AppState;
use crate::store::StoreError;

/// A [`StoreError`] rendered as an HTTP response with an [`ErrorBody`].
#[derive(Debug)]
pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self.0 {
            StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::UnknownTask(_) => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::debug!(status = status.as_u16(), error = %self.0, "request failed");
        (status, Json(ErrorBody::new(self.0.to_string()))).into_response()
    }
}

/// `GET /tasks/{user_id}`
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Json<Vec<Task>> {
    Json(state.store.list(&user_id).await)
}

/// `POST /tasks`
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let task = state.create_task(request).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// `PUT /tasks/{id}`
pub async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.update_task(&TaskId::new(id), request).await?))
}

/// `DELETE /tasks/{id}`
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.delete_task(&TaskId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /tasks/reorder/{user_id}`
pub async fn reorder_tasks(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(request): Json<ReorderRequest>,
) -> Result<Json<ReorderResponse>, ApiError> {
    state.reorder_tasks(&user_id, request.tasks).await?;
    Ok(Json(ReorderResponse { success: true }))
}
