use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::server::AppState;
use crate::services::tasks;
use crate::store::models::Task;
use crate::types::TaskStatus;

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: TaskStatus,
}

/// PATCH /app/tasks/:task_id - Move a task to another status
pub async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(task_id): Path<Uuid>,
    Json(body): Json<StatusBody>,
) -> ApiResult<Task> {
    let task = tasks::update_status(&state.panel, &user.identity, task_id, body.status).await?;
    Ok(ApiResponse::success(task))
}

/// DELETE /app/tasks/:task_id
pub async fn delete(State(state): State<AppState>, user: AuthUser, Path(task_id): Path<Uuid>) -> ApiResult<()> {
    tasks::delete(&state.panel, &user.identity, task_id).await?;
    Ok(ApiResponse::no_content())
}
