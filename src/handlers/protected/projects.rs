use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::server::AppState;
use crate::services::projects::{self, ProjectBoard};
use crate::services::tasks;
use crate::store::models::Task;

#[derive(Debug, Deserialize)]
pub struct TaskBody {
    #[serde(default)]
    pub title: String,
}

/// GET /app/projects/:project_id - Project board with tasks, newest first
pub async fn board(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<Uuid>,
) -> ApiResult<ProjectBoard> {
    let board = projects::board(&state.panel, &user.identity, project_id).await?;
    Ok(ApiResponse::success(board))
}

/// POST /app/projects/:project_id/tasks - Add a task (status `todo`)
pub async fn add_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<Uuid>,
    Json(body): Json<TaskBody>,
) -> ApiResult<Task> {
    let task = tasks::add(&state.panel, &user.identity, project_id, &body.title).await?;
    Ok(ApiResponse::created(task))
}
