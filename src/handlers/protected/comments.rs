use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::server::AppState;
use crate::services::comments;
use crate::store::models::{Comment, CommentWithAuthor};

#[derive(Debug, Deserialize)]
pub struct CommentBody {
    #[serde(default)]
    pub content: String,
}

/// GET /app/tasks/:task_id/comments - Thread, oldest first
pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Vec<CommentWithAuthor>> {
    let thread = comments::list(&state.panel, &user.identity, task_id).await?;
    Ok(ApiResponse::success(thread))
}

/// POST /app/tasks/:task_id/comments
pub async fn add(
    State(state): State<AppState>,
    user: AuthUser,
    Path(task_id): Path<Uuid>,
    Json(body): Json<CommentBody>,
) -> ApiResult<Comment> {
    let comment = comments::add(&state.panel, &user.identity, task_id, &body.content).await?;
    Ok(ApiResponse::created(comment))
}

/// DELETE /app/comments/:comment_id - Authors only
pub async fn delete(State(state): State<AppState>, user: AuthUser, Path(comment_id): Path<Uuid>) -> ApiResult<()> {
    comments::delete(&state.panel, &user.identity, comment_id).await?;
    Ok(ApiResponse::no_content())
}
