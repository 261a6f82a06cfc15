use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::server::AppState;
use crate::services::groups::{self, GroupOverview, GroupSettings};
use crate::services::projects;
use crate::store::models::{Group, Project};

#[derive(Debug, Deserialize)]
pub struct NameBody {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinBody {
    #[serde(default)]
    pub invite_code: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmBody {
    #[serde(default)]
    pub confirmation: String,
}

/// POST /app/groups - Create a group; the creator becomes its admin
pub async fn create(State(state): State<AppState>, user: AuthUser, Json(body): Json<NameBody>) -> ApiResult<Group> {
    let group = groups::create(&state.panel, &user.identity, &body.name).await?;
    Ok(ApiResponse::created(group))
}

/// POST /app/groups/join - Join a group by invite code
pub async fn join(State(state): State<AppState>, user: AuthUser, Json(body): Json<JoinBody>) -> ApiResult<Group> {
    let group = groups::join(&state.panel, &user.identity, &body.invite_code).await?;
    Ok(ApiResponse::success(group))
}

/// GET /app/groups/:group_id - Group, members and projects (members only)
pub async fn show(
    State(state): State<AppState>,
    user: AuthUser,
    Path(group_id): Path<Uuid>,
) -> ApiResult<GroupOverview> {
    let overview = groups::overview(&state.panel, &user.identity, group_id).await?;
    Ok(ApiResponse::success(overview))
}

/// GET /app/groups/:group_id/settings - Owner-only settings page data
pub async fn settings(
    State(state): State<AppState>,
    user: AuthUser,
    Path(group_id): Path<Uuid>,
) -> ApiResult<GroupSettings> {
    let settings = groups::settings(&state.panel, &user.identity, group_id).await?;
    Ok(ApiResponse::success(settings))
}

/// DELETE /app/groups/:group_id - Delete a group (owner only)
///
/// The body must repeat the group name: `{"confirmation": "Design"}`.
pub async fn delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(group_id): Path<Uuid>,
    Json(body): Json<ConfirmBody>,
) -> ApiResult<()> {
    groups::delete(&state.panel, &user.identity, group_id, &body.confirmation).await?;
    Ok(ApiResponse::no_content())
}

/// POST /app/groups/:group_id/projects - Add a project to a group
pub async fn create_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(group_id): Path<Uuid>,
    Json(body): Json<NameBody>,
) -> ApiResult<Project> {
    let project = projects::create(&state.panel, &user.identity, group_id, &body.name).await?;
    Ok(ApiResponse::created(project))
}
