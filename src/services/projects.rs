use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::policy::{require_member, require_project_member};
use super::{required, Panel, ServiceError};
use crate::auth::Identity;
use crate::store::models::{NewProject, Project, Task};

/// A project with its tasks, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectBoard {
    pub project: Project,
    pub group_name: String,
    pub tasks: Vec<Task>,
}

pub async fn create(panel: &Panel, actor: &Identity, group_id: Uuid, name: &str) -> Result<Project, ServiceError> {
    let name = required(name, "project name")?;
    require_member(panel, actor, group_id).await?;
    let project = panel.store.insert_project(NewProject { group_id, name }).await?;
    tracing::info!("User {} created project {} in group {}", actor.id, project.id, group_id);
    Ok(project)
}

pub async fn board(panel: &Panel, actor: &Identity, project_id: Uuid) -> Result<ProjectBoard, ServiceError> {
    let (project, group) = require_project_member(panel, actor, project_id).await?;
    let tasks = panel.store.list_tasks(project_id).await?;
    Ok(ProjectBoard {
        project,
        group_name: group.name,
        tasks,
    })
}
