//! Authorization predicates for groups and everything under them.

use uuid::Uuid;

use super::{Panel, ServiceError};
use crate::auth::Identity;
use crate::store::models::{Comment, Group, Membership, Project, Task};

pub fn is_owner(actor: &Identity, group: &Group) -> bool {
    group.owner_id == actor.id
}

pub fn is_author(actor: &Identity, comment: &Comment) -> bool {
    comment.user_id == actor.id
}

/// The group and the actor's membership in it
pub async fn require_member(panel: &Panel, actor: &Identity, group_id: Uuid) -> Result<(Group, Membership), ServiceError> {
    let group = panel
        .store
        .find_group(group_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("group not found".into()))?;
    match panel.store.find_membership(group_id, actor.id).await? {
        Some(membership) => Ok((group, membership)),
        None => Err(ServiceError::Forbidden("you are not a member of this group".into())),
    }
}

pub async fn require_owner(panel: &Panel, actor: &Identity, group_id: Uuid) -> Result<Group, ServiceError> {
    let group = panel
        .store
        .find_group(group_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("group not found".into()))?;
    if !is_owner(actor, &group) {
        return Err(ServiceError::Forbidden("only the group owner can manage this group".into()));
    }
    Ok(group)
}

/// A project whose group the actor belongs to
pub async fn require_project_member(panel: &Panel, actor: &Identity, project_id: Uuid) -> Result<(Project, Group), ServiceError> {
    let project = panel
        .store
        .find_project(project_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("project not found".into()))?;
    let (group, _) = require_member(panel, actor, project.group_id).await?;
    Ok((project, group))
}

/// A task whose project's group the actor belongs to
pub async fn require_task_member(panel: &Panel, actor: &Identity, task_id: Uuid) -> Result<Task, ServiceError> {
    let task = panel
        .store
        .find_task(task_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("task not found".into()))?;
    require_project_member(panel, actor, task.project_id).await?;
    Ok(task)
}
