use uuid::Uuid;

use super::policy::{require_project_member, require_task_member};
use super::{required, Panel, ServiceError};
use crate::auth::Identity;
use crate::store::models::{NewTask, Task};
use crate::types::TaskStatus;

/// New tasks start as `todo`
pub async fn add(panel: &Panel, actor: &Identity, project_id: Uuid, title: &str) -> Result<Task, ServiceError> {
    let title = required(title, "task title")?;
    require_project_member(panel, actor, project_id).await?;
    let task = panel
        .store
        .insert_task(NewTask {
            project_id,
            title,
            created_by: actor.id,
        })
        .await?;
    Ok(task)
}

pub async fn update_status(panel: &Panel, actor: &Identity, task_id: Uuid, status: TaskStatus) -> Result<Task, ServiceError> {
    require_task_member(panel, actor, task_id).await?;
    panel
        .store
        .update_task_status(task_id, status)
        .await?
        .ok_or_else(|| ServiceError::NotFound("task not found".into()))
}

pub async fn delete(panel: &Panel, actor: &Identity, task_id: Uuid) -> Result<(), ServiceError> {
    require_task_member(panel, actor, task_id).await?;
    if panel.store.delete_task(task_id).await? == 0 {
        return Err(ServiceError::NotFound("task not found".into()));
    }
    tracing::info!("User {} deleted task {}", actor.id, task_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestContext;

    #[tokio::test]
    async fn task_lifecycle() {
        let ctx = TestContext::new().await;
        let owner = ctx.user("owner@example.com").await;
        let group = ctx.group(&owner, "Design").await;
        let project = ctx.project(&owner, &group, "Website").await;

        let task = add(&ctx.panel, &owner, project.id, "Hero image").await.unwrap();
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.created_by, owner.id);

        let moved = update_status(&ctx.panel, &owner, task.id, TaskStatus::InProgress).await.unwrap();
        assert_eq!(moved.status, TaskStatus::InProgress);

        delete(&ctx.panel, &owner, task.id).await.unwrap();
        assert!(matches!(
            delete(&ctx.panel, &owner, task.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn blank_title_and_outsiders_are_rejected() {
        let ctx = TestContext::new().await;
        let owner = ctx.user("owner@example.com").await;
        let outsider = ctx.user("outsider@example.com").await;
        let group = ctx.group(&owner, "Design").await;
        let project = ctx.project(&owner, &group, "Website").await;
        let task = ctx.task(&owner, &project, "Hero image").await;

        assert!(matches!(add(&ctx.panel, &owner, project.id, "  ").await, Err(ServiceError::Validation(_))));
        assert!(matches!(
            update_status(&ctx.panel, &outsider, task.id, TaskStatus::Done).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(delete(&ctx.panel, &outsider, task.id).await, Err(ServiceError::Forbidden(_))));
    }
}
