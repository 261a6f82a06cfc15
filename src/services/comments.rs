use uuid::Uuid;

use super::policy::{is_author, require_task_member};
use super::{required, Panel, ServiceError};
use crate::auth::Identity;
use crate::store::models::{Comment, CommentWithAuthor, NewComment};

/// Comments on a task, oldest first, with their authors' names
pub async fn list(panel: &Panel, actor: &Identity, task_id: Uuid) -> Result<Vec<CommentWithAuthor>, ServiceError> {
    require_task_member(panel, actor, task_id).await?;
    Ok(panel.store.list_comments(task_id).await?)
}

pub async fn add(panel: &Panel, actor: &Identity, task_id: Uuid, content: &str) -> Result<Comment, ServiceError> {
    let content = required(content, "comment")?;
    require_task_member(panel, actor, task_id).await?;
    let comment = panel
        .store
        .insert_comment(NewComment {
            task_id,
            user_id: actor.id,
            content,
        })
        .await?;
    Ok(comment)
}

/// Authors may delete their own comments; nobody else may
pub async fn delete(panel: &Panel, actor: &Identity, comment_id: Uuid) -> Result<(), ServiceError> {
    let comment = panel
        .store
        .find_comment(comment_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("comment not found".into()))?;
    if !is_author(actor, &comment) {
        return Err(ServiceError::Forbidden("only the author can delete this comment".into()));
    }
    if panel.store.delete_comment(comment_id).await? == 0 {
        return Err(ServiceError::NotFound("comment not found".into()));
    }
    Ok(())
}
