use uuid::Uuid;

use super::{Screen, ViewCore};
use crate::client::optimistic::{begin, settle, Confirm, RemovedItem, Settled};
use crate::client::remote::Remote;
use crate::client::session::SessionCache;
use crate::store::models::CommentWithAuthor;

/// Comments under one task, oldest first
pub struct CommentThread {
    task_id: Uuid,
    core: ViewCore<Vec<CommentWithAuthor>>,
}

impl CommentThread {
    pub fn new(session: &SessionCache, task_id: Uuid) -> Self {
        Self {
            task_id,
            core: ViewCore::new(session),
        }
    }

    pub fn screen(&self) -> Screen<Vec<CommentWithAuthor>> {
        self.core.snapshot()
    }

    pub async fn load(&self, remote: &dyn Remote) {
        if self.core.admit().is_none() {
            return;
        }
        let ticket = self.core.ticket();
        match remote.list_comments(self.task_id).await {
            Ok(comments) => {
                self.core.store(ticket, comments);
            }
            Err(err) => self.core.fail(&err),
        }
    }

    /// Posts a comment and reloads the thread so it shows with its author
    pub async fn add(&self, remote: &dyn Remote, content: &str) -> bool {
        let content = content.trim();
        if content.is_empty() {
            self.core.reject("comment cannot be empty");
            return false;
        }
        if self.core.admit().is_none() {
            return false;
        }
        match remote.add_comment(self.task_id, content).await {
            Ok(_) => {
                self.load(remote).await;
                true
            }
            Err(err) => {
                self.core.fail(&err);
                false
            }
        }
    }

    pub async fn delete(
        &self,
        remote: &dyn Remote,
        confirm: &mut dyn Confirm,
        comment_id: Uuid,
    ) -> Option<Settled<()>> {
        let actor = self.core.admit()?;
        let own = self.core.with(|screen| {
            screen
                .data
                .as_ref()
                .and_then(|comments| comments.iter().find(|c| c.comment.id == comment_id))
                .map(|c| c.comment.user_id == actor.id)
        })?;
        if !own {
            self.core.reject("only the author can delete this comment");
            return None;
        }
        if !confirm.confirm("Delete this comment?") {
            return None;
        }

        let liveness = self.core.liveness().clone();
        let pending = self.core.with(|screen| {
            let comments = screen.data.as_mut()?;
            begin(comments, &liveness, |comments| {
                RemovedItem::take(comments, |c| c.comment.id == comment_id)
            })
        })?;

        let outcome = remote.delete_comment(comment_id).await;
        if let Err(err) = &outcome {
            if err.is_unauthenticated() {
                self.core.fail(err);
            }
        }
        let settled = self.core.with(|screen| match screen.data.as_mut() {
            Some(comments) => settle(comments, pending, outcome),
            None => Settled::Discarded,
        });
        if let Settled::Reverted(message) = &settled {
            self.core.reject(message);
        }
        Some(settled)
    }
}
