use uuid::Uuid;

use super::{Screen, ViewCore};
use crate::client::optimistic::{begin, settle, Confirm, Pending, RemovedItem, Settled, StatusUndo};
use crate::client::remote::{ClientError, Remote};
use crate::client::session::SessionCache;
use crate::services::projects::ProjectBoard;
use crate::store::models::Task;
use crate::types::TaskStatus;

/// One project's task board
pub struct TaskBoard {
    project_id: Uuid,
    core: ViewCore<ProjectBoard>,
}

impl TaskBoard {
    pub fn new(session: &SessionCache, project_id: Uuid) -> Self {
        Self {
            project_id,
            core: ViewCore::new(session),
        }
    }

    pub fn screen(&self) -> Screen<ProjectBoard> {
        self.core.snapshot()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.core
            .with(|screen| screen.data.as_ref().map(|board| board.tasks.clone()))
            .unwrap_or_default()
    }

    /// Drops the board; results of calls still in flight are ignored
    pub fn teardown(&self) {
        self.core.liveness().teardown();
    }

    pub async fn load(&self, remote: &dyn Remote) {
        if self.core.admit().is_none() {
            return;
        }
        let ticket = self.core.ticket();
        match remote.project_board(self.project_id).await {
            Ok(board) => {
                self.core.store(ticket, board);
            }
            Err(err) => self.core.fail(&err),
        }
    }

    pub async fn add_task(&self, remote: &dyn Remote, title: &str) -> Option<Task> {
        let title = title.trim();
        if title.is_empty() {
            self.core.reject("task title is required");
            return None;
        }
        self.core.admit()?;
        match remote.add_task(self.project_id, title).await {
            Ok(task) => {
                if self.core.liveness().is_alive() {
                    self.core.with(|screen| {
                        if let Some(board) = screen.data.as_mut() {
                            board.tasks.insert(0, task.clone());
                        }
                    });
                }
                Some(task)
            }
            Err(err) => {
                self.core.fail(&err);
                None
            }
        }
    }

    /// Shows `status` on the task immediately
    pub fn begin_status(&self, task_id: Uuid, status: TaskStatus) -> Option<Pending<StatusUndo>> {
        let liveness = self.core.liveness().clone();
        self.core.with(|screen| {
            let board = screen.data.as_mut()?;
            begin(&mut board.tasks, &liveness, |tasks| StatusUndo::apply(tasks, task_id, status))
        })
    }

    pub fn settle_status(
        &self,
        pending: Pending<StatusUndo>,
        outcome: Result<Task, ClientError>,
    ) -> Settled<Task> {
        if let Err(err) = &outcome {
            if err.is_unauthenticated() {
                self.core.fail(err);
            }
        }
        let settled = self.core.with(|screen| match screen.data.as_mut() {
            Some(board) => settle(&mut board.tasks, pending, outcome),
            None => Settled::Discarded,
        });
        if let Settled::Reverted(message) = &settled {
            self.core.reject(message);
        }
        settled
    }

    /// Moves a task to `status` optimistically; a refused update is undone
    /// and its message shown.
    pub async fn update_status(&self, remote: &dyn Remote, task_id: Uuid, status: TaskStatus) -> Settled<Task> {
        if self.core.admit().is_none() {
            return Settled::Discarded;
        }
        let Some(pending) = self.begin_status(task_id, status) else {
            return Settled::Discarded;
        };
        let outcome = remote.update_task_status(task_id, status).await;
        self.settle_status(pending, outcome)
    }

    /// Deletes a task after the user confirms. `None` when they declined.
    pub async fn delete_task(
        &self,
        remote: &dyn Remote,
        confirm: &mut dyn Confirm,
        task_id: Uuid,
    ) -> Option<Settled<()>> {
        self.core.admit()?;
        let title = self.core.with(|screen| {
            screen
                .data
                .as_ref()
                .and_then(|board| board.tasks.iter().find(|task| task.id == task_id))
                .map(|task| task.title.clone())
        })?;
        if !confirm.confirm(&format!("Delete task \"{}\"?", title)) {
            return None;
        }

        let liveness = self.core.liveness().clone();
        let pending = self.core.with(|screen| {
            let board = screen.data.as_mut()?;
            begin(&mut board.tasks, &liveness, |tasks| {
                RemovedItem::take(tasks, |task| task.id == task_id)
            })
        })?;

        let outcome = remote.delete_task(task_id).await;
        if let Err(err) = &outcome {
            if err.is_unauthenticated() {
                self.core.fail(err);
            }
        }
        let settled = self.core.with(|screen| match screen.data.as_mut() {
            Some(board) => settle(&mut board.tasks, pending, outcome),
            None => Settled::Discarded,
        });
        if let Settled::Reverted(message) = &settled {
            self.core.reject(message);
        }
        Some(settled)
    }
}
