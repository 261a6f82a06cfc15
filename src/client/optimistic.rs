//! Optimistic mutations: apply locally, send, then keep or undo.
//!
//! ```text
//! begin(state, liveness, apply)  -> Pending<undo>     state shows the change
//! remote call                                         (suspension point)
//! settle(state, pending, result) -> Confirmed | Reverted | Discarded
//! ```
//!
//! A view that was torn down while the call was in flight gets `Discarded`
//! and its state is left alone.

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::store::models::Task;
use crate::types::TaskStatus;

/// Liveness flag of one view; clones share the flag
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn teardown(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// Undo record for one optimistic change to `S`
pub trait Revert<S> {
    /// Undoes the change. Returns false when `state` no longer holds the
    /// optimistic value and was left untouched.
    fn revert(self, state: &mut S) -> bool;
}

/// An applied optimistic change waiting for the remote result
#[derive(Debug)]
pub struct Pending<U> {
    undo: U,
    liveness: Liveness,
}

impl<U> Pending<U> {
    pub fn undo(&self) -> &U {
        &self.undo
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled<T> {
    /// The remote accepted the change; local state is authoritative
    Confirmed(T),
    /// The remote refused; the local change was undone
    Reverted(String),
    /// The owning view is gone
    Discarded,
}

impl<T> Settled<T> {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Settled::Confirmed(_))
    }
}

/// Applies a change to `state` right away. `apply` returns the undo record,
/// or `None` when there was nothing to change.
pub fn begin<S, U, F>(state: &mut S, liveness: &Liveness, apply: F) -> Option<Pending<U>>
where
    F: FnOnce(&mut S) -> Option<U>,
{
    let undo = apply(state)?;
    Some(Pending {
        undo,
        liveness: liveness.clone(),
    })
}

pub fn settle<S, U, T, E>(state: &mut S, pending: Pending<U>, outcome: Result<T, E>) -> Settled<T>
where
    U: Revert<S>,
    E: Display,
{
    if !pending.liveness.is_alive() {
        return Settled::Discarded;
    }
    match outcome {
        Ok(value) => Settled::Confirmed(value),
        Err(err) => {
            if !pending.undo.revert(state) {
                tracing::debug!("Optimistic change was superseded, nothing to revert");
            }
            Settled::Reverted(err.to_string())
        }
    }
}

/// Task status change on a board's task list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUndo {
    pub task_id: Uuid,
    pub previous: TaskStatus,
    pub optimistic: TaskStatus,
}

impl StatusUndo {
    /// Sets the task's status and remembers the old one
    pub fn apply(tasks: &mut [Task], task_id: Uuid, status: TaskStatus) -> Option<Self> {
        let task = tasks.iter_mut().find(|task| task.id == task_id)?;
        let previous = task.status;
        task.status = status;
        Some(Self {
            task_id,
            previous,
            optimistic: status,
        })
    }
}

impl Revert<Vec<Task>> for StatusUndo {
    fn revert(self, tasks: &mut Vec<Task>) -> bool {
        match tasks.iter_mut().find(|task| task.id == self.task_id) {
            // A later change owns the field now
            Some(task) if task.status == self.optimistic => {
                task.status = self.previous;
                true
            }
            _ => false,
        }
    }
}

/// An item removed from a list, with the position it came from
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedItem<T> {
    pub index: usize,
    pub item: T,
}

impl<T> RemovedItem<T> {
    pub fn take<P>(items: &mut Vec<T>, predicate: P) -> Option<Self>
    where
        P: FnMut(&T) -> bool,
    {
        let index = items.iter().position(predicate)?;
        let item = items.remove(index);
        Some(Self { index, item })
    }
}

impl<T> Revert<Vec<T>> for RemovedItem<T> {
    fn revert(self, items: &mut Vec<T>) -> bool {
        let index = self.index.min(items.len());
        items.insert(index, self.item);
        true
    }
}

/// Asks the user before a destructive action
pub trait Confirm: Send {
    fn confirm(&mut self, prompt: &str) -> bool;

    /// The user has to type `expected` exactly
    fn confirm_typed(&mut self, prompt: &str, expected: &str) -> bool;
}
