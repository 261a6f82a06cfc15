//! Seam to the hosted backend: its auth service and its tables.
//!
//! Everything the panel persists lives behind [`AuthBackend`] and
//! [`DataStore`]. The hosted implementations are [`GoTrueAuth`] (HTTP) and
//! [`PgStore`] (Postgres); [`MemoryBackend`] implements both in-process.

pub mod gotrue;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod retry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::types::TaskStatus;
use models::*;

pub use gotrue::GoTrueAuth;
pub use memory::MemoryBackend;
pub use postgres::PgStore;
pub use retry::RetryPolicy;

/// Errors from the remote data store
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend did not answer within {0:?}")]
    Timeout(Duration),

    /// The backend refused the request (bad credentials, invalid token, ...)
    #[error("{0}")]
    Rejected(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Remote(String),

    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),
}

impl StoreError {
    /// Failures worth retrying for idempotent reads
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

/// A user record as the auth service reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteUser {
    pub id: Uuid,
    pub email: Option<String>,
}

/// Token pair issued by the auth service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSession {
    pub access_token: String,
    pub refresh_token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub user: RemoteUser,
}

#[derive(Debug, Clone)]
pub struct SignUp {
    pub email: String,
    pub password: String,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub email_redirect_to: Option<String>,
}

/// Sign-up either signs the user straight in or waits for email confirmation
#[derive(Debug, Clone, PartialEq)]
pub enum SignUpOutcome {
    SignedIn(RemoteSession),
    ConfirmationSent(RemoteUser),
}

/// Authentication half of the hosted backend
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<RemoteSession, StoreError>;

    async fn sign_up(&self, request: SignUp) -> Result<SignUpOutcome, StoreError>;

    /// Validates an access token. `Ok(None)` means the token was rejected.
    async fn get_user(&self, access_token: &str) -> Result<Option<RemoteUser>, StoreError>;

    /// Rotates a refresh token. `Ok(None)` means the token was rejected.
    async fn refresh_session(&self, refresh_token: &str) -> Result<Option<RemoteSession>, StoreError>;

    async fn exchange_code_for_session(&self, code: &str) -> Result<RemoteSession, StoreError>;

    async fn reset_password_email(&self, email: &str, redirect_to: &str) -> Result<(), StoreError>;

    async fn update_password(&self, access_token: &str, new_password: &str) -> Result<(), StoreError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), StoreError>;

    /// Requires the elevated service key; server-side only.
    async fn admin_delete_user(&self, user_id: Uuid) -> Result<(), StoreError>;
}

/// Table access for groups, group_members, projects, tasks, comments and profiles
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn insert_group(&self, group: NewGroup) -> Result<Group, StoreError>;
    async fn find_group(&self, id: Uuid) -> Result<Option<Group>, StoreError>;
    async fn find_group_by_invite_code(&self, code: &str) -> Result<Option<Group>, StoreError>;
    /// Deletes the group only if `owner_id` owns it; returns rows deleted.
    async fn delete_group(&self, id: Uuid, owner_id: Uuid) -> Result<u64, StoreError>;

    async fn upsert_membership(&self, membership: NewMembership) -> Result<Membership, StoreError>;
    /// Plain insert; a duplicate (group, user) pair is a `Conflict`.
    async fn insert_membership(&self, membership: NewMembership) -> Result<Membership, StoreError>;
    async fn find_membership(&self, group_id: Uuid, user_id: Uuid) -> Result<Option<Membership>, StoreError>;
    async fn list_user_groups(&self, user_id: Uuid) -> Result<Vec<GroupMembership>, StoreError>;
    async fn list_group_members(&self, group_id: Uuid) -> Result<Vec<MemberProfile>, StoreError>;

    async fn insert_project(&self, project: NewProject) -> Result<Project, StoreError>;
    async fn find_project(&self, id: Uuid) -> Result<Option<Project>, StoreError>;
    async fn list_projects(&self, group_id: Uuid) -> Result<Vec<Project>, StoreError>;

    async fn insert_task(&self, task: NewTask) -> Result<Task, StoreError>;
    async fn find_task(&self, id: Uuid) -> Result<Option<Task>, StoreError>;
    async fn list_tasks(&self, project_id: Uuid) -> Result<Vec<Task>, StoreError>;
    async fn update_task_status(&self, id: Uuid, status: TaskStatus) -> Result<Option<Task>, StoreError>;
    async fn delete_task(&self, id: Uuid) -> Result<u64, StoreError>;

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, StoreError>;
    async fn find_comment(&self, id: Uuid) -> Result<Option<Comment>, StoreError>;
    async fn list_comments(&self, task_id: Uuid) -> Result<Vec<CommentWithAuthor>, StoreError>;
    async fn delete_comment(&self, id: Uuid) -> Result<u64, StoreError>;

    async fn upsert_profile(&self, profile: Profile) -> Result<(), StoreError>;
}
