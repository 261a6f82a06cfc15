use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::Identity;
use crate::config::ConfigError;
use crate::services::groups::{GroupOverview, GroupSettings};
use crate::services::projects::ProjectBoard;
use crate::store::models::{Comment, CommentWithAuthor, Group, GroupMembership, Project, Task};
use crate::types::TaskStatus;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("{message}")]
    Api { status: u16, code: String, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ClientError {
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, ClientError::Unauthenticated)
            || matches!(self, ClientError::Api { status: 401, .. })
    }
}

/// Everything a page can ask of the panel service
#[async_trait]
pub trait Remote: Send + Sync {
    /// The caller's identity, `None` when the service has no session for it
    async fn session(&self) -> Result<Option<Identity>, ClientError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, ClientError>;
    async fn sign_out(&self) -> Result<(), ClientError>;

    async fn list_groups(&self) -> Result<Vec<GroupMembership>, ClientError>;
    async fn create_group(&self, name: &str) -> Result<Group, ClientError>;
    async fn join_group(&self, invite_code: &str) -> Result<Group, ClientError>;
    async fn group_overview(&self, group_id: Uuid) -> Result<GroupOverview, ClientError>;
    async fn group_settings(&self, group_id: Uuid) -> Result<GroupSettings, ClientError>;
    async fn delete_group(&self, group_id: Uuid, confirmation: &str) -> Result<(), ClientError>;

    async fn create_project(&self, group_id: Uuid, name: &str) -> Result<Project, ClientError>;
    async fn project_board(&self, project_id: Uuid) -> Result<ProjectBoard, ClientError>;
    async fn add_task(&self, project_id: Uuid, title: &str) -> Result<Task, ClientError>;
    async fn update_task_status(&self, task_id: Uuid, status: TaskStatus) -> Result<Task, ClientError>;
    async fn delete_task(&self, task_id: Uuid) -> Result<(), ClientError>;

    async fn list_comments(&self, task_id: Uuid) -> Result<Vec<CommentWithAuthor>, ClientError>;
    async fn add_comment(&self, task_id: Uuid, content: &str) -> Result<Comment, ClientError>;
    async fn delete_comment(&self, comment_id: Uuid) -> Result<(), ClientError>;

    async fn request_password_reset(&self) -> Result<(), ClientError>;
    async fn delete_account(&self, confirmation: &str) -> Result<(), ClientError>;
}
