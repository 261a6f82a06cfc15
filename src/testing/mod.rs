use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::auth::Identity;
use crate::client::{ClientError, Remote};
use crate::config::{AppConfig, BackendKind};
use crate::error::ApiError;
use crate::services::groups::{GroupOverview, GroupSettings};
use crate::services::projects::ProjectBoard;
use crate::services::{account, comments, groups, projects, tasks, Panel, ServiceError};
use crate::store::models::{Comment, CommentWithAuthor, Group, GroupMembership, Project, Task};
use crate::store::{AuthBackend, MemoryBackend, RemoteSession};
use crate::types::TaskStatus;

pub const TEST_PASSWORD: &str = "secret123";

/// Service-level fixture: a panel wired to a fresh in-memory backend
pub struct TestContext {
    pub backend: Arc<MemoryBackend>,
    pub panel: Panel,
}

impl TestContext {
    pub async fn new() -> Self {
        let mut config = AppConfig::development();
        config.backend.kind = BackendKind::Memory;
        config.backend.service_role_key = Some("service-role".into());
        Self::with_config(config)
    }

    pub fn with_config(config: AppConfig) -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let panel = Panel::new(backend.clone(), backend.clone(), Arc::new(config));
        Self { backend, panel }
    }

    /// Registers and signs in a user
    pub async fn session(&self, email: &str) -> (Identity, RemoteSession) {
        self.backend
            .register_user(email, TEST_PASSWORD)
            .await
            .expect("register test user");
        let session = self
            .backend
            .sign_in_with_password(email, TEST_PASSWORD)
            .await
            .expect("sign in test user");
        (Identity::from_session(&session), session)
    }

    pub async fn user(&self, email: &str) -> Identity {
        self.session(email).await.0
    }

    pub async fn group(&self, owner: &Identity, name: &str) -> Group {
        groups::create(&self.panel, owner, name).await.expect("create test group")
    }

    pub async fn join(&self, member: &Identity, group: &Group) {
        groups::join(&self.panel, member, &group.invite_code)
            .await
            .expect("join test group");
    }

    pub async fn project(&self, actor: &Identity, group: &Group, name: &str) -> Project {
        projects::create(&self.panel, actor, group.id, name)
            .await
            .expect("create test project")
    }

    pub async fn task(&self, actor: &Identity, project: &Project, title: &str) -> Task {
        tasks::add(&self.panel, actor, project.id, title)
            .await
            .expect("create test task")
    }
}

/// `Remote` that calls the services in-process, for client-side tests
pub struct LocalRemote {
    panel: Panel,
    session: Mutex<Option<(Identity, RemoteSession)>>,
}

impl LocalRemote {
    pub fn new(ctx: &TestContext) -> Self {
        Self {
            panel: ctx.panel.clone(),
            session: Mutex::new(None),
        }
    }

    pub fn signed_in(ctx: &TestContext, identity: Identity, session: RemoteSession) -> Self {
        let remote = Self::new(ctx);
        *remote.session.lock().unwrap() = Some((identity, session));
        remote
    }

    /// Forgets the session as if the server had dropped it
    pub fn expire(&self) {
        *self.session.lock().unwrap() = None;
    }

    fn actor(&self) -> Result<Identity, ClientError> {
        self.session
            .lock()
            .unwrap()
            .as_ref()
            .map(|(identity, _)| identity.clone())
            .ok_or(ClientError::Unauthenticated)
    }
}

fn api(err: ServiceError) -> ClientError {
    let api = ApiError::from(err);
    ClientError::Api {
        status: api.status_code(),
        code: api.error_code().to_string(),
        message: api.message().to_string(),
    }
}

#[async_trait]
impl Remote for LocalRemote {
    async fn session(&self) -> Result<Option<Identity>, ClientError> {
        Ok(self.actor().ok())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, ClientError> {
        let session = account::sign_in(&self.panel, email, password).await.map_err(api)?;
        let identity = Identity::from_session(&session);
        *self.session.lock().unwrap() = Some((identity.clone(), session));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), ClientError> {
        let session = self.session.lock().unwrap().take();
        if let Some((_, session)) = session {
            account::sign_out(&self.panel, &session.access_token).await.map_err(api)?;
        }
        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<GroupMembership>, ClientError> {
        groups::list_for(&self.panel, &self.actor()?).await.map_err(api)
    }

    async fn create_group(&self, name: &str) -> Result<Group, ClientError> {
        groups::create(&self.panel, &self.actor()?, name).await.map_err(api)
    }

    async fn join_group(&self, invite_code: &str) -> Result<Group, ClientError> {
        groups::join(&self.panel, &self.actor()?, invite_code).await.map_err(api)
    }

    async fn group_overview(&self, group_id: Uuid) -> Result<GroupOverview, ClientError> {
        groups::overview(&self.panel, &self.actor()?, group_id).await.map_err(api)
    }

    async fn group_settings(&self, group_id: Uuid) -> Result<GroupSettings, ClientError> {
        groups::settings(&self.panel, &self.actor()?, group_id).await.map_err(api)
    }

    async fn delete_group(&self, group_id: Uuid, confirmation: &str) -> Result<(), ClientError> {
        groups::delete(&self.panel, &self.actor()?, group_id, confirmation)
            .await
            .map_err(api)
    }

    async fn create_project(&self, group_id: Uuid, name: &str) -> Result<Project, ClientError> {
        projects::create(&self.panel, &self.actor()?, group_id, name).await.map_err(api)
    }

    async fn project_board(&self, project_id: Uuid) -> Result<ProjectBoard, ClientError> {
        projects::board(&self.panel, &self.actor()?, project_id).await.map_err(api)
    }

    async fn add_task(&self, project_id: Uuid, title: &str) -> Result<Task, ClientError> {
        tasks::add(&self.panel, &self.actor()?, project_id, title).await.map_err(api)
    }

    async fn update_task_status(&self, task_id: Uuid, status: TaskStatus) -> Result<Task, ClientError> {
        tasks::update_status(&self.panel, &self.actor()?, task_id, status)
            .await
            .map_err(api)
    }

    async fn delete_task(&self, task_id: Uuid) -> Result<(), ClientError> {
        tasks::delete(&self.panel, &self.actor()?, task_id).await.map_err(api)
    }

    async fn list_comments(&self, task_id: Uuid) -> Result<Vec<CommentWithAuthor>, ClientError> {
        comments::list(&self.panel, &self.actor()?, task_id).await.map_err(api)
    }

    async fn add_comment(&self, task_id: Uuid, content: &str) -> Result<Comment, ClientError> {
        comments::add(&self.panel, &self.actor()?, task_id, content).await.map_err(api)
    }

    async fn delete_comment(&self, comment_id: Uuid) -> Result<(), ClientError> {
        comments::delete(&self.panel, &self.actor()?, comment_id).await.map_err(api)
    }

    async fn request_password_reset(&self) -> Result<(), ClientError> {
        let actor = self.actor()?;
        let email = actor.email.unwrap_or_default();
        account::request_password_reset(&self.panel, &email).await.map_err(api)
    }

    async fn delete_account(&self, confirmation: &str) -> Result<(), ClientError> {
        account::delete_account(&self.panel, &self.actor()?, confirmation)
            .await
            .map_err(api)?;
        self.expire();
        Ok(())
    }
}
