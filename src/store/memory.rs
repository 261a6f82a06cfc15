//! In-process backend implementing both halves of the remote store.
//!
//! Behaves like the hosted service where callers can observe it: signed JWT
//! access tokens, refresh-token rotation with a reuse interval, unique
//! membership rows, cascading deletes. Tests inject failures per operation
//! with [`MemoryBackend::fail_next`] or take the whole backend offline.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::*;
use super::{AuthBackend, DataStore, RemoteSession, RemoteUser, SignUp, SignUpOutcome, StoreError};
use crate::auth::claims::{decode_access_token, encode_access_token, AccessClaims};
use crate::types::TaskStatus;

const DEFAULT_ACCESS_TTL_SECS: i64 = 3600;
const DEFAULT_REUSE_INTERVAL_SECS: i64 = 10;

#[derive(Debug, Clone)]
struct UserRecord {
    id: Uuid,
    email: String,
    password: String,
}

impl UserRecord {
    fn remote(&self) -> RemoteUser {
        RemoteUser {
            id: self.id,
            email: Some(self.email.clone()),
        }
    }
}

#[derive(Debug, Clone)]
struct RefreshRecord {
    session_id: Uuid,
    user_id: Uuid,
    /// Set once the token has been exchanged
    successor: Option<(DateTime<Utc>, RemoteSession)>,
}

#[derive(Default)]
struct State {
    users: HashMap<Uuid, UserRecord>,
    revoked_sessions: Vec<Uuid>,
    refresh_tokens: HashMap<String, RefreshRecord>,
    auth_codes: HashMap<String, Uuid>,
    outbox: Vec<(String, String)>,
    last_timestamp: Option<DateTime<Utc>>,

    groups: Vec<Group>,
    memberships: Vec<Membership>,
    projects: Vec<Project>,
    tasks: Vec<Task>,
    comments: Vec<Comment>,
    profiles: HashMap<Uuid, Profile>,
}

impl State {
    /// Strictly increasing timestamps keep ordering stable within one instant
    fn tick(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_timestamp {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_timestamp = Some(now);
        now
    }

    fn user_by_email(&self, email: &str) -> Option<&UserRecord> {
        self.users.values().find(|u| u.email.eq_ignore_ascii_case(email))
    }

    fn remove_group_cascade(&mut self, group_id: Uuid) {
        self.groups.retain(|g| g.id != group_id);
        self.memberships.retain(|m| m.group_id != group_id);
        let project_ids: Vec<Uuid> = self
            .projects
            .iter()
            .filter(|p| p.group_id == group_id)
            .map(|p| p.id)
            .collect();
        self.projects.retain(|p| p.group_id != group_id);
        for project_id in project_ids {
            self.remove_project_tasks(project_id);
        }
    }

    fn remove_project_tasks(&mut self, project_id: Uuid) {
        let task_ids: Vec<Uuid> = self
            .tasks
            .iter()
            .filter(|t| t.project_id == project_id)
            .map(|t| t.id)
            .collect();
        self.tasks.retain(|t| t.project_id != project_id);
        self.comments.retain(|c| !task_ids.contains(&c.task_id));
    }

    fn profile_names(&self, user_id: Uuid) -> (Option<String>, Option<String>) {
        self.profiles
            .get(&user_id)
            .map(|p| (p.username.clone(), p.full_name.clone()))
            .unwrap_or((None, None))
    }
}

pub struct MemoryBackend {
    secret: String,
    access_ttl: Duration,
    reuse_interval: Duration,
    offline: AtomicBool,
    failures: Mutex<HashMap<&'static str, VecDeque<StoreError>>>,
    state: RwLock<State>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_access_ttl(Duration::seconds(DEFAULT_ACCESS_TTL_SECS))
    }

    pub fn with_access_ttl(access_ttl: Duration) -> Self {
        Self {
            secret: Uuid::new_v4().simple().to_string(),
            access_ttl,
            reuse_interval: Duration::seconds(DEFAULT_REUSE_INTERVAL_SECS),
            offline: AtomicBool::new(false),
            failures: Mutex::new(HashMap::new()),
            state: RwLock::new(State::default()),
        }
    }

    /// Secret the access tokens are signed with
    pub fn jwt_secret(&self) -> &str {
        &self.secret
    }

    /// Simulates a network partition: every call fails as unavailable
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes the next call of `operation` (a trait method name) fail with `error`
    pub fn fail_next(&self, operation: &'static str, error: StoreError) {
        let mut failures = match self.failures.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        failures.entry(operation).or_default().push_back(error);
    }

    /// Creates a confirmed user directly
    pub async fn register_user(&self, email: &str, password: &str) -> Result<RemoteUser, StoreError> {
        let mut state = self.state.write().await;
        if state.user_by_email(email).is_some() {
            return Err(StoreError::Rejected("User already registered".into()));
        }
        let record = UserRecord {
            id: Uuid::new_v4(),
            email: email.trim().to_lowercase(),
            password: password.to_string(),
        };
        let user = record.remote();
        state.users.insert(record.id, record);
        Ok(user)
    }

    /// One-time code for the auth callback, as an emailed link would carry
    pub async fn issue_auth_code(&self, user_id: Uuid) -> String {
        let code = Uuid::new_v4().simple().to_string();
        self.state.write().await.auth_codes.insert(code.clone(), user_id);
        code
    }

    /// Password-reset emails sent so far, as (email, link) pairs
    pub async fn outbox(&self) -> Vec<(String, String)> {
        self.state.read().await.outbox.clone()
    }

    pub async fn membership_count(&self, group_id: Uuid, user_id: Uuid) -> usize {
        let state = self.state.read().await;
        state
            .memberships
            .iter()
            .filter(|m| m.group_id == group_id && m.user_id == user_id)
            .count()
    }

    pub async fn group_count(&self) -> usize {
        self.state.read().await.groups.len()
    }

    fn check(&self, operation: &'static str) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        let mut failures = match self.failures.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match failures.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn issue_session(&self, state: &mut State, user: &UserRecord, session_id: Uuid) -> Result<RemoteSession, StoreError> {
        let claims = AccessClaims::new(user.id, Some(user.email.clone()), session_id, self.access_ttl);
        let access_token =
            encode_access_token(&claims, &self.secret).map_err(|e| StoreError::Remote(e.to_string()))?;
        let refresh_token = Uuid::new_v4().simple().to_string();
        state.refresh_tokens.insert(
            refresh_token.clone(),
            RefreshRecord {
                session_id,
                user_id: user.id,
                successor: None,
            },
        );
        Ok(RemoteSession {
            access_token,
            refresh_token,
            issued_at: claims.issued_at(),
            expires_at: claims.expires_at(),
            user: user.remote(),
        })
    }

    /// Claims of a live access token belonging to an existing user
    fn live_claims(&self, state: &State, access_token: &str) -> Option<AccessClaims> {
        let claims = decode_access_token(access_token, Some(&self.secret)).ok()?;
        if claims.expires_within(Duration::zero(), Utc::now()) {
            return None;
        }
        if let Some(session_id) = claims.session_id {
            if state.revoked_sessions.contains(&session_id) {
                return None;
            }
        }
        state.users.contains_key(&claims.sub).then_some(claims)
    }
}

#[async_trait]
impl AuthBackend for MemoryBackend {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<RemoteSession, StoreError> {
        self.check("sign_in_with_password")?;
        let mut state = self.state.write().await;
        let user = match state.user_by_email(email.trim()) {
            Some(user) if user.password == password => user.clone(),
            _ => return Err(StoreError::Rejected("Invalid login credentials".into())),
        };
        self.issue_session(&mut state, &user, Uuid::new_v4())
    }

    async fn sign_up(&self, request: SignUp) -> Result<SignUpOutcome, StoreError> {
        self.check("sign_up")?;
        if request.password.is_empty() {
            return Err(StoreError::Rejected("Signup requires a valid password".into()));
        }
        if request.password.chars().count() < 6 {
            return Err(StoreError::Rejected("Password should be at least 6 characters".into()));
        }
        let user = self.register_user(&request.email, &request.password).await?;
        let mut state = self.state.write().await;
        state.profiles.insert(
            user.id,
            Profile {
                id: user.id,
                email: user.email.clone(),
                username: request.username,
                full_name: request.full_name,
            },
        );
        let record = state
            .users
            .get(&user.id)
            .cloned()
            .ok_or_else(|| StoreError::Remote("user vanished during sign-up".into()))?;
        let session = self.issue_session(&mut state, &record, Uuid::new_v4())?;
        Ok(SignUpOutcome::SignedIn(session))
    }

    async fn get_user(&self, access_token: &str) -> Result<Option<RemoteUser>, StoreError> {
        self.check("get_user")?;
        let state = self.state.read().await;
        Ok(self
            .live_claims(&state, access_token)
            .and_then(|claims| state.users.get(&claims.sub))
            .map(UserRecord::remote))
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Option<RemoteSession>, StoreError> {
        self.check("refresh_session")?;
        let mut state = self.state.write().await;
        let Some(record) = state.refresh_tokens.get(refresh_token).cloned() else {
            return Ok(None);
        };
        if state.revoked_sessions.contains(&record.session_id) {
            return Ok(None);
        }
        let Some(user) = state.users.get(&record.user_id).cloned() else {
            return Ok(None);
        };

        if let Some((rotated_at, successor)) = record.successor {
            if Utc::now() - rotated_at <= self.reuse_interval {
                return Ok(Some(successor));
            }
            // Replay outside the reuse interval: treat the session as stolen
            tracing::warn!("Refresh token reuse detected for session {}", record.session_id);
            state.revoked_sessions.push(record.session_id);
            return Ok(None);
        }

        let session = self.issue_session(&mut state, &user, record.session_id)?;
        let now = state.tick();
        if let Some(entry) = state.refresh_tokens.get_mut(refresh_token) {
            entry.successor = Some((now, session.clone()));
        }
        Ok(Some(session))
    }

    async fn exchange_code_for_session(&self, code: &str) -> Result<RemoteSession, StoreError> {
        self.check("exchange_code_for_session")?;
        let mut state = self.state.write().await;
        let user = state
            .auth_codes
            .remove(code)
            .and_then(|user_id| state.users.get(&user_id).cloned())
            .ok_or_else(|| StoreError::Rejected("invalid flow state, no valid flow state found".into()))?;
        self.issue_session(&mut state, &user, Uuid::new_v4())
    }

    async fn reset_password_email(&self, email: &str, redirect_to: &str) -> Result<(), StoreError> {
        self.check("reset_password_email")?;
        let mut state = self.state.write().await;
        // Unknown addresses succeed silently
        let Some(user_id) = state.user_by_email(email.trim()).map(|u| u.id) else {
            return Ok(());
        };
        let code = Uuid::new_v4().simple().to_string();
        state.auth_codes.insert(code.clone(), user_id);
        let link = match url::Url::parse(redirect_to) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("code", &code);
                url.to_string()
            }
            Err(_) => format!("{}?code={}", redirect_to, code),
        };
        state.outbox.push((email.trim().to_lowercase(), link));
        Ok(())
    }

    async fn update_password(&self, access_token: &str, new_password: &str) -> Result<(), StoreError> {
        self.check("update_password")?;
        if new_password.chars().count() < 6 {
            return Err(StoreError::Rejected("Password should be at least 6 characters".into()));
        }
        let mut state = self.state.write().await;
        let claims = self
            .live_claims(&state, access_token)
            .ok_or_else(|| StoreError::Rejected("Auth session missing!".into()))?;
        if let Some(user) = state.users.get_mut(&claims.sub) {
            user.password = new_password.to_string();
        }
        Ok(())
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), StoreError> {
        self.check("sign_out")?;
        let mut state = self.state.write().await;
        if let Some(session_id) = decode_access_token(access_token, Some(&self.secret))
            .ok()
            .and_then(|claims| claims.session_id)
        {
            if !state.revoked_sessions.contains(&session_id) {
                state.revoked_sessions.push(session_id);
            }
        }
        Ok(())
    }

    async fn admin_delete_user(&self, user_id: Uuid) -> Result<(), StoreError> {
        self.check("admin_delete_user")?;
        let mut state = self.state.write().await;
        if state.users.remove(&user_id).is_none() {
            return Err(StoreError::NotFound("User not found".into()));
        }
        let sessions: Vec<Uuid> = state
            .refresh_tokens
            .values()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.session_id)
            .collect();
        state.revoked_sessions.extend(sessions);
        state.refresh_tokens.retain(|_, r| r.user_id != user_id);

        let owned: Vec<Uuid> = state
            .groups
            .iter()
            .filter(|g| g.owner_id == user_id)
            .map(|g| g.id)
            .collect();
        for group_id in owned {
            state.remove_group_cascade(group_id);
        }
        state.memberships.retain(|m| m.user_id != user_id);
        state.comments.retain(|c| c.user_id != user_id);
        state.profiles.remove(&user_id);
        Ok(())
    }
}

#[async_trait]
impl DataStore for MemoryBackend {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check("ping")
    }

    async fn insert_group(&self, group: NewGroup) -> Result<Group, StoreError> {
        self.check("insert_group")?;
        let mut state = self.state.write().await;
        if state.groups.iter().any(|g| g.invite_code == group.invite_code) {
            return Err(StoreError::Conflict("duplicate invite code".into()));
        }
        let created_at = state.tick();
        let row = Group {
            id: Uuid::new_v4(),
            name: group.name,
            invite_code: group.invite_code,
            owner_id: group.owner_id,
            created_at,
        };
        state.groups.push(row.clone());
        Ok(row)
    }

    async fn find_group(&self, id: Uuid) -> Result<Option<Group>, StoreError> {
        self.check("find_group")?;
        Ok(self.state.read().await.groups.iter().find(|g| g.id == id).cloned())
    }

    async fn find_group_by_invite_code(&self, code: &str) -> Result<Option<Group>, StoreError> {
        self.check("find_group_by_invite_code")?;
        let state = self.state.read().await;
        Ok(state.groups.iter().find(|g| g.invite_code == code).cloned())
    }

    async fn delete_group(&self, id: Uuid, owner_id: Uuid) -> Result<u64, StoreError> {
        self.check("delete_group")?;
        let mut state = self.state.write().await;
        if !state.groups.iter().any(|g| g.id == id && g.owner_id == owner_id) {
            return Ok(0);
        }
        state.remove_group_cascade(id);
        Ok(1)
    }

    async fn upsert_membership(&self, membership: NewMembership) -> Result<Membership, StoreError> {
        self.check("upsert_membership")?;
        let mut state = self.state.write().await;
        if !state.groups.iter().any(|g| g.id == membership.group_id) {
            return Err(StoreError::Remote("insert or update on table \"group_members\" violates foreign key constraint".into()));
        }
        if let Some(existing) = state
            .memberships
            .iter_mut()
            .find(|m| m.group_id == membership.group_id && m.user_id == membership.user_id)
        {
            existing.role = membership.role;
            return Ok(existing.clone());
        }
        let joined_at = state.tick();
        let row = Membership {
            group_id: membership.group_id,
            user_id: membership.user_id,
            role: membership.role,
            joined_at,
        };
        state.memberships.push(row.clone());
        Ok(row)
    }

    async fn insert_membership(&self, membership: NewMembership) -> Result<Membership, StoreError> {
        self.check("insert_membership")?;
        let mut state = self.state.write().await;
        if !state.groups.iter().any(|g| g.id == membership.group_id) {
            return Err(StoreError::Remote("insert or update on table \"group_members\" violates foreign key constraint".into()));
        }
        if state
            .memberships
            .iter()
            .any(|m| m.group_id == membership.group_id && m.user_id == membership.user_id)
        {
            return Err(StoreError::Conflict(
                "duplicate key value violates unique constraint \"group_members_pkey\"".into(),
            ));
        }
        let joined_at = state.tick();
        let row = Membership {
            group_id: membership.group_id,
            user_id: membership.user_id,
            role: membership.role,
            joined_at,
        };
        state.memberships.push(row.clone());
        Ok(row)
    }

    async fn find_membership(&self, group_id: Uuid, user_id: Uuid) -> Result<Option<Membership>, StoreError> {
        self.check("find_membership")?;
        let state = self.state.read().await;
        Ok(state
            .memberships
            .iter()
            .find(|m| m.group_id == group_id && m.user_id == user_id)
            .cloned())
    }

    async fn list_user_groups(&self, user_id: Uuid) -> Result<Vec<GroupMembership>, StoreError> {
        self.check("list_user_groups")?;
        let state = self.state.read().await;
        let mut rows: Vec<GroupMembership> = state
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| {
                state.groups.iter().find(|g| g.id == m.group_id).map(|g| GroupMembership {
                    id: g.id,
                    name: g.name.clone(),
                    invite_code: g.invite_code.clone(),
                    role: m.role,
                    created_at: g.created_at,
                })
            })
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn list_group_members(&self, group_id: Uuid) -> Result<Vec<MemberProfile>, StoreError> {
        self.check("list_group_members")?;
        let state = self.state.read().await;
        Ok(state
            .memberships
            .iter()
            .filter(|m| m.group_id == group_id)
            .map(|m| {
                let (username, full_name) = state.profile_names(m.user_id);
                MemberProfile {
                    user_id: m.user_id,
                    role: m.role,
                    username,
                    full_name,
                }
            })
            .collect())
    }

    async fn insert_project(&self, project: NewProject) -> Result<Project, StoreError> {
        self.check("insert_project")?;
        let mut state = self.state.write().await;
        if !state.groups.iter().any(|g| g.id == project.group_id) {
            return Err(StoreError::Remote("insert or update on table \"projects\" violates foreign key constraint".into()));
        }
        let created_at = state.tick();
        let row = Project {
            id: Uuid::new_v4(),
            group_id: project.group_id,
            name: project.name,
            created_at,
        };
        state.projects.push(row.clone());
        Ok(row)
    }

    async fn find_project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        self.check("find_project")?;
        Ok(self.state.read().await.projects.iter().find(|p| p.id == id).cloned())
    }

    async fn list_projects(&self, group_id: Uuid) -> Result<Vec<Project>, StoreError> {
        self.check("list_projects")?;
        let state = self.state.read().await;
        let mut rows: Vec<Project> = state.projects.iter().filter(|p| p.group_id == group_id).cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert_task(&self, task: NewTask) -> Result<Task, StoreError> {
        self.check("insert_task")?;
        let mut state = self.state.write().await;
        if !state.projects.iter().any(|p| p.id == task.project_id) {
            return Err(StoreError::Remote("insert or update on table \"tasks\" violates foreign key constraint".into()));
        }
        let created_at = state.tick();
        let row = Task {
            id: Uuid::new_v4(),
            project_id: task.project_id,
            title: task.title,
            status: TaskStatus::Todo,
            created_by: task.created_by,
            created_at,
        };
        state.tasks.push(row.clone());
        Ok(row)
    }

    async fn find_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        self.check("find_task")?;
        Ok(self.state.read().await.tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn list_tasks(&self, project_id: Uuid) -> Result<Vec<Task>, StoreError> {
        self.check("list_tasks")?;
        let state = self.state.read().await;
        let mut rows: Vec<Task> = state.tasks.iter().filter(|t| t.project_id == project_id).cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn update_task_status(&self, id: Uuid, status: TaskStatus) -> Result<Option<Task>, StoreError> {
        self.check("update_task_status")?;
        let mut state = self.state.write().await;
        Ok(state.tasks.iter_mut().find(|t| t.id == id).map(|task| {
            task.status = status;
            task.clone()
        }))
    }

    async fn delete_task(&self, id: Uuid) -> Result<u64, StoreError> {
        self.check("delete_task")?;
        let mut state = self.state.write().await;
        let before = state.tasks.len();
        state.tasks.retain(|t| t.id != id);
        let deleted = (before - state.tasks.len()) as u64;
        if deleted > 0 {
            state.comments.retain(|c| c.task_id != id);
        }
        Ok(deleted)
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, StoreError> {
        self.check("insert_comment")?;
        let mut state = self.state.write().await;
        if !state.tasks.iter().any(|t| t.id == comment.task_id) {
            return Err(StoreError::Remote("insert or update on table \"comments\" violates foreign key constraint".into()));
        }
        let created_at = state.tick();
        let row = Comment {
            id: Uuid::new_v4(),
            task_id: comment.task_id,
            user_id: comment.user_id,
            content: comment.content,
            created_at,
        };
        state.comments.push(row.clone());
        Ok(row)
    }

    async fn find_comment(&self, id: Uuid) -> Result<Option<Comment>, StoreError> {
        self.check("find_comment")?;
        Ok(self.state.read().await.comments.iter().find(|c| c.id == id).cloned())
    }

    async fn list_comments(&self, task_id: Uuid) -> Result<Vec<CommentWithAuthor>, StoreError> {
        self.check("list_comments")?;
        let state = self.state.read().await;
        let mut rows: Vec<CommentWithAuthor> = state
            .comments
            .iter()
            .filter(|c| c.task_id == task_id)
            .map(|c| {
                let (author_username, author_full_name) = state.profile_names(c.user_id);
                CommentWithAuthor {
                    comment: c.clone(),
                    author_username,
                    author_full_name,
                }
            })
            .collect();
        rows.sort_by(|a, b| a.comment.created_at.cmp(&b.comment.created_at));
        Ok(rows)
    }

    async fn delete_comment(&self, id: Uuid) -> Result<u64, StoreError> {
        self.check("delete_comment")?;
        let mut state = self.state.write().await;
        let before = state.comments.len();
        state.comments.retain(|c| c.id != id);
        Ok((before - state.comments.len()) as u64)
    }

    async fn upsert_profile(&self, profile: Profile) -> Result<(), StoreError> {
        self.check("upsert_profile")?;
        let mut state = self.state.write().await;
        let entry = state.profiles.entry(profile.id).or_insert_with(|| Profile {
            id: profile.id,
            email: None,
            username: None,
            full_name: None,
        });
        entry.email = profile.email.or(entry.email.take());
        entry.username = profile.username.or(entry.username.take());
        entry.full_name = profile.full_name.or(entry.full_name.take());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemberRole;

    async fn owner_and_group(backend: &MemoryBackend) -> (Uuid, Group) {
        let owner = backend.register_user("owner@example.com", "secret1").await.unwrap();
        let group = backend
            .insert_group(NewGroup {
                name: "Design".into(),
                invite_code: "ABCD1234".into(),
                owner_id: owner.id,
            })
            .await
            .unwrap();
        (owner.id, group)
    }

    #[tokio::test]
    async fn duplicate_membership_is_a_conflict() {
        let backend = MemoryBackend::new();
        let (owner, group) = owner_and_group(&backend).await;
        let new = NewMembership { group_id: group.id, user_id: owner, role: MemberRole::Member };
        backend.insert_membership(new.clone()).await.unwrap();
        let err = backend.insert_membership(new).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(backend.membership_count(group.id, owner).await, 1);
    }

    #[tokio::test]
    async fn upsert_membership_updates_role_in_place() {
        let backend = MemoryBackend::new();
        let (owner, group) = owner_and_group(&backend).await;
        backend
            .upsert_membership(NewMembership { group_id: group.id, user_id: owner, role: MemberRole::Member })
            .await
            .unwrap();
        let row = backend
            .upsert_membership(NewMembership { group_id: group.id, user_id: owner, role: MemberRole::Admin })
            .await
            .unwrap();
        assert_eq!(row.role, MemberRole::Admin);
        assert_eq!(backend.membership_count(group.id, owner).await, 1);
    }

    #[tokio::test]
    async fn deleting_group_cascades_and_checks_owner() {
        let backend = MemoryBackend::new();
        let (owner, group) = owner_and_group(&backend).await;
        let project = backend
            .insert_project(NewProject { group_id: group.id, name: "Site".into() })
            .await
            .unwrap();
        let task = backend
            .insert_task(NewTask { project_id: project.id, title: "Hero".into(), created_by: owner })
            .await
            .unwrap();
        backend
            .insert_comment(NewComment { task_id: task.id, user_id: owner, content: "ok".into() })
            .await
            .unwrap();

        assert_eq!(backend.delete_group(group.id, Uuid::new_v4()).await.unwrap(), 0);
        assert_eq!(backend.delete_group(group.id, owner).await.unwrap(), 1);
        assert!(backend.find_project(project.id).await.unwrap().is_none());
        assert!(backend.list_comments(task.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replayed_refresh_token_outside_interval_revokes_session() {
        let mut backend = MemoryBackend::new();
        backend.reuse_interval = Duration::zero();
        backend.register_user("a@example.com", "secret1").await.unwrap();
        let session = backend.sign_in_with_password("a@example.com", "secret1").await.unwrap();

        let rotated = backend.refresh_session(&session.refresh_token).await.unwrap().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(backend.refresh_session(&session.refresh_token).await.unwrap().is_none());
        // The whole session is gone, successor included
        assert!(backend.refresh_session(&rotated.refresh_token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn injected_failure_applies_once() {
        let backend = MemoryBackend::new();
        backend.fail_next("list_tasks", StoreError::Remote("boom".into()));
        assert!(backend.list_tasks(Uuid::new_v4()).await.is_err());
        assert!(backend.list_tasks(Uuid::new_v4()).await.is_ok());
    }

    #[tokio::test]
    async fn profile_upsert_keeps_existing_names() {
        let backend = MemoryBackend::new();
        let id = Uuid::new_v4();
        backend
            .upsert_profile(Profile { id, email: None, username: Some("ada".into()), full_name: Some("Ada L".into()) })
            .await
            .unwrap();
        backend
            .upsert_profile(Profile { id, email: Some("ada@example.com".into()), username: None, full_name: None })
            .await
            .unwrap();
        let state = backend.state.read().await;
        let profile = state.profiles.get(&id).unwrap();
        assert_eq!(profile.username.as_deref(), Some("ada"));
        assert_eq!(profile.email.as_deref(), Some("ada@example.com"));
    }
}
