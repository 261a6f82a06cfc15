use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use super::models::*;
use super::{DataStore, RetryPolicy, StoreError};
use crate::config::AppConfig;
use crate::types::{MemberRole, TaskStatus};

const UNIQUE_VIOLATION: &str = "23505";

/// Tables of the hosted backend, read and written directly over Postgres
pub struct PgStore {
    pool: PgPool,
    policy: RetryPolicy,
}

impl PgStore {
    /// Builds a lazily-connecting pool, so startup does not wait on the database
    pub fn connect(config: &AppConfig) -> Result<Self, StoreError> {
        let url = config
            .backend
            .database_url
            .as_deref()
            .ok_or(StoreError::ConfigMissing("DATABASE_URL"))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.backend.max_connections)
            .acquire_timeout(config.remote_timeout())
            .connect_lazy(url)
            .map_err(map_sqlx)?;
        info!("Configured Postgres pool (max {} connections)", config.backend.max_connections);
        Ok(Self {
            pool,
            policy: RetryPolicy::from(&config.remote),
        })
    }

    pub fn with_pool(pool: PgPool, policy: RetryPolicy) -> Self {
        Self { pool, policy }
    }
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::Conflict(db.message().to_string())
        }
        sqlx::Error::Database(db) => StoreError::Remote(db.message().to_string()),
        sqlx::Error::RowNotFound => StoreError::NotFound("row not found".into()),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            StoreError::Unavailable(err.to_string())
        }
        other => {
            tracing::error!("Postgres error: {}", other);
            StoreError::Remote(other.to_string())
        }
    }
}

fn decode_err(column: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Remote(format!("cannot decode column {}: {}", column, err))
}

fn task_from_row(row: &PgRow) -> Result<Task, StoreError> {
    let status: String = row.try_get("status").map_err(map_sqlx)?;
    Ok(Task {
        id: row.try_get("id").map_err(map_sqlx)?,
        project_id: row.try_get("project_id").map_err(map_sqlx)?,
        title: row.try_get("title").map_err(map_sqlx)?,
        status: TaskStatus::from_str(&status).map_err(|e| decode_err("status", e))?,
        created_by: row.try_get("created_by").map_err(map_sqlx)?,
        created_at: row.try_get("created_at").map_err(map_sqlx)?,
    })
}

fn role_from_row(row: &PgRow) -> Result<MemberRole, StoreError> {
    let role: String = row.try_get("role").map_err(map_sqlx)?;
    MemberRole::from_str(&role).map_err(|e| decode_err("role", e))
}

fn membership_from_row(row: &PgRow) -> Result<Membership, StoreError> {
    Ok(Membership {
        group_id: row.try_get("group_id").map_err(map_sqlx)?,
        user_id: row.try_get("user_id").map_err(map_sqlx)?,
        role: role_from_row(row)?,
        joined_at: row.try_get("joined_at").map_err(map_sqlx)?,
    })
}

const TASK_COLUMNS: &str = "id, project_id, title, status, created_by, created_at";

#[async_trait]
impl DataStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.policy
            .read(|| async move {
                sqlx::query("SELECT 1").execute(&self.pool).await.map_err(map_sqlx)?;
                Ok(())
            })
            .await
    }

    async fn insert_group(&self, group: NewGroup) -> Result<Group, StoreError> {
        self.policy
            .once(async {
                sqlx::query_as::<_, Group>(
                    "INSERT INTO groups (name, invite_code, owner_id) VALUES ($1, $2, $3)
                     RETURNING id, name, invite_code, owner_id, created_at",
                )
                .bind(&group.name)
                .bind(&group.invite_code)
                .bind(group.owner_id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)
            })
            .await
    }

    async fn find_group(&self, id: Uuid) -> Result<Option<Group>, StoreError> {
        self.policy
            .read(|| async move {
                sqlx::query_as::<_, Group>(
                    "SELECT id, name, invite_code, owner_id, created_at FROM groups WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)
            })
            .await
    }

    async fn find_group_by_invite_code(&self, code: &str) -> Result<Option<Group>, StoreError> {
        self.policy
            .read(|| async move {
                sqlx::query_as::<_, Group>(
                    "SELECT id, name, invite_code, owner_id, created_at FROM groups WHERE invite_code = $1",
                )
                .bind(code)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)
            })
            .await
    }

    async fn delete_group(&self, id: Uuid, owner_id: Uuid) -> Result<u64, StoreError> {
        self.policy
            .once(async {
                let result = sqlx::query("DELETE FROM groups WHERE id = $1 AND owner_id = $2")
                    .bind(id)
                    .bind(owner_id)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx)?;
                Ok(result.rows_affected())
            })
            .await
    }

    async fn upsert_membership(&self, membership: NewMembership) -> Result<Membership, StoreError> {
        self.policy
            .once(async {
                let row = sqlx::query(
                    "INSERT INTO group_members (group_id, user_id, role) VALUES ($1, $2, $3)
                     ON CONFLICT (group_id, user_id) DO UPDATE SET role = EXCLUDED.role
                     RETURNING group_id, user_id, role, joined_at",
                )
                .bind(membership.group_id)
                .bind(membership.user_id)
                .bind(membership.role.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)?;
                membership_from_row(&row)
            })
            .await
    }

    async fn insert_membership(&self, membership: NewMembership) -> Result<Membership, StoreError> {
        self.policy
            .once(async {
                let row = sqlx::query(
                    "INSERT INTO group_members (group_id, user_id, role) VALUES ($1, $2, $3)
                     RETURNING group_id, user_id, role, joined_at",
                )
                .bind(membership.group_id)
                .bind(membership.user_id)
                .bind(membership.role.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)?;
                membership_from_row(&row)
            })
            .await
    }

    async fn find_membership(&self, group_id: Uuid, user_id: Uuid) -> Result<Option<Membership>, StoreError> {
        self.policy
            .read(|| async move {
                let row = sqlx::query(
                    "SELECT group_id, user_id, role, joined_at FROM group_members
                     WHERE group_id = $1 AND user_id = $2",
                )
                .bind(group_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;
                row.as_ref().map(membership_from_row).transpose()
            })
            .await
    }

    async fn list_user_groups(&self, user_id: Uuid) -> Result<Vec<GroupMembership>, StoreError> {
        self.policy
            .read(|| async move {
                let rows = sqlx::query(
                    "SELECT g.id, g.name, g.invite_code, g.created_at, m.role
                     FROM group_members m JOIN groups g ON g.id = m.group_id
                     WHERE m.user_id = $1
                     ORDER BY g.created_at DESC",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?;
                rows.iter()
                    .map(|row| {
                        Ok(GroupMembership {
                            id: row.try_get("id").map_err(map_sqlx)?,
                            name: row.try_get("name").map_err(map_sqlx)?,
                            invite_code: row.try_get("invite_code").map_err(map_sqlx)?,
                            role: role_from_row(row)?,
                            created_at: row.try_get("created_at").map_err(map_sqlx)?,
                        })
                    })
                    .collect()
            })
            .await
    }

    async fn list_group_members(&self, group_id: Uuid) -> Result<Vec<MemberProfile>, StoreError> {
        self.policy
            .read(|| async move {
                let rows = sqlx::query(
                    "SELECT m.user_id, m.role, p.username, p.full_name
                     FROM group_members m LEFT JOIN profiles p ON p.id = m.user_id
                     WHERE m.group_id = $1
                     ORDER BY m.joined_at",
                )
                .bind(group_id)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?;
                rows.iter()
                    .map(|row| {
                        Ok(MemberProfile {
                            user_id: row.try_get("user_id").map_err(map_sqlx)?,
                            role: role_from_row(row)?,
                            username: row.try_get("username").map_err(map_sqlx)?,
                            full_name: row.try_get("full_name").map_err(map_sqlx)?,
                        })
                    })
                    .collect()
            })
            .await
    }

    async fn insert_project(&self, project: NewProject) -> Result<Project, StoreError> {
        self.policy
            .once(async {
                sqlx::query_as::<_, Project>(
                    "INSERT INTO projects (group_id, name) VALUES ($1, $2)
                     RETURNING id, group_id, name, created_at",
                )
                .bind(project.group_id)
                .bind(&project.name)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)
            })
            .await
    }

    async fn find_project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        self.policy
            .read(|| async move {
                sqlx::query_as::<_, Project>("SELECT id, group_id, name, created_at FROM projects WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx)
            })
            .await
    }

    async fn list_projects(&self, group_id: Uuid) -> Result<Vec<Project>, StoreError> {
        self.policy
            .read(|| async move {
                sqlx::query_as::<_, Project>(
                    "SELECT id, group_id, name, created_at FROM projects
                     WHERE group_id = $1 ORDER BY created_at DESC",
                )
                .bind(group_id)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)
            })
            .await
    }

    async fn insert_task(&self, task: NewTask) -> Result<Task, StoreError> {
        self.policy
            .once(async {
                let row = sqlx::query(&format!(
                    "INSERT INTO tasks (project_id, title, status, created_by) VALUES ($1, $2, $3, $4)
                     RETURNING {}",
                    TASK_COLUMNS
                ))
                .bind(task.project_id)
                .bind(&task.title)
                .bind(TaskStatus::Todo.as_str())
                .bind(task.created_by)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)?;
                task_from_row(&row)
            })
            .await
    }

    async fn find_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        self.policy
            .read(|| async move {
                let row = sqlx::query(&format!("SELECT {} FROM tasks WHERE id = $1", TASK_COLUMNS))
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx)?;
                row.as_ref().map(task_from_row).transpose()
            })
            .await
    }

    async fn list_tasks(&self, project_id: Uuid) -> Result<Vec<Task>, StoreError> {
        self.policy
            .read(|| async move {
                let rows = sqlx::query(&format!(
                    "SELECT {} FROM tasks WHERE project_id = $1 ORDER BY created_at DESC",
                    TASK_COLUMNS
                ))
                .bind(project_id)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?;
                rows.iter().map(task_from_row).collect()
            })
            .await
    }

    async fn update_task_status(&self, id: Uuid, status: TaskStatus) -> Result<Option<Task>, StoreError> {
        self.policy
            .once(async {
                let row = sqlx::query(&format!(
                    "UPDATE tasks SET status = $2 WHERE id = $1 RETURNING {}",
                    TASK_COLUMNS
                ))
                .bind(id)
                .bind(status.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;
                row.as_ref().map(task_from_row).transpose()
            })
            .await
    }

    async fn delete_task(&self, id: Uuid) -> Result<u64, StoreError> {
        self.policy
            .once(async {
                let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx)?;
                Ok(result.rows_affected())
            })
            .await
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, StoreError> {
        self.policy
            .once(async {
                sqlx::query_as::<_, Comment>(
                    "INSERT INTO comments (task_id, user_id, content) VALUES ($1, $2, $3)
                     RETURNING id, task_id, user_id, content, created_at",
                )
                .bind(comment.task_id)
                .bind(comment.user_id)
                .bind(&comment.content)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)
            })
            .await
    }

    async fn find_comment(&self, id: Uuid) -> Result<Option<Comment>, StoreError> {
        self.policy
            .read(|| async move {
                sqlx::query_as::<_, Comment>(
                    "SELECT id, task_id, user_id, content, created_at FROM comments WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)
            })
            .await
    }

    async fn list_comments(&self, task_id: Uuid) -> Result<Vec<CommentWithAuthor>, StoreError> {
        self.policy
            .read(|| async move {
                let rows = sqlx::query(
                    "SELECT c.id, c.task_id, c.user_id, c.content, c.created_at, p.username, p.full_name
                     FROM comments c LEFT JOIN profiles p ON p.id = c.user_id
                     WHERE c.task_id = $1
                     ORDER BY c.created_at ASC",
                )
                .bind(task_id)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?;
                rows.iter()
                    .map(|row| {
                        Ok(CommentWithAuthor {
                            comment: Comment {
                                id: row.try_get("id").map_err(map_sqlx)?,
                                task_id: row.try_get("task_id").map_err(map_sqlx)?,
                                user_id: row.try_get("user_id").map_err(map_sqlx)?,
                                content: row.try_get("content").map_err(map_sqlx)?,
                                created_at: row.try_get("created_at").map_err(map_sqlx)?,
                            },
                            author_username: row.try_get("username").map_err(map_sqlx)?,
                            author_full_name: row.try_get("full_name").map_err(map_sqlx)?,
                        })
                    })
                    .collect()
            })
            .await
    }

    async fn delete_comment(&self, id: Uuid) -> Result<u64, StoreError> {
        self.policy
            .once(async {
                let result = sqlx::query("DELETE FROM comments WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx)?;
                Ok(result.rows_affected())
            })
            .await
    }

    async fn upsert_profile(&self, profile: Profile) -> Result<(), StoreError> {
        self.policy
            .once(async {
                sqlx::query(
                    "INSERT INTO profiles (id, email, username, full_name) VALUES ($1, $2, $3, $4)
                     ON CONFLICT (id) DO UPDATE SET
                        email = COALESCE(EXCLUDED.email, profiles.email),
                        username = COALESCE(EXCLUDED.username, profiles.username),
                        full_name = COALESCE(EXCLUDED.full_name, profiles.full_name)",
                )
                .bind(profile.id)
                .bind(&profile.email)
                .bind(&profile.username)
                .bind(&profile.full_name)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
                Ok(())
            })
            .await
    }
}
