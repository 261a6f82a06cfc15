use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::policy::{require_member, require_owner};
use super::{required, Panel, ServiceError};
use crate::auth::Identity;
use crate::store::models::*;
use crate::store::StoreError;
use crate::types::MemberRole;

const INVITE_CODE_LEN: usize = 8;
const INVITE_CODE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupOverview {
    pub group: Group,
    pub role: MemberRole,
    pub is_owner: bool,
    pub members: Vec<MemberProfile>,
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSettings {
    pub group: Group,
    pub members: Vec<MemberProfile>,
}

/// Eight uppercase hex characters derived from a random UUID
pub fn generate_invite_code() -> String {
    let digest = Sha256::digest(Uuid::new_v4().as_bytes());
    digest
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<String>()
        .chars()
        .take(INVITE_CODE_LEN)
        .collect()
}

/// Invite codes are compared trimmed and uppercased
pub fn normalize_invite_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Groups the actor belongs to, newest group first
pub async fn list_for(panel: &Panel, actor: &Identity) -> Result<Vec<GroupMembership>, ServiceError> {
    Ok(panel.store.list_user_groups(actor.id).await?)
}

/// Creates a group owned by the actor and enrolls them as admin.
///
/// When the enrollment fails the group is deleted again; the error says
/// whether that cleanup worked.
pub async fn create(panel: &Panel, actor: &Identity, name: &str) -> Result<Group, ServiceError> {
    let name = required(name, "group name")?;

    let mut attempt = 0;
    let group = loop {
        attempt += 1;
        let new = NewGroup {
            name: name.clone(),
            invite_code: generate_invite_code(),
            owner_id: actor.id,
        };
        match panel.store.insert_group(new).await {
            Ok(group) => break group,
            Err(StoreError::Conflict(_)) if attempt < INVITE_CODE_ATTEMPTS => {
                tracing::debug!("Invite code collision, regenerating");
            }
            Err(err) => return Err(err.into()),
        }
    };

    let membership = NewMembership {
        group_id: group.id,
        user_id: actor.id,
        role: MemberRole::Admin,
    };
    if let Err(err) = panel.store.upsert_membership(membership).await {
        tracing::error!("Membership for new group {} failed: {}", group.id, err);
        let compensated = match panel.store.delete_group(group.id, actor.id).await {
            Ok(rows) => rows > 0,
            Err(cleanup) => {
                tracing::error!("Could not remove orphaned group {}: {}", group.id, cleanup);
                false
            }
        };
        let outcome = if compensated {
            "the group was removed again"
        } else {
            "the group could not be removed"
        };
        return Err(ServiceError::PartialFailure {
            message: format!("Group created but membership failed: {}; {}", err, outcome),
            compensated,
        });
    }

    tracing::info!("User {} created group {}", actor.id, group.id);
    Ok(group)
}

/// Joins the group behind an invite code as a plain member
pub async fn join(panel: &Panel, actor: &Identity, code: &str) -> Result<Group, ServiceError> {
    let code = normalize_invite_code(code);
    if code.is_empty() {
        return Err(ServiceError::Validation("invite code is required".into()));
    }
    let group = panel
        .store
        .find_group_by_invite_code(&code)
        .await?
        .ok_or_else(|| ServiceError::Validation("invalid invite code".into()))?;

    let membership = NewMembership {
        group_id: group.id,
        user_id: actor.id,
        role: MemberRole::Member,
    };
    match panel.store.insert_membership(membership).await {
        Ok(_) => {
            tracing::info!("User {} joined group {}", actor.id, group.id);
            Ok(group)
        }
        Err(StoreError::Conflict(_)) => Err(ServiceError::Conflict("already a member of this group".into())),
        Err(err) => Err(err.into()),
    }
}

pub async fn overview(panel: &Panel, actor: &Identity, group_id: Uuid) -> Result<GroupOverview, ServiceError> {
    let (group, membership) = require_member(panel, actor, group_id).await?;
    let (members, projects) = futures::try_join!(
        panel.store.list_group_members(group_id),
        panel.store.list_projects(group_id),
    )?;
    Ok(GroupOverview {
        is_owner: group.owner_id == actor.id,
        group,
        role: membership.role,
        members,
        projects,
    })
}

pub async fn settings(panel: &Panel, actor: &Identity, group_id: Uuid) -> Result<GroupSettings, ServiceError> {
    let group = require_owner(panel, actor, group_id).await?;
    let members = panel.store.list_group_members(group_id).await?;
    Ok(GroupSettings { group, members })
}

/// Deletes a group. Owner only; `confirmation` must repeat the group name.
pub async fn delete(panel: &Panel, actor: &Identity, group_id: Uuid, confirmation: &str) -> Result<(), ServiceError> {
    let group = require_owner(panel, actor, group_id).await?;
    if confirmation.trim() != group.name {
        return Err(ServiceError::Validation("confirmation does not match the group name".into()));
    }
    let deleted = panel.store.delete_group(group_id, actor.id).await?;
    if deleted == 0 {
        return Err(ServiceError::Forbidden(
            "group could not be deleted; you may not have permission".into(),
        ));
    }
    tracing::info!("User {} deleted group {}", actor.id, group_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestContext;

    #[test]
    fn invite_codes_are_eight_uppercase_hex_chars() {
        let code = generate_invite_code();
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        assert_ne!(code, generate_invite_code());
    }

    #[tokio::test]
    async fn creator_becomes_admin() {
        let ctx = TestContext::new().await;
        let owner = ctx.user("owner@example.com").await;
        let group = create(&ctx.panel, &owner, "  Design  ").await.unwrap();
        assert_eq!(group.name, "Design");

        let groups = list_for(&ctx.panel, &owner).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].role, MemberRole::Admin);
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let ctx = TestContext::new().await;
        let owner = ctx.user("owner@example.com").await;
        assert!(matches!(create(&ctx.panel, &owner, "   ").await, Err(ServiceError::Validation(_))));
        assert_eq!(ctx.backend.group_count().await, 0);
    }

    #[tokio::test]
    async fn failed_enrollment_removes_the_group() {
        let ctx = TestContext::new().await;
        let owner = ctx.user("owner@example.com").await;
        ctx.backend.fail_next("upsert_membership", StoreError::Remote("insert failed".into()));

        let err = create(&ctx.panel, &owner, "Design").await.unwrap_err();
        match err {
            ServiceError::PartialFailure { message, compensated } => {
                assert!(compensated);
                assert!(message.starts_with("Group created but membership failed"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(ctx.backend.group_count().await, 0);
    }

    #[tokio::test]
    async fn failed_compensation_is_reported() {
        let ctx = TestContext::new().await;
        let owner = ctx.user("owner@example.com").await;
        ctx.backend.fail_next("upsert_membership", StoreError::Remote("insert failed".into()));
        ctx.backend.fail_next("delete_group", StoreError::Unavailable("down".into()));

        let err = create(&ctx.panel, &owner, "Design").await.unwrap_err();
        assert!(matches!(err, ServiceError::PartialFailure { compensated: false, .. }));
        assert_eq!(ctx.backend.group_count().await, 1);
    }

    #[tokio::test]
    async fn join_normalizes_code_and_rejects_duplicates() {
        let ctx = TestContext::new().await;
        let owner = ctx.user("owner@example.com").await;
        let member = ctx.user("member@example.com").await;
        let group = ctx.group(&owner, "Design").await;

        let typed = format!("  {}  ", group.invite_code.to_lowercase());
        let joined = join(&ctx.panel, &member, &typed).await.unwrap();
        assert_eq!(joined.id, group.id);

        let again = join(&ctx.panel, &member, &group.invite_code).await.unwrap_err();
        assert_eq!(again, ServiceError::Conflict("already a member of this group".into()));
        assert_eq!(ctx.backend.membership_count(group.id, member.id).await, 1);
    }

    #[tokio::test]
    async fn unknown_or_empty_code_is_a_validation_error() {
        let ctx = TestContext::new().await;
        let member = ctx.user("member@example.com").await;
        assert_eq!(
            join(&ctx.panel, &member, "NOPE0000").await.unwrap_err(),
            ServiceError::Validation("invalid invite code".into())
        );
        assert!(matches!(join(&ctx.panel, &member, "   ").await, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn overview_lists_members_and_projects() {
        let ctx = TestContext::new().await;
        let owner = ctx.user("owner@example.com").await;
        let member = ctx.user("member@example.com").await;
        let group = ctx.group(&owner, "Design").await;
        ctx.join(&member, &group).await;
        ctx.project(&member, &group, "Website").await;

        let view = overview(&ctx.panel, &member, group.id).await.unwrap();
        assert_eq!(view.role, MemberRole::Member);
        assert!(!view.is_owner);
        assert_eq!(view.members.len(), 2);
        assert_eq!(view.projects.len(), 1);
    }

    #[tokio::test]
    async fn only_owner_deletes_with_matching_name() {
        let ctx = TestContext::new().await;
        let owner = ctx.user("owner@example.com").await;
        let member = ctx.user("member@example.com").await;
        let group = ctx.group(&owner, "Design").await;
        ctx.join(&member, &group).await;

        assert!(matches!(
            delete(&ctx.panel, &member, group.id, "Design").await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            delete(&ctx.panel, &owner, group.id, "design").await,
            Err(ServiceError::Validation(_))
        ));
        delete(&ctx.panel, &owner, group.id, "Design").await.unwrap();
        assert!(list_for(&ctx.panel, &member).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn settings_are_owner_only() {
        let ctx = TestContext::new().await;
        let owner = ctx.user("owner@example.com").await;
        let member = ctx.user("member@example.com").await;
        let group = ctx.group(&owner, "Design").await;
        ctx.join(&member, &group).await;

        let view = settings(&ctx.panel, &owner, group.id).await.unwrap();
        assert_eq!(view.members.len(), 2);
        assert!(matches!(
            settings(&ctx.panel, &member, group.id).await,
            Err(ServiceError::Forbidden(_))
        ));
    }
}
