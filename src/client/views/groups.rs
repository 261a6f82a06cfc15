use super::{Screen, ViewCore};
use crate::client::remote::Remote;
use crate::client::session::SessionCache;
use crate::store::models::{Group, GroupMembership};

/// The signed-in user's group list with create and join forms
pub struct GroupsView {
    core: ViewCore<Vec<GroupMembership>>,
}

impl GroupsView {
    pub fn new(session: &SessionCache) -> Self {
        Self {
            core: ViewCore::new(session),
        }
    }

    pub fn screen(&self) -> Screen<Vec<GroupMembership>> {
        self.core.snapshot()
    }

    pub async fn load(&self, remote: &dyn Remote) {
        if self.core.admit().is_none() {
            return;
        }
        let ticket = self.core.ticket();
        match remote.list_groups().await {
            Ok(groups) => {
                self.core.store(ticket, groups);
            }
            Err(err) => self.core.fail(&err),
        }
    }

    pub async fn create(&self, remote: &dyn Remote, name: &str) -> Option<Group> {
        let name = name.trim();
        if name.is_empty() {
            self.core.reject("group name is required");
            return None;
        }
        self.core.admit()?;
        match remote.create_group(name).await {
            Ok(group) => {
                tracing::debug!("Created group {}", group.id);
                self.load(remote).await;
                Some(group)
            }
            Err(err) => {
                self.core.fail(&err);
                None
            }
        }
    }

    pub async fn join(&self, remote: &dyn Remote, invite_code: &str) -> Option<Group> {
        let code = invite_code.trim();
        if code.is_empty() {
            self.core.reject("invite code is required");
            return None;
        }
        self.core.admit()?;
        match remote.join_group(code).await {
            Ok(group) => {
                self.core.with(|screen| screen.notice = Some(format!("Joined {}", group.name)));
                self.load(remote).await;
                Some(group)
            }
            Err(err) => {
                self.core.fail(&err);
                None
            }
        }
    }
}
