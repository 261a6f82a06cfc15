use uuid::Uuid;

use super::{Screen, ViewCore};
use crate::auth::APP_ROOT;
use crate::client::optimistic::Confirm;
use crate::client::remote::Remote;
use crate::client::session::SessionCache;
use crate::services::groups::GroupSettings;

/// Owner-only settings page of a group
pub struct GroupSettingsView {
    group_id: Uuid,
    core: ViewCore<GroupSettings>,
}

impl GroupSettingsView {
    pub fn new(session: &SessionCache, group_id: Uuid) -> Self {
        Self {
            group_id,
            core: ViewCore::new(session),
        }
    }

    pub fn screen(&self) -> Screen<GroupSettings> {
        self.core.snapshot()
    }

    pub async fn load(&self, remote: &dyn Remote) {
        if self.core.admit().is_none() {
            return;
        }
        let ticket = self.core.ticket();
        match remote.group_settings(self.group_id).await {
            Ok(settings) => {
                self.core.store(ticket, settings);
            }
            Err(err) => self.core.fail(&err),
        }
    }

    /// Deletes the group after a confirmation and the typed group name.
    /// Returns true once the group is gone and the page points back at `/app`.
    pub async fn delete_group(&self, remote: &dyn Remote, confirm: &mut dyn Confirm) -> bool {
        if self.core.admit().is_none() {
            return false;
        }
        let Some(name) = self
            .core
            .with(|screen| screen.data.as_ref().map(|settings| settings.group.name.clone()))
        else {
            return false;
        };

        if !confirm.confirm(&format!(
            "Delete group \"{}\"? Projects, tasks and comments go with it.",
            name
        )) {
            return false;
        }
        if !confirm.confirm_typed("Type the group name to confirm", &name) {
            self.core.reject("group name did not match");
            return false;
        }

        match remote.delete_group(self.group_id, &name).await {
            Ok(()) => {
                if self.core.liveness().is_alive() {
                    self.core.with(|screen| {
                        screen.data = None;
                        screen.redirect = Some(APP_ROOT.to_string());
                    });
                }
                true
            }
            Err(err) => {
                self.core.fail(&err);
                false
            }
        }
    }
}
