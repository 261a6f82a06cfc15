use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Screen, ViewCore};
use crate::client::optimistic::Confirm;
use crate::client::remote::Remote;
use crate::client::session::SessionCache;
use crate::services::account::ACCOUNT_DELETE_CONFIRMATION;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub id: Uuid,
    pub email: Option<String>,
}

/// Account settings: password reset and account deletion
pub struct AccountView {
    core: ViewCore<AccountInfo>,
}

impl AccountView {
    pub fn new(session: &SessionCache) -> Self {
        Self {
            core: ViewCore::new(session),
        }
    }

    pub fn screen(&self) -> Screen<AccountInfo> {
        self.core.snapshot()
    }

    pub fn load(&self) {
        let Some(identity) = self.core.admit() else {
            return;
        };
        let ticket = self.core.ticket();
        self.core.store(
            ticket,
            AccountInfo {
                id: identity.id,
                email: identity.email,
            },
        );
    }

    pub async fn request_password_reset(&self, remote: &dyn Remote) -> bool {
        if self.core.admit().is_none() {
            return false;
        }
        match remote.request_password_reset().await {
            Ok(()) => {
                self.core.with(|screen| {
                    screen.error = None;
                    screen.notice = Some("Check your email for a password reset link.".to_string());
                });
                true
            }
            Err(err) => {
                self.core.fail(&err);
                false
            }
        }
    }

    /// Deletes the account after a confirmation and the typed word `DELETE`,
    /// then signs the client out.
    pub async fn delete_account(&self, remote: &dyn Remote, confirm: &mut dyn Confirm) -> bool {
        if self.core.admit().is_none() {
            return false;
        }
        if !confirm.confirm("Delete your account? This cannot be undone.") {
            return false;
        }
        if !confirm.confirm_typed(
            &format!("Type {} to confirm", ACCOUNT_DELETE_CONFIRMATION),
            ACCOUNT_DELETE_CONFIRMATION,
        ) {
            self.core
                .reject(&format!("type {} to confirm account deletion", ACCOUNT_DELETE_CONFIRMATION));
            return false;
        }

        match remote.delete_account(ACCOUNT_DELETE_CONFIRMATION).await {
            Ok(()) => {
                tracing::info!("Account deleted, signing out");
                self.core.session().publish(None);
                true
            }
            Err(err) => {
                self.core.fail(&err);
                false
            }
        }
    }
}
