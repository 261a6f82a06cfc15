use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::claims::AccessClaims;
use crate::store::{RemoteSession, RemoteUser};

/// The resolved authenticated user for a request or a client session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Identity {
    pub fn from_session(session: &RemoteSession) -> Self {
        Self {
            id: session.user.id,
            email: session.user.email.clone(),
            issued_at: session.issued_at,
            expires_at: session.expires_at,
        }
    }

    /// The user record comes from the auth service, the timestamps from the
    /// token it validated.
    pub fn from_user(user: &RemoteUser, claims: &AccessClaims) -> Self {
        Self {
            id: user.id,
            email: user.email.clone().or_else(|| claims.email.clone()),
            issued_at: claims.issued_at(),
            expires_at: claims.expires_at(),
        }
    }

    /// Same user with the same credential lifetime
    pub fn is_equivalent(&self, other: &Identity) -> bool {
        self.id == other.id && self.email == other.email && self.expires_at == other.expires_at
    }
}
