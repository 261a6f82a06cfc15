use thiserror::Error;

use super::account::friendly_auth_message;
use crate::store::StoreError;

/// Failure taxonomy of the data-access boundary
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Remote(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Missing configuration: {0}")]
    ConfigurationMissing(&'static str),

    /// A multi-step operation stopped half way; `compensated` says whether
    /// the completed steps were undone.
    #[error("{message}")]
    PartialFailure { message: String, compensated: bool },
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => ServiceError::Unavailable(msg),
            StoreError::Timeout(after) => ServiceError::Unavailable(format!("no answer within {:?}", after)),
            StoreError::Rejected(msg) => ServiceError::Validation(friendly_auth_message(&msg)),
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::NotFound(msg) => ServiceError::NotFound(msg),
            StoreError::Remote(msg) => ServiceError::Remote(msg),
            StoreError::ConfigMissing(var) => ServiceError::ConfigurationMissing(var),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn store_failures_keep_their_class() {
        assert_eq!(
            ServiceError::from(StoreError::Timeout(Duration::from_secs(1))),
            ServiceError::Unavailable("no answer within 1s".into())
        );
        assert_eq!(
            ServiceError::from(StoreError::Rejected("Invalid login credentials".into())),
            ServiceError::Validation("Invalid email or password.".into())
        );
        assert!(matches!(
            ServiceError::from(StoreError::ConfigMissing("DATABASE_URL")),
            ServiceError::ConfigurationMissing("DATABASE_URL")
        ));
    }
}
