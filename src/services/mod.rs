//! Authorized data access.
//!
//! Every operation takes the acting [`Identity`](crate::auth::Identity) and checks membership,
//! ownership or authorship here, before touching a row. Handlers and the
//! client runtime never talk to the store directly.

pub mod account;
pub mod comments;
pub mod error;
pub mod groups;
pub mod policy;
pub mod projects;
pub mod tasks;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::store::{AuthBackend, DataStore};

pub use error::ServiceError;

/// Shared handles the service operations run against
#[derive(Clone)]
pub struct Panel {
    pub store: Arc<dyn DataStore>,
    pub auth: Arc<dyn AuthBackend>,
    pub config: Arc<AppConfig>,
}

impl Panel {
    pub fn new(store: Arc<dyn DataStore>, auth: Arc<dyn AuthBackend>, config: Arc<AppConfig>) -> Self {
        Self { store, auth, config }
    }
}

/// Trims `value` and rejects it when nothing is left
pub(crate) fn required(value: &str, what: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::Validation(format!("{} is required", what)));
    }
    Ok(trimmed.to_string())
}
