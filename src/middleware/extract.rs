use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::auth::Identity;
use crate::error::ApiError;

/// Session state the middleware attached to a request
#[derive(Debug, Clone, Default)]
pub struct RequestSession {
    pub identity: Option<Identity>,
    /// Access token valid for this request, already rotated if needed
    pub access_token: Option<String>,
}

/// Authenticated user of the current request
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub identity: Identity,
    pub access_token: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<RequestSession>()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
        match (&session.identity, &session.access_token) {
            (Some(identity), Some(access_token)) => Ok(AuthUser {
                identity: identity.clone(),
                access_token: access_token.clone(),
            }),
            _ => Err(ApiError::unauthorized("Authentication required")),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestSession
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<RequestSession>().cloned().unwrap_or_default())
    }
}
