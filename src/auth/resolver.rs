use chrono::{Duration, Utc};
use std::sync::Arc;
use thiserror::Error;

use super::claims::decode_access_token;
use super::cookies::{CookieNames, CookieOptions, CookieSet};
use super::identity::Identity;
use crate::config::AppConfig;
use crate::store::{AuthBackend, RemoteSession, StoreError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Auth backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// Outcome of resolving one request's credential
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub identity: Option<Identity>,
    /// Cookies to write back to the forwarded request and the response
    pub rotated: CookieSet,
    /// Access token valid for the rest of this request
    pub access_token: Option<String>,
}

impl Resolution {
    fn anonymous() -> Self {
        Self::default()
    }
}

/// Turns a request's credential cookies into an identity, rotating the
/// token pair when the access token is missing, expiring or rejected.
#[derive(Clone)]
pub struct SessionResolver {
    auth: Arc<dyn AuthBackend>,
    names: CookieNames,
    options: CookieOptions,
    refresh_margin: Duration,
    jwt_secret: Option<String>,
}

impl SessionResolver {
    pub fn new(auth: Arc<dyn AuthBackend>, config: &AppConfig) -> Self {
        Self {
            auth,
            names: CookieNames::with_prefix(&config.session.cookie_prefix),
            options: CookieOptions::from_config(&config.session),
            refresh_margin: Duration::seconds(config.session.refresh_margin_secs),
            jwt_secret: config.backend.jwt_secret.clone(),
        }
    }

    pub fn cookie_names(&self) -> &CookieNames {
        &self.names
    }

    pub fn cookie_options(&self) -> &CookieOptions {
        &self.options
    }

    /// Cookies that install a freshly issued session
    pub fn session_cookies(&self, session: &RemoteSession) -> CookieSet {
        CookieSet::credential_pair(&self.names, session, &self.options)
    }

    /// Cookies that remove the credential
    pub fn cleared_cookies(&self) -> CookieSet {
        CookieSet::cleared(&self.names, &self.options)
    }

    /// Resolves the credential in `cookies`. No session is a normal outcome;
    /// only an unreachable backend is an error.
    pub async fn resolve(&self, cookies: &CookieSet) -> Result<Resolution, ResolveError> {
        let access = cookies.get(&self.names.access);
        let refresh = cookies.get(&self.names.refresh);

        if access.is_none() && refresh.is_none() {
            return Ok(Resolution::anonymous());
        }

        if let Some(token) = access {
            match decode_access_token(token, self.jwt_secret.as_deref()) {
                Ok(claims) if !claims.expires_within(self.refresh_margin, Utc::now()) => {
                    match self.auth.get_user(token).await {
                        Ok(Some(user)) => {
                            return Ok(Resolution {
                                identity: Some(Identity::from_user(&user, &claims)),
                                rotated: CookieSet::new(),
                                access_token: Some(token.to_string()),
                            });
                        }
                        Ok(None) => tracing::debug!("Access token rejected by auth backend"),
                        Err(err) if err.is_transient() => return Err(unavailable(err)),
                        Err(err) => tracing::debug!("Access token refused: {}", err),
                    }
                }
                Ok(_) => tracing::debug!("Access token expiring, refreshing"),
                Err(err) => tracing::debug!("Unreadable access token: {}", err),
            }
        }

        let Some(refresh_token) = refresh else {
            return Ok(Resolution {
                rotated: self.cleared_cookies(),
                ..Resolution::anonymous()
            });
        };

        match self.auth.refresh_session(refresh_token).await {
            Ok(Some(session)) => {
                tracing::debug!("Rotated session for user {}", session.user.id);
                Ok(Resolution {
                    identity: Some(Identity::from_session(&session)),
                    rotated: self.session_cookies(&session),
                    access_token: Some(session.access_token),
                })
            }
            Ok(None) => {
                tracing::debug!("Refresh token rejected, clearing credential");
                Ok(Resolution {
                    rotated: self.cleared_cookies(),
                    ..Resolution::anonymous()
                })
            }
            Err(err) if err.is_transient() => Err(unavailable(err)),
            Err(err) => {
                tracing::debug!("Refresh refused, clearing credential: {}", err);
                Ok(Resolution {
                    rotated: self.cleared_cookies(),
                    ..Resolution::anonymous()
                })
            }
        }
    }
}

fn unavailable(err: StoreError) -> ResolveError {
    ResolveError::BackendUnavailable(err.to_string())
}
