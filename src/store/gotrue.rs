use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{AuthBackend, RemoteSession, RemoteUser, RetryPolicy, SignUp, SignUpOutcome, StoreError};
use crate::config::AppConfig;

/// Auth service of the hosted backend, spoken to over its REST API
pub struct GoTrueAuth {
    client: Client,
    base: String,
    anon_key: String,
    service_role_key: Option<String>,
    policy: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct UserBody {
    id: Uuid,
    email: Option<String>,
}

impl From<UserBody> for RemoteUser {
    fn from(body: UserBody) -> Self {
        RemoteUser {
            id: body.id,
            email: body.email,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionBody {
    access_token: String,
    refresh_token: String,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: UserBody,
}

impl From<SessionBody> for RemoteSession {
    fn from(body: SessionBody) -> Self {
        let now = Utc::now();
        let expires_at = body
            .expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .or_else(|| body.expires_in.map(|secs| now + Duration::seconds(secs)))
            .unwrap_or(now);
        RemoteSession {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            issued_at: now,
            expires_at,
            user: body.user.into(),
        }
    }
}

impl GoTrueAuth {
    pub fn new(config: &AppConfig) -> Result<Self, StoreError> {
        let url = config
            .backend
            .url
            .as_deref()
            .ok_or(StoreError::ConfigMissing("PANEL_BACKEND_URL"))?;
        let anon_key = config
            .backend
            .anon_key
            .clone()
            .ok_or(StoreError::ConfigMissing("PANEL_ANON_KEY"))?;
        let client = Client::builder()
            .timeout(config.remote_timeout())
            .build()
            .map_err(|e| StoreError::Remote(e.to_string()))?;
        Ok(Self {
            client,
            base: format!("{}/auth/v1", url.trim_end_matches('/')),
            anon_key,
            service_role_key: config.backend.service_role_key.clone(),
            policy: RetryPolicy::from(&config.remote),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base, path))
            .header("apikey", &self.anon_key)
    }

    fn authed(&self, method: Method, path: &str, access_token: &str) -> RequestBuilder {
        self.request(method, path).bearer_auth(access_token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        request.send().await.map_err(|err| self.map_transport(err))
    }

    fn map_transport(&self, err: reqwest::Error) -> StoreError {
        if err.is_timeout() {
            StoreError::Timeout(self.policy.timeout)
        } else if err.is_connect() || err.is_request() {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Remote(err.to_string())
        }
    }

    async fn session_grant(&self, grant: &str, body: Value) -> Result<Response, StoreError> {
        let request = self
            .request(Method::POST, "/token")
            .query(&[("grant_type", grant)])
            .json(&body);
        self.policy.once(self.send(request)).await
    }
}

/// Reads the message out of an auth-service error body
async fn error_from(response: Response) -> StoreError {
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    let message = ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| status.to_string());

    if status.is_server_error() {
        StoreError::Unavailable(message)
    } else if status == StatusCode::NOT_FOUND {
        StoreError::NotFound(message)
    } else {
        StoreError::Rejected(message)
    }
}

async fn parse<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, StoreError> {
    if !response.status().is_success() {
        return Err(error_from(response).await);
    }
    response.json::<T>().await.map_err(|e| StoreError::Remote(e.to_string()))
}

async fn expect_success(response: Response) -> Result<(), StoreError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(error_from(response).await)
    }
}

#[async_trait]
impl AuthBackend for GoTrueAuth {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<RemoteSession, StoreError> {
        let response = self
            .session_grant("password", json!({ "email": email, "password": password }))
            .await?;
        parse::<SessionBody>(response).await.map(Into::into)
    }

    async fn sign_up(&self, request: SignUp) -> Result<SignUpOutcome, StoreError> {
        let mut builder = self.request(Method::POST, "/signup").json(&json!({
            "email": request.email,
            "password": request.password,
            "data": { "username": request.username, "full_name": request.full_name },
        }));
        if let Some(redirect) = &request.email_redirect_to {
            builder = builder.query(&[("redirect_to", redirect)]);
        }
        let response = self.policy.once(self.send(builder)).await?;
        let body: Value = parse(response).await?;

        // With confirmations on, the service answers with the bare user
        if body.get("access_token").is_some() {
            let session: SessionBody =
                serde_json::from_value(body).map_err(|e| StoreError::Remote(e.to_string()))?;
            Ok(SignUpOutcome::SignedIn(session.into()))
        } else {
            let user_value = body.get("user").cloned().unwrap_or(body);
            let user: UserBody =
                serde_json::from_value(user_value).map_err(|e| StoreError::Remote(e.to_string()))?;
            Ok(SignUpOutcome::ConfirmationSent(user.into()))
        }
    }

    async fn get_user(&self, access_token: &str) -> Result<Option<RemoteUser>, StoreError> {
        self.policy
            .read(|| async move {
                let response = self.send(self.authed(Method::GET, "/user", access_token)).await?;
                match response.status() {
                    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
                    _ => parse::<UserBody>(response).await.map(|u| Some(u.into())),
                }
            })
            .await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Option<RemoteSession>, StoreError> {
        let response = self
            .session_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await?;
        match response.status() {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::debug!("Auth service rejected refresh token");
                Ok(None)
            }
            _ => parse::<SessionBody>(response).await.map(|s| Some(s.into())),
        }
    }

    async fn exchange_code_for_session(&self, code: &str) -> Result<RemoteSession, StoreError> {
        let response = self.session_grant("pkce", json!({ "auth_code": code })).await?;
        parse::<SessionBody>(response).await.map(Into::into)
    }

    async fn reset_password_email(&self, email: &str, redirect_to: &str) -> Result<(), StoreError> {
        let request = self
            .request(Method::POST, "/recover")
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({ "email": email }));
        let response = self.policy.once(self.send(request)).await?;
        expect_success(response).await
    }

    async fn update_password(&self, access_token: &str, new_password: &str) -> Result<(), StoreError> {
        let request = self
            .authed(Method::PUT, "/user", access_token)
            .json(&json!({ "password": new_password }));
        let response = self.policy.once(self.send(request)).await?;
        expect_success(response).await
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), StoreError> {
        let request = self.authed(Method::POST, "/logout", access_token);
        let response = self.policy.once(self.send(request)).await?;
        match response.status() {
            // Already gone
            StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => Ok(()),
            _ => expect_success(response).await,
        }
    }

    async fn admin_delete_user(&self, user_id: Uuid) -> Result<(), StoreError> {
        let key = self
            .service_role_key
            .as_deref()
            .ok_or(StoreError::ConfigMissing("PANEL_SERVICE_ROLE_KEY"))?;
        let request = self
            .client
            .delete(format!("{}/admin/users/{}", self.base, user_id))
            .header("apikey", key)
            .bearer_auth(key);
        let response = self.policy.once(self.send(request)).await?;
        expect_success(response).await
    }
}
