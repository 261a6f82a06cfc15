use async_trait::async_trait;
use reqwest::{header, redirect, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use super::remote::{ClientError, Remote};
use crate::auth::{Identity, LOGIN_PATH};
use crate::config::AppConfig;
use crate::services::groups::{GroupOverview, GroupSettings};
use crate::services::projects::ProjectBoard;
use crate::store::models::{Comment, CommentWithAuthor, Group, GroupMembership, Project, Task};
use crate::types::TaskStatus;

/// Talks to a running panel service over HTTP.
///
/// Credential cookies live in the client's cookie store, so the service's
/// cookie rotation is picked up on every response. Redirects are not
/// followed: a redirect to the login page means the session is gone.
pub struct HttpRemote {
    client: Client,
    base: Url,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl HttpRemote {
    /// Client for the site configured in `config`. Fails with the same
    /// configuration errors the server refuses to start with.
    pub fn connect(config: &AppConfig) -> Result<Self, ClientError> {
        config.validate()?;
        Self::new(&config.api.site_url, config.remote_timeout())
    }

    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let mut base = Url::parse(base_url).map_err(|e| ClientError::Transport(format!("{}: {}", base_url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .cookie_store(true)
            .redirect(redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self { client, base })
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::Transport(format!("{}: {}", path, e)))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        Ok(self.client.request(method, self.url(path)?))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        request.send().await.map_err(|err| {
            if err.is_timeout() {
                ClientError::Transport("request timed out".to_string())
            } else {
                ClientError::Transport(err.to_string())
            }
        })
    }

    /// Sends `request` and turns anything but a 2xx into an error
    async fn checked(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let response = self.send(request).await?;
        let status = response.status();

        if status.is_redirection() {
            let location = location(&response).unwrap_or_default();
            if is_login_redirect(&location) {
                return Err(ClientError::Unauthenticated);
            }
            return Err(ClientError::Decode(format!("unexpected redirect to '{}'", location)));
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthenticated);
        }
        if !status.is_success() {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                code: body.code.unwrap_or_else(|| "UNKNOWN".to_string()),
                message: body.error.unwrap_or_else(|| status.to_string()),
            });
        }
        Ok(response)
    }

    /// Unwraps the `{"success": true, "data": ...}` envelope
    async fn data<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = self.checked(request).await?;
        let envelope: Envelope<T> = response.json().await.map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(envelope.data)
    }

    async fn empty(&self, request: RequestBuilder) -> Result<(), ClientError> {
        self.checked(request).await.map(|_| ())
    }
}

fn location(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn is_login_redirect(location: &str) -> bool {
    let path = Url::parse(location)
        .map(|url| url.path().to_string())
        .unwrap_or_else(|_| location.split('?').next().unwrap_or_default().to_string());
    path == LOGIN_PATH || path.starts_with(&format!("{}/", LOGIN_PATH))
}

#[async_trait]
impl Remote for HttpRemote {
    async fn session(&self) -> Result<Option<Identity>, ClientError> {
        let home: Value = match self.data(self.request(Method::GET, "/app")?).await {
            Ok(home) => home,
            Err(ClientError::Unauthenticated) => return Ok(None),
            Err(err) => return Err(err),
        };
        let user = home.get("user").cloned().unwrap_or(Value::Null);
        serde_json::from_value(user)
            .map(Some)
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, ClientError> {
        let request = self
            .request(Method::POST, LOGIN_PATH)?
            .form(&[("email", email), ("password", password)]);
        let response = self.send(request).await?;
        let status = response.status();
        if !status.is_redirection() && !status.is_success() {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                code: body.code.unwrap_or_else(|| "UNKNOWN".to_string()),
                message: body.error.unwrap_or_else(|| status.to_string()),
            });
        }
        self.session().await?.ok_or(ClientError::Unauthenticated)
    }

    async fn sign_out(&self) -> Result<(), ClientError> {
        let response = self.send(self.request(Method::POST, "/app/logout")?).await?;
        let status = response.status();
        if status.is_redirection() || status.is_success() || status == StatusCode::UNAUTHORIZED {
            Ok(())
        } else {
            Err(ClientError::Api {
                status: status.as_u16(),
                code: "UNKNOWN".to_string(),
                message: status.to_string(),
            })
        }
    }

    async fn list_groups(&self) -> Result<Vec<GroupMembership>, ClientError> {
        let home: Value = self.data(self.request(Method::GET, "/app")?).await?;
        let groups = home.get("groups").cloned().unwrap_or_else(|| json!([]));
        serde_json::from_value(groups).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn create_group(&self, name: &str) -> Result<Group, ClientError> {
        let request = self.request(Method::POST, "/app/groups")?.json(&json!({ "name": name }));
        self.data(request).await
    }

    async fn join_group(&self, invite_code: &str) -> Result<Group, ClientError> {
        let request = self
            .request(Method::POST, "/app/groups/join")?
            .json(&json!({ "invite_code": invite_code }));
        self.data(request).await
    }

    async fn group_overview(&self, group_id: Uuid) -> Result<GroupOverview, ClientError> {
        self.data(self.request(Method::GET, &format!("/app/groups/{}", group_id))?)
            .await
    }

    async fn group_settings(&self, group_id: Uuid) -> Result<GroupSettings, ClientError> {
        self.data(self.request(Method::GET, &format!("/app/groups/{}/settings", group_id))?)
            .await
    }

    async fn delete_group(&self, group_id: Uuid, confirmation: &str) -> Result<(), ClientError> {
        let request = self
            .request(Method::DELETE, &format!("/app/groups/{}", group_id))?
            .json(&json!({ "confirmation": confirmation }));
        self.empty(request).await
    }

    async fn create_project(&self, group_id: Uuid, name: &str) -> Result<Project, ClientError> {
        let request = self
            .request(Method::POST, &format!("/app/groups/{}/projects", group_id))?
            .json(&json!({ "name": name }));
        self.data(request).await
    }

    async fn project_board(&self, project_id: Uuid) -> Result<ProjectBoard, ClientError> {
        self.data(self.request(Method::GET, &format!("/app/projects/{}", project_id))?)
            .await
    }

    async fn add_task(&self, project_id: Uuid, title: &str) -> Result<Task, ClientError> {
        let request = self
            .request(Method::POST, &format!("/app/projects/{}/tasks", project_id))?
            .json(&json!({ "title": title }));
        self.data(request).await
    }

    async fn update_task_status(&self, task_id: Uuid, status: TaskStatus) -> Result<Task, ClientError> {
        let request = self
            .request(Method::PATCH, &format!("/app/tasks/{}", task_id))?
            .json(&json!({ "status": status }));
        self.data(request).await
    }

    async fn delete_task(&self, task_id: Uuid) -> Result<(), ClientError> {
        self.empty(self.request(Method::DELETE, &format!("/app/tasks/{}", task_id))?)
            .await
    }

    async fn list_comments(&self, task_id: Uuid) -> Result<Vec<CommentWithAuthor>, ClientError> {
        self.data(self.request(Method::GET, &format!("/app/tasks/{}/comments", task_id))?)
            .await
    }

    async fn add_comment(&self, task_id: Uuid, content: &str) -> Result<Comment, ClientError> {
        let request = self
            .request(Method::POST, &format!("/app/tasks/{}/comments", task_id))?
            .json(&json!({ "content": content }));
        self.data(request).await
    }

    async fn delete_comment(&self, comment_id: Uuid) -> Result<(), ClientError> {
        self.empty(self.request(Method::DELETE, &format!("/app/comments/{}", comment_id))?)
            .await
    }

    async fn request_password_reset(&self) -> Result<(), ClientError> {
        self.empty(self.request(Method::POST, "/app/settings/password-reset")?)
            .await
    }

    async fn delete_account(&self, confirmation: &str) -> Result<(), ClientError> {
        let request = self
            .request(Method::DELETE, "/app/settings/account")?
            .json(&json!({ "confirmation": confirmation }));
        self.empty(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthMode, ConfigError};

    #[test]
    fn connect_fails_fast_without_backend() {
        let config = AppConfig::development();
        assert!(matches!(
            HttpRemote::connect(&config),
            Err(ClientError::Config(ConfigError::Missing("PANEL_BACKEND_URL")))
        ));
    }

    #[test]
    fn connect_in_disabled_mode_uses_site_url() {
        let mut config = AppConfig::development();
        config.session.auth_mode = AuthMode::Disabled;
        let remote = HttpRemote::connect(&config).unwrap();
        assert_eq!(remote.url("/app").unwrap().as_str(), "http://localhost:3000/app");
    }

    #[test]
    fn base_path_is_kept() {
        let remote = HttpRemote::new("https://example.com/panel", Duration::from_secs(1)).unwrap();
        assert_eq!(
            remote.url("/app/groups").unwrap().as_str(),
            "https://example.com/panel/app/groups"
        );
    }

    #[test]
    fn login_redirects_are_recognized() {
        assert!(is_login_redirect("/login"));
        assert!(is_login_redirect("/login?error=expired"));
        assert!(is_login_redirect("http://localhost:3000/login"));
        assert!(!is_login_redirect("/app"));
        assert!(!is_login_redirect("/loginx"));
    }
}
