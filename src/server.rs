use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::SessionResolver;
use crate::config::{AppConfig, AuthMode, BackendKind, ConfigError};
use crate::error::ApiError;
use crate::handlers::{protected, public};
use crate::middleware::session_middleware;
use crate::services::Panel;
use crate::store::{AuthBackend, DataStore, GoTrueAuth, MemoryBackend, PgStore, StoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cannot set up backend: {0}")]
    Store(#[from] StoreError),

    #[error("Cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Everything a request handler can reach
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub resolver: SessionResolver,
    pub panel: Panel,
}

impl AppState {
    /// Builds the backends `config` asks for.
    ///
    /// An enforcing deployment with incomplete backend configuration is a
    /// startup error; only `PANEL_AUTH_MODE=disabled` runs without one.
    pub fn from_config(config: AppConfig) -> Result<Self, StartupError> {
        let mut kind = config.backend.kind;
        if config.session.auth_mode == AuthMode::Disabled {
            tracing::warn!("Session enforcement is DISABLED: every request passes through unauthenticated");
            if kind == BackendKind::Hosted && config.validate_backend().is_err() {
                tracing::warn!("Hosted backend not configured, using the in-memory store");
                kind = BackendKind::Memory;
            }
        }
        config.validate()?;

        match kind {
            BackendKind::Memory => {
                tracing::info!("Using in-memory backend");
                let backend = Arc::new(MemoryBackend::new());
                Ok(Self::with_backends(config, backend.clone(), backend))
            }
            BackendKind::Hosted => {
                let auth = Arc::new(GoTrueAuth::new(&config)?);
                let store = Arc::new(PgStore::connect(&config)?);
                Ok(Self::with_backends(config, auth, store))
            }
        }
    }

    pub fn with_backends(config: AppConfig, auth: Arc<dyn AuthBackend>, store: Arc<dyn DataStore>) -> Self {
        let config = Arc::new(config);
        let resolver = SessionResolver::new(auth.clone(), &config);
        let panel = Panel::new(store, auth, config.clone());
        Self { config, resolver, panel }
    }
}

pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .merge(auth_public_routes())
        // Protected
        .merge(app_routes())
        .merge(group_routes())
        .merge(work_routes())
        .merge(settings_routes())
        .fallback(not_found)
        // Session gate runs for every request, public ones included
        .layer(from_fn_with_state(state.clone(), session_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn auth_public_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(public::login_get).post(public::login_post))
        .route("/signup", get(public::signup_get).post(public::signup_post))
        .route("/auth/callback", get(public::auth_callback))
        .route("/auth/update-password", post(public::update_password))
}

fn app_routes() -> Router<AppState> {
    use protected::session;

    Router::new()
        .route("/app", get(session::app_home))
        .route("/app/logout", post(session::logout))
}

fn group_routes() -> Router<AppState> {
    use protected::groups;

    Router::new()
        .route("/app/groups", post(groups::create))
        .route("/app/groups/join", post(groups::join))
        .route("/app/groups/:group_id", get(groups::show).delete(groups::delete))
        .route("/app/groups/:group_id/settings", get(groups::settings))
        .route("/app/groups/:group_id/projects", post(groups::create_project))
}

fn work_routes() -> Router<AppState> {
    use protected::{comments, projects, tasks};

    Router::new()
        .route("/app/projects/:project_id", get(projects::board))
        .route("/app/projects/:project_id/tasks", post(projects::add_task))
        .route("/app/tasks/:task_id", patch(tasks::update_status).delete(tasks::delete))
        .route("/app/tasks/:task_id/comments", get(comments::list).post(comments::add))
        .route("/app/comments/:comment_id", axum::routing::delete(comments::delete))
}

fn settings_routes() -> Router<AppState> {
    use protected::settings;

    Router::new()
        .route("/app/settings", get(settings::show))
        .route("/app/settings/password-reset", post(settings::password_reset))
        .route("/app/settings/account", axum::routing::delete(settings::delete_account))
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
}

async fn not_found() -> ApiError {
    ApiError::not_found("no such route")
}

/// Serves `state` on an already bound listener until the process stops
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> Result<(), StartupError> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Team panel listening on http://{}", addr);
    }
    axum::serve(listener, app(state)).await.map_err(StartupError::Serve)
}

/// Binds `0.0.0.0:{port}` from the config and serves
pub async fn run(state: AppState) -> Result<(), StartupError> {
    let addr = format!("0.0.0.0:{}", state.config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;
    serve(listener, state).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enforced_hosted_mode_without_backend_fails_fast() {
        let config = AppConfig::development();
        assert!(matches!(
            AppState::from_config(config),
            Err(StartupError::Config(ConfigError::Missing("PANEL_BACKEND_URL")))
        ));
    }

    #[test]
    fn disabled_mode_starts_without_backend() {
        let mut config = AppConfig::development();
        config.session.auth_mode = AuthMode::Disabled;
        assert!(AppState::from_config(config).is_ok());
    }

    #[test]
    fn memory_mode_needs_no_backend_config() {
        let mut config = AppConfig::development();
        config.backend.kind = BackendKind::Memory;
        assert!(AppState::from_config(config).is_ok());
    }
}
