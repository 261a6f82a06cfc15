use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub backend: BackendConfig,
    pub session: SessionConfig,
    pub remote: RemoteConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

/// Which implementation of the remote data store the server talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    /// Hosted auth API over HTTP plus its Postgres database
    Hosted,
    /// In-process store, for local development and tests
    Memory,
}

/// Whether the session gate enforces redirects at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMode {
    Enforced,
    /// Explicit degraded mode: every request passes through unauthenticated
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub url: Option<String>,
    pub anon_key: Option<String>,
    #[serde(skip_serializing, default)]
    pub service_role_key: Option<String>,
    #[serde(skip_serializing, default)]
    pub jwt_secret: Option<String>,
    #[serde(skip_serializing, default)]
    pub database_url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub auth_mode: AuthMode,
    pub cookie_prefix: String,
    pub secure_cookies: bool,
    pub cookie_max_age_secs: i64,
    pub refresh_margin_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub timeout_ms: u64,
    pub read_retries: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub site_url: String,
    pub enable_request_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub cors_origins: Vec<String>,
    pub min_password_length: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Backend
        if let Ok(v) = env::var("PANEL_BACKEND") {
            self.backend.kind = match v.as_str() {
                "memory" => BackendKind::Memory,
                _ => BackendKind::Hosted,
            };
        }
        self.backend.url = non_empty_var("PANEL_BACKEND_URL").or(self.backend.url);
        self.backend.anon_key = non_empty_var("PANEL_ANON_KEY").or(self.backend.anon_key);
        self.backend.service_role_key =
            non_empty_var("PANEL_SERVICE_ROLE_KEY").or(self.backend.service_role_key);
        self.backend.jwt_secret = non_empty_var("PANEL_JWT_SECRET").or(self.backend.jwt_secret);
        self.backend.database_url = non_empty_var("DATABASE_URL").or(self.backend.database_url);
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.backend.max_connections = v.parse().unwrap_or(self.backend.max_connections);
        }

        // Session
        if let Ok(v) = env::var("PANEL_AUTH_MODE") {
            self.session.auth_mode = match v.as_str() {
                "disabled" | "off" => AuthMode::Disabled,
                _ => AuthMode::Enforced,
            };
        }
        if let Some(v) = non_empty_var("PANEL_COOKIE_PREFIX") {
            self.session.cookie_prefix = v;
        }
        if let Ok(v) = env::var("PANEL_COOKIE_SECURE") {
            self.session.secure_cookies = v.parse().unwrap_or(self.session.secure_cookies);
        }
        if let Ok(v) = env::var("PANEL_COOKIE_MAX_AGE_SECS") {
            self.session.cookie_max_age_secs = v.parse().unwrap_or(self.session.cookie_max_age_secs);
        }
        if let Ok(v) = env::var("PANEL_REFRESH_MARGIN_SECS") {
            self.session.refresh_margin_secs = v.parse().unwrap_or(self.session.refresh_margin_secs);
        }

        // Remote calls
        if let Ok(v) = env::var("PANEL_REMOTE_TIMEOUT_MS") {
            self.remote.timeout_ms = v.parse().unwrap_or(self.remote.timeout_ms);
        }
        if let Ok(v) = env::var("PANEL_READ_RETRIES") {
            self.remote.read_retries = v.parse().unwrap_or(self.remote.read_retries);
        }
        if let Ok(v) = env::var("PANEL_RETRY_BACKOFF_MS") {
            self.remote.retry_backoff_ms = v.parse().unwrap_or(self.remote.retry_backoff_ms);
        }

        // API
        if let Some(port) = env::var("PANEL_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.api.port = port;
        }
        let site = non_empty_var("PANEL_SITE_URL").or_else(|| non_empty_var("PANEL_VERCEL_URL"));
        if site.is_some() {
            self.api.site_url = normalize_site_url(site.as_deref());
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }

        // Security
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        self
    }

    /// Checks that an enforcing deployment can actually reach its backend.
    ///
    /// The server and the client runtime share this check, so a missing
    /// backend URL or key is a startup error everywhere. Skipping enforcement
    /// requires `PANEL_AUTH_MODE=disabled`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.auth_mode == AuthMode::Enforced {
            self.validate_backend()?;
        }
        if self.session.cookie_prefix.is_empty()
            || !self
                .session
                .cookie_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::Invalid {
                var: "PANEL_COOKIE_PREFIX",
                value: self.session.cookie_prefix.clone(),
            });
        }
        Ok(())
    }

    /// Backend settings alone, regardless of auth mode
    pub fn validate_backend(&self) -> Result<(), ConfigError> {
        if self.backend.kind == BackendKind::Hosted {
            if self.backend.url.is_none() {
                return Err(ConfigError::Missing("PANEL_BACKEND_URL"));
            }
            if self.backend.anon_key.is_none() {
                return Err(ConfigError::Missing("PANEL_ANON_KEY"));
            }
            if self.backend.database_url.is_none() {
                return Err(ConfigError::Missing("DATABASE_URL"));
            }
        }
        if let Some(url) = &self.backend.url {
            url::Url::parse(url).map_err(|_| ConfigError::Invalid {
                var: "PANEL_BACKEND_URL",
                value: url.clone(),
            })?;
        }
        Ok(())
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote.timeout_ms)
    }

    /// Link the password-reset email points at; the callback exchanges the
    /// code and forwards to the update-password page.
    pub fn password_reset_redirect(&self) -> String {
        format!("{}auth/callback?next=/auth/update-password", self.api.site_url)
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            backend: BackendConfig {
                kind: BackendKind::Hosted,
                url: None,
                anon_key: None,
                service_role_key: None,
                jwt_secret: None,
                database_url: None,
                max_connections: 10,
            },
            session: SessionConfig {
                auth_mode: AuthMode::Enforced,
                cookie_prefix: "panel".to_string(),
                secure_cookies: false,
                cookie_max_age_secs: 60 * 60 * 24 * 30,
                refresh_margin_secs: 60,
            },
            remote: RemoteConfig {
                timeout_ms: 10_000,
                read_retries: 2,
                retry_backoff_ms: 100,
            },
            api: ApiConfig {
                port: 3000,
                site_url: normalize_site_url(None),
                enable_request_logging: true,
            },
            security: SecurityConfig {
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                min_password_length: 6,
            },
        }
    }

    fn staging() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Staging;
        config.backend.max_connections = 20;
        config.session.secure_cookies = true;
        config.remote.timeout_ms = 5_000;
        config.security.cors_origins = vec!["https://staging.example.com".to_string()];
        config
    }

    fn production() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Production;
        config.backend.max_connections = 50;
        config.session.secure_cookies = true;
        config.remote.timeout_ms = 5_000;
        config.remote.read_retries = 3;
        config.api.enable_request_logging = false;
        config.security.cors_origins = vec!["https://app.example.com".to_string()];
        config
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Site URL used for email links: falls back to localhost, forces a scheme
/// and a trailing slash.
pub fn normalize_site_url(raw: Option<&str>) -> String {
    let mut url = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("http://localhost:3000/")
        .to_string();
    if !url.contains("http") {
        url = format!("https://{}", url);
    }
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_url_gets_scheme_and_trailing_slash() {
        assert_eq!(normalize_site_url(None), "http://localhost:3000/");
        assert_eq!(normalize_site_url(Some("panel.example.com")), "https://panel.example.com/");
        assert_eq!(normalize_site_url(Some("http://localhost:4000")), "http://localhost:4000/");
        assert_eq!(normalize_site_url(Some("   ")), "http://localhost:3000/");
    }

    #[test]
    fn enforced_hosted_config_requires_backend() {
        let config = AppConfig::development();
        assert_eq!(config.validate(), Err(ConfigError::Missing("PANEL_BACKEND_URL")));

        let mut config = AppConfig::development();
        config.backend.url = Some("https://backend.example.com".to_string());
        assert_eq!(config.validate(), Err(ConfigError::Missing("PANEL_ANON_KEY")));
    }

    #[test]
    fn disabled_mode_and_memory_backend_skip_backend_checks() {
        let mut config = AppConfig::development();
        config.session.auth_mode = AuthMode::Disabled;
        assert!(config.validate().is_ok());

        let mut config = AppConfig::development();
        config.backend.kind = BackendKind::Memory;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_cookie_prefix_with_separators() {
        let mut config = AppConfig::development();
        config.backend.kind = BackendKind::Memory;
        config.session.cookie_prefix = "a;b".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn production_profile_uses_secure_cookies() {
        let config = AppConfig::production();
        assert!(config.session.secure_cookies);
        assert_eq!(config.remote.read_retries, 3);
    }

    #[test]
    fn reset_redirect_points_at_callback() {
        let config = AppConfig::development();
        assert_eq!(
            config.password_reset_redirect(),
            "http://localhost:3000/auth/callback?next=/auth/update-password"
        );
    }
}
