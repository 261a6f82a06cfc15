#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, redirect, Client, Response};

use team_panel::config::{AppConfig, BackendKind};
use team_panel::server::{serve, AppState};
use team_panel::store::MemoryBackend;

pub const PASSWORD: &str = "secret123";

static TRACING: Once = Once::new();

/// Server logs go to the test output; `RUST_LOG` overrides the level
fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A router served on a free local port, backed by the in-memory store
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub backend: Arc<MemoryBackend>,
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.backend.kind = BackendKind::Memory;
    config.backend.service_role_key = Some("service-role".into());
    config
}

impl TestServer {
    pub async fn spawn() -> Result<Self> {
        Self::spawn_with(test_config(), Arc::new(MemoryBackend::new())).await
    }

    pub async fn spawn_with(mut config: AppConfig, backend: Arc<MemoryBackend>) -> Result<Self> {
        init_tracing();
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);
        config.api.port = port;
        config.api.site_url = format!("{}/", base_url);

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .context("failed to bind test listener")?;
        let state = AppState::with_backends(config, backend.clone(), backend.clone());
        tokio::spawn(async move {
            if let Err(err) = serve(listener, state).await {
                eprintln!("test server stopped: {}", err);
            }
        });

        Ok(Self { port, base_url, backend })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Registers `email` with the shared test password
    pub async fn user(&self, email: &str) -> Result<()> {
        self.backend.register_user(email, PASSWORD).await?;
        Ok(())
    }

    /// Registers and signs in `email`, returning a client holding its cookies
    pub async fn signed_in(&self, email: &str) -> Result<Client> {
        self.user(email).await?;
        let client = browser()?;
        let res = client
            .post(self.url("/login"))
            .form(&[("email", email), ("password", PASSWORD)])
            .send()
            .await?;
        anyhow::ensure!(res.status().is_redirection(), "login failed: HTTP {}", res.status());
        Ok(client)
    }
}

/// Cookie-keeping client that does not follow redirects
pub fn browser() -> Result<Client> {
    Ok(Client::builder()
        .cookie_store(true)
        .redirect(redirect::Policy::none())
        .timeout(Duration::from_secs(10))
        .build()?)
}

pub fn location(res: &Response) -> Option<&str> {
    res.headers().get(header::LOCATION).and_then(|v| v.to_str().ok())
}

pub fn set_cookies(res: &Response) -> Vec<String> {
    res.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// Reads the `data` of a success envelope
pub async fn data(res: Response) -> Result<serde_json::Value> {
    let body: serde_json::Value = res.json().await?;
    anyhow::ensure!(body["success"] == true, "not a success envelope: {}", body);
    Ok(body["data"].clone())
}
