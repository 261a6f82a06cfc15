use tracing_subscriber::EnvFilter;

use team_panel::config::AppConfig;
use team_panel::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, PANEL_BACKEND_URL, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("team_panel=info,tower_http=info")),
        )
        .with_ansi(!team_panel::is_production!())
        .init();

    // Initialize configuration (this loads the config singleton)
    let config: AppConfig = team_panel::config::config().clone();
    tracing::info!("Starting team panel in {:?} mode", config.environment);

    let state = AppState::from_config(config)?;
    server::run(state).await?;
    Ok(())
}
