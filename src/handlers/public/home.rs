use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::server::AppState;

/// GET / - Service information
pub async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Team Panel",
            "version": version,
            "description": "Groups, projects, tasks and comments behind a cookie session",
            "endpoints": {
                "home": "/ (public)",
                "auth": "/login, /signup, /auth/callback, /auth/update-password (public)",
                "app": "/app (protected)",
                "groups": "/app/groups[/:group_id[/settings|/projects]] (protected)",
                "projects": "/app/projects/:project_id[/tasks] (protected)",
                "tasks": "/app/tasks/:task_id[/comments] (protected)",
                "comments": "/app/comments/:comment_id (protected)",
                "settings": "/app/settings[/password-reset|/account] (protected)",
            }
        }
    }))
}

/// GET /health - Liveness plus a round trip to the data store
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.panel.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "store": "ok"
                }
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "store unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "store_error": e.to_string()
                }
            })),
        ),
    }
}
