use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::APP_ROOT;
use crate::handlers::redirect_with_cookies;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::server::AppState;
use crate::services::account;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PasswordForm {
    #[serde(default)]
    pub password: String,
}

/// Only same-site relative paths are followed after the callback
pub fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => path,
        _ => APP_ROOT,
    }
}

/// GET /auth/callback?code=&next= - Landing point of emailed links
///
/// Exchanges the one-time code for a session, sets the cookies and forwards
/// to `next` (default `/app`). Without a code it only forwards.
pub async fn auth_callback(State(state): State<AppState>, Query(query): Query<CallbackQuery>) -> Response {
    let next = safe_next(query.next.as_deref());

    let Some(code) = query.code.as_deref().filter(|c| !c.is_empty()) else {
        return Redirect::temporary(next).into_response();
    };

    match account::exchange_code(&state.panel, code).await {
        Ok(session) => redirect_with_cookies(next, &state.resolver.session_cookies(&session)),
        Err(err) => {
            tracing::warn!("Auth code exchange failed: {}", err);
            Redirect::temporary(next).into_response()
        }
    }
}

/// POST /auth/update-password - Set a new password for the signed-in user
pub async fn update_password(
    State(state): State<AppState>,
    user: AuthUser,
    Form(form): Form<PasswordForm>,
) -> ApiResult<Value> {
    account::update_password(&state.panel, &user.access_token, &form.password).await?;
    tracing::info!("User {} updated their password", user.identity.id);
    Ok(ApiResponse::success(json!({ "updated": true })))
}
