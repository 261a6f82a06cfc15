use axum::{extract::State, response::Response};
use serde_json::{json, Value};

use crate::auth::LOGIN_PATH;
use crate::handlers::redirect_with_cookies;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::server::AppState;
use crate::services::{account, groups};

/// GET /app - The signed-in user and their groups
///
/// Expected Output:
/// ```json
/// {
///   "success": true,
///   "data": {
///     "user": { "id": "uuid", "email": "ada@example.com", ... },
///     "groups": [{ "id": "uuid", "name": "Design", "invite_code": "3F9A0C1B", "role": "admin", ... }]
///   }
/// }
/// ```
pub async fn app_home(State(state): State<AppState>, user: AuthUser) -> ApiResult<Value> {
    if let Err(err) = account::ensure_profile(&state.panel, &user.identity).await {
        tracing::warn!("Could not ensure profile for {}: {}", user.identity.id, err);
    }
    let groups = groups::list_for(&state.panel, &user.identity).await?;
    Ok(ApiResponse::success(json!({
        "user": user.identity,
        "groups": groups,
    })))
}

/// POST /app/logout - End the session and clear the credential cookies
pub async fn logout(State(state): State<AppState>, user: AuthUser) -> Response {
    if let Err(err) = account::sign_out(&state.panel, &user.access_token).await {
        tracing::warn!("Remote sign-out failed for {}: {}", user.identity.id, err);
    }
    redirect_with_cookies(LOGIN_PATH, &state.resolver.cleared_cookies())
}
