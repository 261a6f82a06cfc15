use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::server::AppState;
use crate::services::account;

#[derive(Debug, Deserialize)]
pub struct ConfirmBody {
    #[serde(default)]
    pub confirmation: String,
}

/// GET /app/settings - Account page data
pub async fn show(user: AuthUser) -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({
        "id": user.identity.id,
        "email": user.identity.email,
        "delete_confirmation": account::ACCOUNT_DELETE_CONFIRMATION,
    })))
}

/// POST /app/settings/password-reset - Email a reset link to the signed-in user
pub async fn password_reset(State(state): State<AppState>, user: AuthUser) -> ApiResult<Value> {
    let email = user
        .identity
        .email
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("account has no email address"))?;
    account::request_password_reset(&state.panel, email).await?;
    Ok(ApiResponse::success(json!({ "sent": true })))
}

/// DELETE /app/settings/account - Delete the account and end the session
///
/// The body must carry `{"confirmation": "DELETE"}`.
pub async fn delete_account(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<ConfirmBody>,
) -> Result<Response, ApiError> {
    account::delete_account(&state.panel, &user.identity, &body.confirmation).await?;
    if let Err(err) = account::sign_out(&state.panel, &user.access_token).await {
        tracing::debug!("Sign-out after account deletion: {}", err);
    }
    let mut response = ApiResponse::success(json!({ "deleted": true })).into_response();
    state.resolver.cleared_cookies().write_response_headers(response.headers_mut());
    Ok(response)
}
