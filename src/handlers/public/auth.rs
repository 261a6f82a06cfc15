use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Form,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::APP_ROOT;
use crate::error::ApiError;
use crate::handlers::redirect_with_cookies;
use crate::middleware::{ApiResponse, ApiResult};
use crate::server::AppState;
use crate::services::account::{self, SignUpForm};
use crate::store::SignUpOutcome;

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub error: Option<String>,
}

/// GET /login - Describes the sign-in form
pub async fn login_get(Query(query): Query<PageQuery>) -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({
        "page": "login",
        "action": "/login",
        "fields": ["email", "password"],
        "signup": "/signup",
        "error": query.error.as_deref().map(account::friendly_auth_message),
    })))
}

/// POST /login - Sign in with email and password
///
/// On success the session cookies are set and the browser is sent to `/app`
/// with a 303. Known auth errors come back as readable 400 messages.
pub async fn login_post(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Result<Response, ApiError> {
    let session = account::sign_in(&state.panel, &form.email, &form.password).await?;
    let cookies = state.resolver.session_cookies(&session);
    Ok(redirect_with_cookies(APP_ROOT, &cookies))
}

/// GET /signup - Describes the sign-up form
pub async fn signup_get(State(state): State<AppState>) -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({
        "page": "signup",
        "action": "/signup",
        "fields": ["email", "password", "username", "full_name"],
        "login": "/login",
        "min_password_length": state.config.security.min_password_length,
    })))
}

/// POST /signup - Create an account
///
/// Expected Output (confirmation required):
/// ```json
/// { "success": true, "data": { "confirmation_sent": true, "email": "ada@example.com" } }
/// ```
/// When the backend signs the user in right away, the response is a 303 to
/// `/app` carrying the session cookies instead.
pub async fn signup_post(State(state): State<AppState>, Form(form): Form<SignUpForm>) -> Result<Response, ApiError> {
    let email = form.email.trim().to_string();
    match account::sign_up(&state.panel, form).await? {
        SignUpOutcome::SignedIn(session) => {
            let cookies = state.resolver.session_cookies(&session);
            Ok(redirect_with_cookies(APP_ROOT, &cookies))
        }
        SignUpOutcome::ConfirmationSent(_) => Ok(ApiResponse::success(json!({
            "confirmation_sent": true,
            "email": email,
        }))
        .into_response()),
    }
}
