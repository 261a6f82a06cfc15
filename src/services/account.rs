//! Sign-in, sign-up, password management and account deletion.

use serde::Deserialize;

use super::{required, Panel, ServiceError};
use crate::auth::Identity;
use crate::store::models::Profile;
use crate::store::{RemoteSession, SignUp, SignUpOutcome};

/// Word a user must type to delete their account
pub const ACCOUNT_DELETE_CONFIRMATION: &str = "DELETE";

#[derive(Debug, Clone, Deserialize)]
pub struct SignUpForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// User-facing text for the auth service's known error messages.
/// Anything unrecognized is shown as is.
pub fn friendly_auth_message(message: &str) -> String {
    match message {
        "User already registered" => "This email address is already registered. Please sign in.",
        "Invalid login credentials" => "Invalid email or password.",
        "Email not confirmed" => "Email address not confirmed. Please check your inbox.",
        "Password should be at least 6 characters" => "Password must be at least 6 characters.",
        "Signup requires a valid password" => "Please enter a valid password.",
        other => other,
    }
    .to_string()
}

fn check_password(panel: &Panel, password: &str) -> Result<(), ServiceError> {
    let min = panel.config.security.min_password_length;
    if password.chars().count() < min {
        return Err(ServiceError::Validation(format!("Password must be at least {} characters.", min)));
    }
    Ok(())
}

fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Makes sure the signed-in user has a profile row; existing names are kept
pub async fn ensure_profile(panel: &Panel, identity: &Identity) -> Result<(), ServiceError> {
    panel
        .store
        .upsert_profile(Profile {
            id: identity.id,
            email: identity.email.clone(),
            username: None,
            full_name: None,
        })
        .await?;
    Ok(())
}

pub async fn sign_in(panel: &Panel, email: &str, password: &str) -> Result<RemoteSession, ServiceError> {
    let email = required(email, "email")?;
    if password.is_empty() {
        return Err(ServiceError::Validation("password is required".into()));
    }
    let session = panel.auth.sign_in_with_password(&email, password).await?;
    tracing::info!("User {} signed in", session.user.id);
    Ok(session)
}

pub async fn sign_up(panel: &Panel, form: SignUpForm) -> Result<SignUpOutcome, ServiceError> {
    let email = required(&form.email, "email")?;
    check_password(panel, &form.password)?;
    let username = optional(form.username);
    let full_name = optional(form.full_name);

    let outcome = panel
        .auth
        .sign_up(SignUp {
            email: email.clone(),
            password: form.password,
            username: username.clone(),
            full_name: full_name.clone(),
            email_redirect_to: Some(format!("{}auth/callback", panel.config.api.site_url)),
        })
        .await?;

    let user = match &outcome {
        SignUpOutcome::SignedIn(session) => &session.user,
        SignUpOutcome::ConfirmationSent(user) => user,
    };
    panel
        .store
        .upsert_profile(Profile {
            id: user.id,
            email: Some(email),
            username,
            full_name,
        })
        .await?;
    tracing::info!("User {} signed up", user.id);
    Ok(outcome)
}

/// Exchanges the one-time code from an emailed link for a session
pub async fn exchange_code(panel: &Panel, code: &str) -> Result<RemoteSession, ServiceError> {
    let code = required(code, "code")?;
    Ok(panel.auth.exchange_code_for_session(&code).await?)
}

pub async fn sign_out(panel: &Panel, access_token: &str) -> Result<(), ServiceError> {
    Ok(panel.auth.sign_out(access_token).await?)
}

/// Emails a reset link that lands on the update-password page
pub async fn request_password_reset(panel: &Panel, email: &str) -> Result<(), ServiceError> {
    let email = required(email, "email")?;
    let redirect = panel.config.password_reset_redirect();
    panel.auth.reset_password_email(&email, &redirect).await?;
    Ok(())
}

pub async fn update_password(panel: &Panel, access_token: &str, new_password: &str) -> Result<(), ServiceError> {
    check_password(panel, new_password)?;
    panel.auth.update_password(access_token, new_password).await?;
    Ok(())
}

/// Deletes the account for good. Needs the typed confirmation word and the
/// server's service-role key.
pub async fn delete_account(panel: &Panel, identity: &Identity, confirmation: &str) -> Result<(), ServiceError> {
    if confirmation.trim() != ACCOUNT_DELETE_CONFIRMATION {
        return Err(ServiceError::Validation(format!(
            "type {} to confirm account deletion",
            ACCOUNT_DELETE_CONFIRMATION
        )));
    }
    if panel.config.backend.service_role_key.is_none() {
        return Err(ServiceError::ConfigurationMissing("PANEL_SERVICE_ROLE_KEY"));
    }
    panel.auth.admin_delete_user(identity.id).await?;
    tracing::warn!("Account {} deleted", identity.id);
    Ok(())
}
