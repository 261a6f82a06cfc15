mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

use common::{browser, data, location, set_cookies, test_config, TestServer, PASSWORD};
use team_panel::store::MemoryBackend;

#[tokio::test]
async fn signup_signs_the_user_in() -> Result<()> {
    let server = TestServer::spawn().await?;
    let client = browser()?;

    let res = client
        .post(server.url("/signup"))
        .form(&[
            ("email", "ada@example.com"),
            ("password", PASSWORD),
            ("username", "ada"),
            ("full_name", "Ada Lovelace"),
        ])
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), Some("/app"));

    let home = data(client.get(server.url("/app")).send().await?).await?;
    assert_eq!(home["user"]["email"], "ada@example.com");
    Ok(())
}

#[tokio::test]
async fn signup_rejects_short_and_duplicate_passwords() -> Result<()> {
    let server = TestServer::spawn().await?;
    server.user("ada@example.com").await?;
    let client = browser()?;

    let res = client
        .post(server.url("/signup"))
        .form(&[("email", "bob@example.com"), ("password", "123")])
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(server.url("/signup"))
        .form(&[("email", "ada@example.com"), ("password", PASSWORD)])
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert_eq!(body["error"], "This email address is already registered. Please sign in.");
    Ok(())
}

#[tokio::test]
async fn callback_exchanges_the_code_and_follows_next() -> Result<()> {
    let server = TestServer::spawn().await?;
    let user = server.backend.register_user("ada@example.com", PASSWORD).await?;
    let code = server.backend.issue_auth_code(user.id).await;
    let client = browser()?;

    let res = client
        .get(server.url(&format!("/auth/callback?code={}&next=/app/settings", code)))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), Some("/app/settings"));
    assert!(set_cookies(&res).iter().any(|c| c.starts_with("panel-access-token=")));

    let settings = data(client.get(server.url("/app/settings")).send().await?).await?;
    assert_eq!(settings["email"], "ada@example.com");
    assert_eq!(settings["delete_confirmation"], "DELETE");
    Ok(())
}

#[tokio::test]
async fn callback_without_code_or_with_foreign_next_stays_on_site() -> Result<()> {
    let server = TestServer::spawn().await?;
    let client = browser()?;

    let res = client
        .get(server.url("/auth/callback?next=//evil.example/steal"))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&res), Some("/app"));

    let res = client.get(server.url("/auth/callback?code=unknown")).send().await?;
    assert!(res.status().is_redirection());
    assert!(set_cookies(&res).is_empty());
    Ok(())
}

#[tokio::test]
async fn password_reset_link_leads_to_a_new_password() -> Result<()> {
    let server = TestServer::spawn().await?;
    let client = server.signed_in("ada@example.com").await?;

    let res = client.post(server.url("/app/settings/password-reset")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    let outbox = server.backend.outbox().await;
    assert_eq!(outbox.len(), 1);
    let link = outbox[0].1.clone();
    assert!(link.starts_with(&server.url("/auth/callback?next=/auth/update-password&code=")), "{}", link);

    // Following the link from a fresh browser
    let reset = browser()?;
    let res = reset.get(&link).send().await?;
    assert_eq!(location(&res), Some("/auth/update-password"));

    let res = reset
        .post(server.url("/auth/update-password"))
        .form(&[("password", "new-secret")])
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let res = browser()?
        .post(server.url("/login"))
        .form(&[("email", "ada@example.com"), ("password", "new-secret")])
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    Ok(())
}

#[tokio::test]
async fn update_password_needs_a_session() -> Result<()> {
    let server = TestServer::spawn().await?;
    let res = browser()?
        .post(server.url("/auth/update-password"))
        .form(&[("password", "new-secret")])
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn account_deletion_needs_the_confirmation_word() -> Result<()> {
    let server = TestServer::spawn().await?;
    let client = server.signed_in("ada@example.com").await?;
    client
        .post(server.url("/app/groups"))
        .json(&json!({ "name": "Design" }))
        .send()
        .await?;

    let res = client
        .delete(server.url("/app/settings/account"))
        .json(&json!({ "confirmation": "delete" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .delete(server.url("/app/settings/account"))
        .json(&json!({ "confirmation": "DELETE" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(data(res).await?["deleted"], true);
    assert_eq!(server.backend.group_count().await, 0);

    let res = client.get(server.url("/app")).send().await?;
    assert_eq!(location(&res), Some("/login"));

    let res = browser()?
        .post(server.url("/login"))
        .form(&[("email", "ada@example.com"), ("password", PASSWORD)])
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn account_deletion_without_service_key_is_a_configuration_error() -> Result<()> {
    let mut config = test_config();
    config.backend.service_role_key = None;
    let server = TestServer::spawn_with(config, std::sync::Arc::new(MemoryBackend::new())).await?;
    let client = server.signed_in("ada@example.com").await?;

    let res = client
        .delete(server.url("/app/settings/account"))
        .json(&json!({ "confirmation": "DELETE" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await?;
    assert_eq!(body["code"], "CONFIGURATION_MISSING");
    assert_eq!(body["error"], "server configuration error");
    Ok(())
}
