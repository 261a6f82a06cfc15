mod common;

use anyhow::Result;
use reqwest::StatusCode;

use common::{browser, data, location, TestServer};

#[tokio::test]
async fn health_and_root_are_public() -> Result<()> {
    let server = TestServer::spawn().await?;
    let client = browser()?;

    let res = client.get(server.url("/health")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(data(res).await?["store"], "ok");

    let res = client.get(server.url("/")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(data(res).await?["name"], "Team Panel");
    Ok(())
}

#[tokio::test]
async fn health_reports_an_unreachable_store() -> Result<()> {
    let server = TestServer::spawn().await?;
    server.backend.set_offline(true);

    let res = browser()?.get(server.url("/health")).send().await?;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}

#[tokio::test]
async fn anonymous_requests_to_app_paths_redirect_to_login() -> Result<()> {
    let server = TestServer::spawn().await?;
    let client = browser()?;

    for path in ["/app", "/app/settings", "/app/groups/0b7e4c4e-1d59-4d1c-9a47-2b4f0c6a0d11", "/loginx"] {
        let res = client.get(server.url(path)).send().await?;
        assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT, "{}", path);
        assert_eq!(location(&res), Some("/login"), "{}", path);
    }

    // Auth entry pages stay reachable without a session
    let res = client.get(server.url("/login")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let res = client.get(server.url("/signup")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn signed_in_users_skip_the_login_page() -> Result<()> {
    let server = TestServer::spawn().await?;
    let client = server.signed_in("ada@example.com").await?;

    let res = client.get(server.url("/login")).send().await?;
    assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&res), Some("/app"));

    let res = client.get(server.url("/app")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let home = data(res).await?;
    assert_eq!(home["user"]["email"], "ada@example.com");
    assert_eq!(home["groups"], serde_json::json!([]));

    // Pass-through: protected paths are not redirected, unknown ones 404
    let res = client.get(server.url("/app/nowhere")).send().await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn bad_credentials_are_explained() -> Result<()> {
    let server = TestServer::spawn().await?;
    server.user("ada@example.com").await?;

    let res = browser()?
        .post(server.url("/login"))
        .form(&[("email", "ada@example.com"), ("password", "wrong-password")])
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await?;
    assert_eq!(body["error"], "Invalid email or password.");
    assert_eq!(body["code"], "VALIDATION_ERROR");
    Ok(())
}
