use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use super::extract::RequestSession;
use crate::auth::cookies::set_cookie_names;
use crate::auth::{classify, decide, CookieSet, RedirectDecision, Resolution};
use crate::config::AuthMode;
use crate::server::AppState;

/// Request-scoped session gate.
///
/// Resolves the credential cookies, forwards rotated cookies to both the
/// downstream request and the response, then redirects or lets the request
/// through according to the route class.
pub async fn session_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    if state.config.session.auth_mode == AuthMode::Disabled {
        request.extensions_mut().insert(RequestSession::default());
        return next.run(request).await;
    }

    let mut inbound = CookieSet::from_headers(request.headers());
    let resolution = match state.resolver.resolve(&inbound).await {
        Ok(resolution) => resolution,
        Err(err) => {
            tracing::warn!("Session resolution failed, treating request as anonymous: {}", err);
            Resolution::default()
        }
    };

    // Downstream handlers must see the rotated credential, never the stale one
    if !resolution.rotated.is_empty() {
        inbound.apply(&resolution.rotated);
        inbound.write_request_headers(request.headers_mut());
    }

    let class = classify(request.uri().path());
    let decision = decide(resolution.identity.as_ref(), class);
    tracing::debug!(
        "{} {:?} authenticated={} -> {:?}",
        request.uri().path(),
        class,
        resolution.identity.is_some(),
        decision
    );

    let Resolution {
        identity,
        mut rotated,
        access_token,
    } = resolution;

    let mut response = match decision {
        RedirectDecision::Allow => {
            request.extensions_mut().insert(RequestSession { identity, access_token });
            next.run(request).await
        }
        RedirectDecision::RedirectTo(location) => Redirect::temporary(&location).into_response(),
    };

    // A handler that set a credential cookie itself (sign-in, sign-out) wins
    let handler_set = set_cookie_names(response.headers());
    rotated.retain(|cookie| !handler_set.contains(&cookie.name));
    rotated.write_response_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::config::{AppConfig, AuthMode, BackendKind};
    use crate::server::{app, AppState};
    use crate::store::{AuthBackend, MemoryBackend};

    fn state(backend: Arc<MemoryBackend>) -> AppState {
        let mut config = AppConfig::development();
        config.backend.kind = BackendKind::Memory;
        AppState::with_backends(config, backend.clone(), backend)
    }

    async fn cookie_for(backend: &MemoryBackend, email: &str) -> String {
        backend.register_user(email, "secret123").await.unwrap();
        let session = backend.sign_in_with_password(email, "secret123").await.unwrap();
        format!(
            "panel-access-token={}; panel-refresh-token={}",
            session.access_token, session.refresh_token
        )
    }

    fn get(path: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn location(response: &axum::response::Response) -> &str {
        response.headers()[header::LOCATION].to_str().unwrap()
    }

    #[tokio::test]
    async fn anonymous_app_request_goes_to_login() {
        let router = app(state(Arc::new(MemoryBackend::new())));
        let response = router.oneshot(get("/app/groups/x", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), "/login");
    }

    #[tokio::test]
    async fn signed_in_login_request_goes_to_app() {
        let backend = Arc::new(MemoryBackend::new());
        let cookie = cookie_for(&backend, "ada@example.com").await;
        let router = app(state(backend));

        let response = router.oneshot(get("/login", Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), "/app");
    }

    #[tokio::test]
    async fn expiring_access_token_is_rotated_on_the_way_through() {
        let backend = Arc::new(MemoryBackend::with_access_ttl(chrono::Duration::seconds(5)));
        let cookie = cookie_for(&backend, "ada@example.com").await;
        let router = app(state(backend));

        let response = router.oneshot(get("/app", Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let set_cookies: Vec<&str> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        assert!(set_cookies.iter().any(|c| c.starts_with("panel-access-token=")));
        assert!(set_cookies.iter().any(|c| c.starts_with("panel-refresh-token=")));
    }

    #[tokio::test]
    async fn offline_backend_fails_closed() {
        let backend = Arc::new(MemoryBackend::new());
        let cookie = cookie_for(&backend, "ada@example.com").await;
        backend.set_offline(true);
        let router = app(state(backend));

        let response = router.oneshot(get("/app", Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), "/login");
    }

    #[tokio::test]
    async fn disabled_mode_passes_through_without_identity() {
        let backend = Arc::new(MemoryBackend::new());
        let mut config = AppConfig::development();
        config.backend.kind = BackendKind::Memory;
        config.session.auth_mode = AuthMode::Disabled;
        let router = app(AppState::with_backends(config, backend.clone(), backend));

        let response = router.oneshot(get("/app", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
