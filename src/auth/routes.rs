use serde::Serialize;

pub const LOGIN_PATH: &str = "/login";
pub const SIGNUP_PATH: &str = "/signup";
pub const APP_ROOT: &str = "/app";

/// Static classification of a request path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RouteClass {
    /// No session required
    Public,
    /// Login and signup: public, but signed-in users are sent to the app
    AuthEntry,
    /// Requires a session
    Protected,
}

const AUTH_ENTRY_PREFIXES: &[&str] = &[LOGIN_PATH, SIGNUP_PATH];
const PUBLIC_PREFIXES: &[&str] = &["/auth", "/health", "/static"];
const PUBLIC_FILES: &[&str] = &["/favicon.ico", "/robots.txt"];
const ASSET_EXTENSIONS: &[&str] = &[".svg", ".png", ".jpg", ".jpeg", ".gif", ".webp", ".ico", ".css", ".js"];

/// Classifies `path` by prefix, one path segment at a time, so `/login/x`
/// is an auth-entry page while `/loginx` is not.
pub fn classify(path: &str) -> RouteClass {
    let path = normalize(path);

    if path == "/" {
        return RouteClass::Public;
    }
    if AUTH_ENTRY_PREFIXES.iter().any(|prefix| has_segment_prefix(path, prefix)) {
        return RouteClass::AuthEntry;
    }
    if PUBLIC_PREFIXES.iter().any(|prefix| has_segment_prefix(path, prefix))
        || PUBLIC_FILES.contains(&path)
        || is_static_asset(path)
    {
        return RouteClass::Public;
    }
    RouteClass::Protected
}

fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or("");
    if path.is_empty() {
        return "/";
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

fn has_segment_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn is_static_asset(path: &str) -> bool {
    let last = path.rsplit('/').next().unwrap_or("").to_ascii_lowercase();
    ASSET_EXTENSIONS.iter().any(|ext| last.ends_with(ext))
}
