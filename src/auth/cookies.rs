use axum::http::{header, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::store::RemoteSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Attributes attached when a cookie is written to a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub path: String,
    pub max_age: Option<i64>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            max_age: None,
            http_only: true,
            secure: false,
            same_site: SameSite::Lax,
        }
    }
}

impl CookieOptions {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            max_age: Some(config.cookie_max_age_secs),
            secure: config.secure_cookies,
            ..Self::default()
        }
    }

    /// Same attributes, but instructs the browser to drop the cookie
    pub fn expired(&self) -> Self {
        Self {
            max_age: Some(0),
            ..self.clone()
        }
    }
}

/// One name/value/attributes triple of the credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialCookie {
    pub name: String,
    pub value: String,
    pub options: CookieOptions,
}

impl CredentialCookie {
    pub fn is_removal(&self) -> bool {
        self.options.max_age == Some(0)
    }

    /// Renders the `Set-Cookie` header value
    pub fn to_set_cookie(&self) -> String {
        let mut out = format!("{}={}; Path={}", self.name, self.value, self.options.path);
        if let Some(max_age) = self.options.max_age {
            out.push_str(&format!("; Max-Age={}", max_age));
        }
        if self.options.http_only {
            out.push_str("; HttpOnly");
        }
        if self.options.secure {
            out.push_str("; Secure");
        }
        out.push_str("; SameSite=");
        out.push_str(self.options.same_site.as_str());
        out
    }
}

/// Names of the two credential cookies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieNames {
    pub access: String,
    pub refresh: String,
}

impl CookieNames {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            access: format!("{}-access-token", prefix),
            refresh: format!("{}-refresh-token", prefix),
        }
    }
}

/// Ordered cookie set of one request/response exchange.
///
/// Setting a name that is already present replaces it in place, so the order
/// seen by the browser and by downstream readers stays stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieSet {
    cookies: Vec<CredentialCookie>,
}

impl CookieSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `Cookie` request header (`a=1; b=2`)
    pub fn parse(header: &str) -> Self {
        let mut set = Self::new();
        for pair in header.split(';') {
            let pair = pair.trim();
            if let Some((name, value)) = pair.split_once('=') {
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                set.set(CredentialCookie {
                    name: name.to_string(),
                    value: value.trim().trim_matches('"').to_string(),
                    options: CookieOptions::default(),
                });
            }
        }
        set
    }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut set = Self::new();
        for value in headers.get_all(header::COOKIE) {
            if let Ok(raw) = value.to_str() {
                for cookie in Self::parse(raw).cookies {
                    set.set(cookie);
                }
            }
        }
        set
    }

    /// Fresh access/refresh pair for a newly issued session
    pub fn credential_pair(names: &CookieNames, session: &RemoteSession, options: &CookieOptions) -> Self {
        let mut set = Self::new();
        set.set(CredentialCookie {
            name: names.access.clone(),
            value: session.access_token.clone(),
            options: options.clone(),
        });
        set.set(CredentialCookie {
            name: names.refresh.clone(),
            value: session.refresh_token.clone(),
            options: options.clone(),
        });
        set
    }

    /// Removal instructions for both credential cookies
    pub fn cleared(names: &CookieNames, options: &CookieOptions) -> Self {
        let expired = options.expired();
        let mut set = Self::new();
        for name in [&names.access, &names.refresh] {
            set.set(CredentialCookie {
                name: name.clone(),
                value: String::new(),
                options: expired.clone(),
            });
        }
        set
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|c| c.name == name && !c.is_removal())
            .map(|c| c.value.as_str())
            .filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, cookie: CredentialCookie) {
        match self.cookies.iter_mut().find(|c| c.name == cookie.name) {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.cookies.retain(|c| c.name != name);
    }

    /// Applies rotated cookies onto this (inbound) view: replaced values are
    /// overwritten, removals drop the cookie.
    pub fn apply(&mut self, rotated: &CookieSet) {
        for cookie in &rotated.cookies {
            if cookie.is_removal() {
                self.remove(&cookie.name);
            } else {
                self.set(cookie.clone());
            }
        }
    }

    pub fn retain(&mut self, keep: impl FnMut(&CredentialCookie) -> bool) {
        self.cookies.retain(keep);
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CredentialCookie> {
        self.cookies.iter()
    }

    /// Renders the set as a `Cookie` request header value
    pub fn to_cookie_header(&self) -> String {
        self.cookies
            .iter()
            .filter(|c| !c.is_removal())
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Replaces the `Cookie` header(s) of a request with this set
    pub fn write_request_headers(&self, headers: &mut HeaderMap) {
        headers.remove(header::COOKIE);
        let rendered = self.to_cookie_header();
        if rendered.is_empty() {
            return;
        }
        if let Ok(value) = HeaderValue::from_str(&rendered) {
            headers.insert(header::COOKIE, value);
        }
    }

    /// Appends one `Set-Cookie` header per cookie
    pub fn write_response_headers(&self, headers: &mut HeaderMap) {
        for cookie in &self.cookies {
            match HeaderValue::from_str(&cookie.to_set_cookie()) {
                Ok(value) => {
                    headers.append(header::SET_COOKIE, value);
                }
                Err(_) => tracing::warn!("Dropping cookie '{}' with a non-header-safe value", cookie.name),
            }
        }
    }
}

/// Names of the cookies a response already sets
pub fn set_cookie_names(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|raw| raw.split_once('=').map(|(name, _)| name.trim().to_string()))
        .collect()
}
