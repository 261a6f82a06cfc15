//! Request-side session handling: who is calling, where they may go.

pub mod claims;
pub mod cookies;
pub mod decision;
pub mod identity;
pub mod resolver;
pub mod routes;

pub use claims::{decode_access_token, encode_access_token, AccessClaims, TokenError};
pub use cookies::{CookieNames, CookieOptions, CookieSet, CredentialCookie, SameSite};
pub use decision::{decide, RedirectDecision};
pub use identity::Identity;
pub use resolver::{Resolution, ResolveError, SessionResolver};
pub use routes::{classify, RouteClass, APP_ROOT, LOGIN_PATH, SIGNUP_PATH};
