use serde::Serialize;

use super::identity::Identity;
use super::routes::{RouteClass, APP_ROOT, LOGIN_PATH};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RedirectDecision {
    Allow,
    RedirectTo(String),
}

/// Combines the resolved identity with the route class.
///
/// Anonymous requests to protected routes go to the login page, signed-in
/// requests to login/signup go to the app root, everything else passes.
pub fn decide(identity: Option<&Identity>, class: RouteClass) -> RedirectDecision {
    match (identity, class) {
        (None, RouteClass::Protected) => RedirectDecision::RedirectTo(LOGIN_PATH.to_string()),
        (Some(_), RouteClass::AuthEntry) => RedirectDecision::RedirectTo(APP_ROOT.to_string()),
        _ => RedirectDecision::Allow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn identity() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            email: Some("ada@example.com".into()),
            issued_at: Utc::now(),
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn full_decision_table() {
        let who = identity();
        let cases = [
            (None, RouteClass::Public, RedirectDecision::Allow),
            (None, RouteClass::AuthEntry, RedirectDecision::Allow),
            (None, RouteClass::Protected, RedirectDecision::RedirectTo("/login".into())),
            (Some(&who), RouteClass::Public, RedirectDecision::Allow),
            (Some(&who), RouteClass::AuthEntry, RedirectDecision::RedirectTo("/app".into())),
            (Some(&who), RouteClass::Protected, RedirectDecision::Allow),
        ];
        for (identity, class, expected) in cases {
            assert_eq!(decide(identity, class), expected, "{:?} / {:?}", identity.is_some(), class);
        }
    }
}
