pub mod protected;
pub mod public;

use axum::response::{IntoResponse, Redirect, Response};

use crate::auth::CookieSet;

/// 303 redirect that also installs or clears credential cookies
pub(crate) fn redirect_with_cookies(location: &str, cookies: &CookieSet) -> Response {
    let mut response = Redirect::to(location).into_response();
    cookies.write_response_headers(response.headers_mut());
    response
}
