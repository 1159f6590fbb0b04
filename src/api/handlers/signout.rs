//! Sign-out: drop the credential cookies and send the browser to the login page.

use axum::{
    extract::Extension,
    http::{
        header::{LOCATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::error;

use crate::identity::CredentialCookies;

/// Settings the sign-out handler needs from the server configuration.
#[derive(Clone, Debug)]
pub struct SignoutConfig {
    pub cookies: CredentialCookies,
    pub login_path: String,
}

// Always clear the cookies, even when the browser presented none.
pub async fn signout(config: Extension<Arc<SignoutConfig>>) -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    for update in config.cookies.clear() {
        match update.to_header_value() {
            Ok(cookie) => {
                headers.append(SET_COOKIE, cookie);
            }
            Err(err) => error!("Failed to build removal cookie {}: {err}", update.name),
        }
    }
    match HeaderValue::from_str(&config.login_path) {
        Ok(location) => {
            headers.insert(LOCATION, location);
        }
        Err(err) => error!("Invalid login path {:?}: {err}", config.login_path),
    }
    (StatusCode::SEE_OTHER, headers)
}
