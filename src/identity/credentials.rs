//! Naming and issuing of the session credential cookies.

use crate::gate::cookies::{CookieJar, CookieOptions, CookieUpdate};

const DEFAULT_PREFIX: &str = "sb";
const DEFAULT_SESSION_TTL_SECONDS: i64 = 60 * 60;

/// Tokens granted by the identity service after a sign-in or refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: Option<i64>,
}

/// The access/refresh cookie pair holding a session.
#[derive(Clone, Debug)]
pub struct CredentialCookies {
    access_name: String,
    refresh_name: String,
    options: CookieOptions,
    session_ttl_seconds: i64,
}

impl Default for CredentialCookies {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl CredentialCookies {
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        let prefix = prefix.trim().trim_end_matches('-');
        Self {
            access_name: format!("{prefix}-access-token"),
            refresh_name: format!("{prefix}-refresh-token"),
            options: CookieOptions::default(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.options.secure = secure;
        self
    }

    /// Lifetime of the refresh cookie, and of the access cookie when the grant has no expiry.
    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn access_name(&self) -> &str {
        &self.access_name
    }

    #[must_use]
    pub fn refresh_name(&self) -> &str {
        &self.refresh_name
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn access_token<'a>(&self, jar: &'a CookieJar) -> Option<&'a str> {
        jar.get(&self.access_name).filter(|value| !value.is_empty())
    }

    #[must_use]
    pub fn refresh_token<'a>(&self, jar: &'a CookieJar) -> Option<&'a str> {
        jar.get(&self.refresh_name).filter(|value| !value.is_empty())
    }

    /// Cookies storing a fresh grant: access token first, then refresh token.
    #[must_use]
    pub fn issue(&self, grant: &TokenGrant) -> Vec<CookieUpdate> {
        let access_ttl = grant
            .expires_in
            .filter(|seconds| *seconds > 0)
            .unwrap_or(self.session_ttl_seconds);
        vec![
            CookieUpdate::new(
                self.access_name.clone(),
                grant.access_token.clone(),
                self.options.clone().with_max_age(access_ttl),
            ),
            CookieUpdate::new(
                self.refresh_name.clone(),
                grant.refresh_token.clone(),
                self.options.clone().with_max_age(self.session_ttl_seconds),
            ),
        ]
    }

    /// Cookies expiring both tokens.
    #[must_use]
    pub fn clear(&self) -> Vec<CookieUpdate> {
        vec![
            CookieUpdate::removal(self.access_name.clone(), self.options.clone()),
            CookieUpdate::removal(self.refresh_name.clone(), self.options.clone()),
        ]
    }
}
