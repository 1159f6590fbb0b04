//! Identity service contract.
//!
//! The gate only ever asks one question: "who is the current user for these
//! cookies?". The answer may carry refreshed cookies that must reach both the
//! downstream handler and the browser.

use serde::{Deserialize, Serialize};
use std::{future::Future, time::Duration};
use thiserror::Error;

use crate::gate::cookies::{CookieJar, CookieUpdate};

pub mod credentials;
pub mod remote;

pub use credentials::CredentialCookies;
pub use remote::RemoteIdentity;

/// Authenticated user as reported by the identity service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("no session credential presented")]
    MissingCredential,
    #[error("credential rejected by identity service (status {status})")]
    Rejected { status: u16 },
    #[error("identity service unavailable (status {status})")]
    Unavailable { status: u16 },
    #[error("identity check timed out after {0:?}")]
    Timeout(Duration),
    #[error("identity service transport error: {0}")]
    Transport(String),
    #[error("invalid identity service payload: {0}")]
    Payload(String),
}

/// Result of a single identity lookup. Never cached across requests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Authentication {
    pub user: Option<User>,
    pub error: Option<IdentityError>,
    /// Cookies to set, in the order the identity service issued them.
    pub refreshed: Vec<CookieUpdate>,
}

impl Authentication {
    #[must_use]
    pub fn user(user: User) -> Self {
        Self {
            user: Some(user),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failed(error: IdentityError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_refreshed(mut self, refreshed: Vec<CookieUpdate>) -> Self {
        self.refreshed = refreshed;
        self
    }

    /// A user is present and no error was reported.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.error.is_none()
    }
}

/// Resolves the current user for a set of request cookies.
pub trait IdentityService: Send + Sync + 'static {
    fn current_user(&self, cookies: &CookieJar) -> impl Future<Output = Authentication> + Send;
}
