//! HTTP client for a GoTrue-compatible identity API.
//!
//! Flow Overview: validate the access cookie with `GET /auth/v1/user`. When the
//! access token is missing or rejected and a refresh cookie exists, exchange it via
//! `POST /auth/v1/token?grant_type=refresh_token` and hand back the new cookie pair.
//! A rejected refresh clears both cookies so the browser stops presenting them.

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{
    credentials::{CredentialCookies, TokenGrant},
    Authentication, IdentityError, IdentityService, User,
};
use crate::{gate::cookies::CookieJar, APP_USER_AGENT};

const USER_PATH: &str = "auth/v1/user";
const TOKEN_PATH: &str = "auth/v1/token";
const API_KEY_HEADER: &str = "apikey";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    user: User,
}

#[derive(Clone, Debug)]
pub struct RemoteIdentity {
    client: Client,
    user_url: Url,
    token_url: Url,
    api_key: SecretString,
    cookies: CredentialCookies,
}

impl RemoteIdentity {
    /// # Errors
    /// Returns an error if the base URL cannot be joined or the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        cookies: CredentialCookies,
        timeout: Duration,
    ) -> Result<Self> {
        let mut base =
            Url::parse(base_url).with_context(|| format!("Invalid identity URL: {base_url}"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let user_url = base.join(USER_PATH).context("Failed to build identity user URL")?;
        let mut token_url = base
            .join(TOKEN_PATH)
            .context("Failed to build identity token URL")?;
        token_url
            .query_pairs_mut()
            .append_pair("grant_type", "refresh_token");

        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Error creating reqwest client")?;

        Ok(Self {
            client,
            user_url,
            token_url,
            api_key,
            cookies,
        })
    }

    #[must_use]
    pub fn cookies(&self) -> &CredentialCookies {
        &self.cookies
    }

    #[instrument(skip_all)]
    async fn fetch_user(&self, access_token: &str) -> Result<User, IdentityError> {
        let response = self
            .client
            .get(self.user_url.clone())
            .bearer_auth(access_token)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response.status())?;

        response
            .json::<User>()
            .await
            .map_err(|err| IdentityError::Payload(err.to_string()))
    }

    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &str) -> Result<(User, TokenGrant), IdentityError> {
        let response = self
            .client
            .post(self.token_url.clone())
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response.status())?;

        let body = response
            .json::<TokenResponse>()
            .await
            .map_err(|err| IdentityError::Payload(err.to_string()))?;

        let grant = TokenGrant {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expires_in: body.expires_in,
        };
        Ok((body.user, grant))
    }
}

impl IdentityService for RemoteIdentity {
    async fn current_user(&self, cookies: &CookieJar) -> Authentication {
        let access_token = self.cookies.access_token(cookies);
        let refresh_token = self.cookies.refresh_token(cookies);

        if let Some(access_token) = access_token {
            match self.fetch_user(access_token).await {
                Ok(user) => return Authentication::user(user),
                Err(IdentityError::Rejected { status }) if refresh_token.is_some() => {
                    debug!("Access token rejected ({status}), attempting refresh");
                }
                Err(err) => return Authentication::failed(err),
            }
        }

        let Some(refresh_token) = refresh_token else {
            return Authentication::failed(IdentityError::MissingCredential);
        };

        match self.refresh(refresh_token).await {
            Ok((user, grant)) => Authentication::user(user).with_refreshed(self.cookies.issue(&grant)),
            Err(err @ IdentityError::Rejected { .. }) => {
                warn!("Refresh token rejected: {err}");
                Authentication::failed(err).with_refreshed(self.cookies.clear())
            }
            Err(err) => Authentication::failed(err),
        }
    }
}

fn check_status(status: StatusCode) -> Result<(), IdentityError> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::BAD_REQUEST
        | StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::NOT_FOUND => Err(IdentityError::Rejected {
            status: status.as_u16(),
        }),
        _ => Err(IdentityError::Unavailable {
            status: status.as_u16(),
        }),
    }
}

fn transport_error(err: reqwest::Error) -> IdentityError {
    if err.is_timeout() {
        IdentityError::Transport("request timed out".to_string())
    } else {
        IdentityError::Transport(err.to_string())
    }
}
