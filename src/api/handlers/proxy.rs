//! Forward gated requests to the dashboard frontend.

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    extract::{Extension, Request},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
};
use reqwest::{redirect::Policy, Client};
use std::{sync::Arc, time::Duration};
use tracing::{error, instrument};
use url::Url;

use crate::APP_USER_AGENT;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
const PING_TIMEOUT: Duration = Duration::from_secs(2);

// Connection-scoped headers never cross the proxy.
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

// Client-supplied forwarding headers, dropped unless a trusted proxy set them.
const X_FORWARDING: [&str; 3] = ["x-forwarded-for", "x-forwarded-host", "x-forwarded-proto"];

#[derive(Clone, Debug)]
pub struct Upstream {
    client: Client,
    base: Url,
    trust_forwarded_headers: bool,
}

impl Upstream {
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self> {
        let base =
            Url::parse(base_url).with_context(|| format!("Invalid upstream URL: {base_url}"))?;
        if !matches!(base.scheme(), "http" | "https") {
            anyhow::bail!("Upstream URL must be http or https: {base_url}");
        }
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .redirect(Policy::none())
            .build()
            .context("Error creating reqwest client")?;
        Ok(Self {
            client,
            base,
            trust_forwarded_headers: false,
        })
    }

    /// Pass `Forwarded` / `X-Forwarded-*` from the client through unchanged.
    #[must_use]
    pub fn with_trust_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded_headers = trust;
        self
    }

    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Target URL for a request path and query, nested under the base path.
    #[must_use]
    pub fn target(&self, path: &str, query: Option<&str>) -> Url {
        let mut target = self.base.clone();
        let prefix = self.base.path().trim_end_matches('/');
        target.set_path(&format!("{prefix}{path}"));
        target.set_query(query);
        target
    }

    /// Any HTTP answer counts as reachable.
    pub async fn ping(&self) -> bool {
        match self
            .client
            .head(self.base.clone())
            .timeout(PING_TIMEOUT)
            .send()
            .await
        {
            Ok(_) => true,
            Err(err) => {
                error!("Upstream ping failed: {err}");
                false
            }
        }
    }
}

// Headers for the upstream request: hop-by-hop removed, `Host` replaced by
// `X-Forwarded-Host`.
fn upstream_headers(headers: &HeaderMap, trust_forwarded_headers: bool) -> HeaderMap {
    let mut forwarded = forwardable(headers);
    if !trust_forwarded_headers {
        forwarded.remove(header::FORWARDED);
        for name in X_FORWARDING {
            forwarded.remove(name);
        }
    }
    if let Some(host) = forwarded.remove(header::HOST) {
        if !forwarded.contains_key("x-forwarded-host") {
            forwarded.insert(HeaderName::from_static("x-forwarded-host"), host);
        }
    }
    forwarded
}

fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    for name in &HOP_BY_HOP {
        forwarded.remove(name);
    }
    forwarded.remove("keep-alive");
    forwarded
}

// Fallback handler: everything the gate let through that no other route claims.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn proxy(upstream: Extension<Arc<Upstream>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let target = upstream.target(parts.uri.path(), parts.uri.query());

    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(err) => {
            error!("Failed to read request body: {err}");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let headers = upstream_headers(&parts.headers, upstream.trust_forwarded_headers);

    let response = match upstream
        .client
        .request(parts.method, target)
        .headers(headers)
        .body(body)
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => {
            error!("Upstream request failed: {err}");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let status = response.status();
    let headers = forwardable(response.headers());
    let mut relayed = Response::new(Body::from_stream(response.bytes_stream()));
    *relayed.status_mut() = status;
    *relayed.headers_mut() = headers;
    relayed
}
