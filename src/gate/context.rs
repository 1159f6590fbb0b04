//! Immutable view of the parts of a request the gate cares about.

use axum::http::{HeaderMap, Request};
use url::Url;

use super::cookies::{CookieJar, CookieUpdate};

const HOST: &str = "host";
const CANONICAL_BASE: &str = "http://localhost/";
const FORWARDED_PROTO: &str = "x-forwarded-proto";
const FORWARDED_HOST: &str = "x-forwarded-host";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    path: String,
    query: Option<String>,
    origin: Option<Url>,
    cookies: CookieJar,
}

impl RequestContext {
    #[must_use]
    pub fn new(path: impl Into<String>, cookies: CookieJar) -> Self {
        Self {
            path: canonical_path(&path.into()),
            query: None,
            origin: None,
            cookies,
        }
    }

    /// Capture a request. The origin is only resolved from `Host` and the
    /// `X-Forwarded-*` headers when a trusted proxy sets them; otherwise redirects
    /// stay path-only and the browser resolves them against its own origin.
    #[must_use]
    pub fn from_request<B>(request: &Request<B>, trust_forwarded_headers: bool) -> Self {
        let uri = request.uri();
        let headers = request.headers();
        let origin = if trust_forwarded_headers {
            let authority = uri.authority().map(|authority| authority.as_str());
            request_origin(headers, uri.scheme_str(), authority)
        } else {
            None
        };
        Self {
            path: canonical_path(uri.path()),
            query: uri.query().map(ToString::to_string),
            origin,
            cookies: CookieJar::from_headers(headers),
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Canonical path: dot segments, `%2e` spellings included, are already resolved.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    #[must_use]
    pub fn origin(&self) -> Option<&Url> {
        self.origin.as_ref()
    }

    #[must_use]
    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// The context a downstream handler sees once `updates` are applied.
    #[must_use]
    pub fn with_updates(&self, updates: &[CookieUpdate]) -> Self {
        Self {
            cookies: self.cookies.with_updates(updates),
            ..self.clone()
        }
    }

    /// Absolute redirect target on the request's own origin, or the bare path when
    /// the origin is unknown.
    #[must_use]
    pub fn redirect_location(&self, target: &str) -> String {
        self.origin
            .as_ref()
            .and_then(|origin| origin.join(target).ok())
            .map_or_else(|| target.to_string(), String::from)
    }
}

// Resolve the path exactly as `Url::set_path` does when the proxy builds the
// upstream target, so the classified path is the forwarded path.
fn canonical_path(raw: &str) -> String {
    let Ok(mut url) = Url::parse(CANONICAL_BASE) else {
        return raw.to_string();
    };
    url.set_path(raw);
    url.path().to_string()
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn request_origin(
    headers: &HeaderMap,
    scheme: Option<&str>,
    authority: Option<&str>,
) -> Option<Url> {
    let host = header_value(headers, FORWARDED_HOST)
        .or_else(|| header_value(headers, HOST))
        .or(authority)?;
    let scheme = header_value(headers, FORWARDED_PROTO)
        .or(scheme)
        .unwrap_or("http")
        .to_lowercase();
    if scheme != "http" && scheme != "https" {
        return None;
    }

    let origin = Url::parse(&format!("{scheme}://{host}/")).ok()?;
    // Reject anything that smuggled a path, credentials or query through the host.
    if origin.path() != "/" || origin.query().is_some() || !origin.username().is_empty() {
        return None;
    }
    Some(origin)
}
