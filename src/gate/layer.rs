//! Tower layer running the session gate in front of a service.

use axum::{
    body::Body,
    http::{
        header::{COOKIE, LOCATION, SET_COOKIE},
        uri::PathAndQuery,
        HeaderMap, HeaderValue, Request, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::error;

use super::{CookieUpdate, Outcome, RequestContext, SessionGate};
use crate::identity::IdentityService;

pub struct SessionGateLayer<I> {
    gate: SessionGate<I>,
}

impl<I> Clone for SessionGateLayer<I> {
    fn clone(&self) -> Self {
        Self {
            gate: self.gate.clone(),
        }
    }
}

impl<I> SessionGateLayer<I> {
    #[must_use]
    pub fn new(gate: SessionGate<I>) -> Self {
        Self { gate }
    }
}

impl<S, I> Layer<S> for SessionGateLayer<I> {
    type Service = SessionGateService<S, I>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionGateService {
            inner,
            gate: self.gate.clone(),
        }
    }
}

pub struct SessionGateService<S, I> {
    inner: S,
    gate: SessionGate<I>,
}

impl<S: Clone, I> Clone for SessionGateService<S, I> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            gate: self.gate.clone(),
        }
    }
}

impl<S, I> Service<Request<Body>> for SessionGateService<S, I>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
    I: IdentityService,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        // Keep the service that was polled ready; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let gate = self.gate.clone();

        Box::pin(async move {
            let context =
                RequestContext::from_request(&request, gate.config().trust_forwarded_headers());
            let verdict = gate.evaluate(&context).await;

            let target = match verdict.outcome {
                Outcome::Forward => None,
                Outcome::RedirectToLogin => Some(gate.config().login_path()),
                Outcome::RedirectToHome => Some(gate.config().home_path()),
            };
            if let Some(target) = target {
                let mut response = redirect(&context.redirect_location(target));
                append_set_cookies(response.headers_mut(), &verdict.refreshed);
                return Ok(response);
            }

            // Forward the path that was classified, never the raw one.
            if context.path() != request.uri().path() {
                if let Err(err) = rewrite_path(&mut request, &context) {
                    error!("Failed to rewrite request path {:?}: {err}", context.path());
                    return Ok(StatusCode::BAD_REQUEST.into_response());
                }
            }
            if !verdict.refreshed.is_empty() {
                let forwarded = context.with_updates(&verdict.refreshed);
                rewrite_cookie_header(request.headers_mut(), &forwarded);
            }
            if let Some(user) = verdict.user {
                request.extensions_mut().insert(user);
            }

            let mut response = inner.call(request).await?;
            append_set_cookies(response.headers_mut(), &verdict.refreshed);
            Ok(response)
        })
    }
}

fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(location) => (StatusCode::FOUND, [(LOCATION, location)]).into_response(),
        Err(err) => {
            error!("Invalid redirect location {location:?}: {err}");
            StatusCode::FOUND.into_response()
        }
    }
}

fn rewrite_path(
    request: &mut Request<Body>,
    context: &RequestContext,
) -> Result<(), axum::http::Error> {
    let path_and_query = match context.query() {
        Some(query) => format!("{}?{query}", context.path()),
        None => context.path().to_string(),
    };
    let mut parts = request.uri().clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query)?);
    *request.uri_mut() = Uri::from_parts(parts)?;
    Ok(())
}

fn rewrite_cookie_header(headers: &mut HeaderMap, context: &RequestContext) {
    match context.cookies().to_header_value() {
        Ok(Some(value)) => {
            headers.insert(COOKIE, value);
        }
        Ok(None) => {
            headers.remove(COOKIE);
        }
        Err(err) => error!("Failed to rewrite cookie header: {err}"),
    }
}

fn append_set_cookies(headers: &mut HeaderMap, updates: &[CookieUpdate]) {
    for update in updates {
        match update.to_header_value() {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(err) => error!("Failed to serialize cookie {}: {err}", update.name),
        }
    }
}
