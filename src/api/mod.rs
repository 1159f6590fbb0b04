use crate::{
    gate::{SessionGate, SessionGateLayer},
    identity::IdentityService,
};
use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

pub mod handlers;

pub use handlers::{SignoutConfig, Upstream};

/// Build the application router.
///
/// `/health` and `/auth/signout` are answered locally and are not gated. Every
/// other path goes through the session gate and is then proxied upstream.
pub fn router<I: IdentityService>(
    gate: SessionGate<I>,
    upstream: Arc<Upstream>,
    signout: Arc<SignoutConfig>,
) -> Router {
    let gated = Router::new()
        .fallback(handlers::proxy)
        .layer(SessionGateLayer::new(gate));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/signout", post(handlers::signout))
        .merge(gated)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(upstream))
                .layer(Extension(signout)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new<I: IdentityService>(
    port: u16,
    gate: SessionGate<I>,
    upstream: Arc<Upstream>,
    signout: Arc<SignoutConfig>,
) -> Result<()> {
    let app = router(gate, upstream, signout);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
