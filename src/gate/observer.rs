//! Pluggable sink for gate decisions.

use tracing::{debug, info, warn};

use super::Outcome;
use crate::identity::IdentityError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateEvent<'a> {
    /// Path matched the exemption rules; identity was not consulted.
    Exempt { path: &'a str },
    /// Identity lookup finished.
    Checked {
        path: &'a str,
        authenticated: bool,
        refreshed: usize,
    },
    /// Identity lookup failed; the request is treated as anonymous.
    IdentityFailed {
        path: &'a str,
        error: &'a IdentityError,
    },
    Decided { path: &'a str, outcome: Outcome },
}

pub trait GateObserver: Send + Sync {
    fn record(&self, event: &GateEvent<'_>);
}

/// Default observer: forwards events to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl GateObserver for TracingObserver {
    fn record(&self, event: &GateEvent<'_>) {
        match event {
            GateEvent::Exempt { path } => debug!(path, "exempt from session gate"),
            GateEvent::Checked {
                path,
                authenticated,
                refreshed,
            } => debug!(path, authenticated, refreshed, "session checked"),
            GateEvent::IdentityFailed { path, error } => {
                // Missing cookies are routine for anonymous visitors.
                if matches!(error, IdentityError::MissingCredential) {
                    debug!(path, %error, "no session");
                } else {
                    warn!(path, %error, "identity check failed");
                }
            }
            GateEvent::Decided { path, outcome } => match outcome {
                Outcome::Forward => debug!(path, %outcome, "session gate decision"),
                _ => info!(path, %outcome, "session gate decision"),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl GateObserver for NoopObserver {
    fn record(&self, _event: &GateEvent<'_>) {}
}
