//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the action to run, such as starting the gate
//! with its full configuration.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{gate, identity, ARG_PORT, ARG_UPSTREAM_URL};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let upstream_url = matches
        .get_one::<String>(ARG_UPSTREAM_URL)
        .filter(|value| !value.trim().is_empty())
        .cloned()
        .with_context(|| format!("missing required argument: --{ARG_UPSTREAM_URL}"))?;

    let identity_opts = identity::Options::parse(matches)?;
    let gate_opts = gate::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        upstream_url,
        identity_url: identity_opts.url,
        identity_api_key: identity_opts.api_key,
        identity_timeout_seconds: identity_opts.timeout_seconds,
        cookie_prefix: identity_opts.cookie_prefix,
        cookie_secure: identity_opts.cookie_secure,
        session_ttl_seconds: identity_opts.session_ttl_seconds,
        login_path: gate_opts.login_path,
        home_path: gate_opts.home_path,
        exempt_preset: gate_opts.preset,
        exempt: gate_opts.exempt,
        trust_forwarded_headers: gate_opts.trust_forwarded_headers,
    }))
}
