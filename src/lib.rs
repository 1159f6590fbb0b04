//! # Session Gate
//!
//! `session-gate` sits in front of the CRM dashboard and decides, for every inbound
//! request, whether it may reach the dashboard at all.
//!
//! ## Request flow
//!
//! 1. **Exemption:** static assets and framework internals are matched against an
//!    ordered rule set and pass through without any identity lookup.
//! 2. **Validation:** the session cookies are handed to the identity service, which
//!    answers with the current user and, when tokens were refreshed, the cookies to set.
//! 3. **Decision:** signed-in users are sent away from the login page, anonymous users
//!    are sent to it, and everything else is forwarded with the refreshed cookies
//!    applied to both the forwarded request and the response.
//!
//! Any identity failure, a timeout included, counts as "not signed in". The gate never
//! answers with a server error of its own.

pub mod api;
pub mod cli;
pub mod gate;
pub mod identity;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
