use crate::{
    api::{self, SignoutConfig, Upstream},
    gate::{ExemptRules, GateConfig, Preset, SessionGate},
    identity::{CredentialCookies, RemoteIdentity},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub upstream_url: String,
    pub identity_url: String,
    pub identity_api_key: SecretString,
    pub identity_timeout_seconds: u64,
    pub cookie_prefix: String,
    pub cookie_secure: bool,
    pub session_ttl_seconds: i64,
    pub login_path: String,
    pub home_path: String,
    pub exempt_preset: Preset,
    pub exempt: Vec<String>,
    pub trust_forwarded_headers: bool,
}

/// Build the exemption rules: the preset first, then operator rules in order.
///
/// # Errors
/// Returns an error naming the first rule that does not compile.
pub fn exempt_rules(preset: Preset, extra: &[String]) -> Result<ExemptRules> {
    let mut rules = ExemptRules::preset(preset).context("Invalid exemption preset")?;
    for rule in extra {
        rules.push(rule)?;
    }
    Ok(rules)
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let identity_timeout = Duration::from_secs(args.identity_timeout_seconds);

    let cookies = CredentialCookies::new(&args.cookie_prefix)
        .with_secure(args.cookie_secure)
        .with_session_ttl_seconds(args.session_ttl_seconds);

    let identity = RemoteIdentity::new(
        &args.identity_url,
        args.identity_api_key,
        cookies.clone(),
        identity_timeout,
    )?;

    let rules = exempt_rules(args.exempt_preset, &args.exempt)?;
    info!(
        preset = %args.exempt_preset,
        rules = rules.len(),
        "Loaded exemption rules"
    );

    let config = GateConfig::new(rules)
        .with_login_path(args.login_path)
        .with_home_path(args.home_path)
        .with_identity_timeout(identity_timeout)
        .with_trust_forwarded_headers(args.trust_forwarded_headers);
    config.validate().context("Invalid gate paths")?;

    let signout = Arc::new(SignoutConfig {
        cookies,
        login_path: config.login_path().to_string(),
    });

    let gate = SessionGate::new(config, Arc::new(identity));
    debug!("Session gate: {:?}", gate);

    let upstream = Arc::new(
        Upstream::new(&args.upstream_url)?
            .with_trust_forwarded_headers(args.trust_forwarded_headers),
    );

    api::new(args.port, gate, upstream, signout).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_rules_follow_preset() {
        let rules = exempt_rules(
            Preset::Internal,
            &["!^/api/leads".to_string(), "^/public/".to_string()],
        );
        let rules = match rules {
            Ok(rules) => rules,
            Err(err) => panic!("rules failed: {err}"),
        };
        assert!(rules.is_exempt("/api/chat"));
        assert!(!rules.is_exempt("/api/leads"));
        assert!(rules.is_exempt("/public/pricing"));
    }

    fn args(login_path: &str, home_path: &str) -> Args {
        Args {
            port: 0,
            upstream_url: "http://127.0.0.1:3000".to_string(),
            identity_url: "https://project.supabase.co".to_string(),
            identity_api_key: SecretString::from("anon-key"),
            identity_timeout_seconds: 5,
            cookie_prefix: "sb".to_string(),
            cookie_secure: false,
            session_ttl_seconds: 3600,
            login_path: login_path.to_string(),
            home_path: home_path.to_string(),
            exempt_preset: Preset::Static,
            exempt: Vec::new(),
            trust_forwarded_headers: false,
        }
    }

    #[tokio::test]
    async fn same_login_and_home_fails_at_startup() {
        let result = execute(args("/login", "login")).await;
        let Err(err) = result else {
            panic!("expected a configuration error");
        };
        assert!(format!("{err:#}").contains("Invalid gate paths"), "{err:#}");
    }

    #[test]
    fn invalid_extra_rule_fails() {
        let rules = exempt_rules(Preset::Static, &["[".to_string()]);
        assert!(rules.is_err());
    }
}
