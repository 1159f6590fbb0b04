use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_IDENTITY_URL: &str = "identity-url";
pub const ARG_IDENTITY_API_KEY: &str = "identity-api-key";
pub const ARG_IDENTITY_TIMEOUT_SECONDS: &str = "identity-timeout-seconds";
pub const ARG_COOKIE_PREFIX: &str = "cookie-prefix";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";

#[derive(Debug)]
pub struct Options {
    pub url: String,
    pub api_key: SecretString,
    pub timeout_seconds: u64,
    pub cookie_prefix: String,
    pub cookie_secure: bool,
    pub session_ttl_seconds: i64,
}

impl Options {
    /// Parse identity service arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing or empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let url = matches.get_one::<String>(ARG_IDENTITY_URL).cloned();
        let url = match url {
            Some(value) if !value.trim().is_empty() => value,
            _ => anyhow::bail!("missing required argument: --{ARG_IDENTITY_URL}"),
        };

        let api_key = matches
            .get_one::<String>(ARG_IDENTITY_API_KEY)
            .filter(|value| !value.trim().is_empty())
            .cloned()
            .with_context(|| format!("missing required argument: --{ARG_IDENTITY_API_KEY}"))?;

        Ok(Self {
            url,
            api_key: SecretString::from(api_key),
            timeout_seconds: matches
                .get_one::<u64>(ARG_IDENTITY_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(5),
            cookie_prefix: matches
                .get_one::<String>(ARG_COOKIE_PREFIX)
                .cloned()
                .unwrap_or_else(|| "sb".to_string()),
            cookie_secure: matches.get_flag(ARG_COOKIE_SECURE),
            session_ttl_seconds: matches
                .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
                .copied()
                .unwrap_or(3600),
        })
    }
}

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_IDENTITY_URL)
                .long(ARG_IDENTITY_URL)
                .help("Identity service base URL, example: https://<project>.supabase.co")
                .env("SESSION_GATE_IDENTITY_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_IDENTITY_API_KEY)
                .long(ARG_IDENTITY_API_KEY)
                .help("Identity service public API key")
                .env("SESSION_GATE_IDENTITY_API_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_IDENTITY_TIMEOUT_SECONDS)
                .long(ARG_IDENTITY_TIMEOUT_SECONDS)
                .help("Give up on an identity check after this many seconds")
                .env("SESSION_GATE_IDENTITY_TIMEOUT_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_COOKIE_PREFIX)
                .long(ARG_COOKIE_PREFIX)
                .help("Prefix of the session cookies (<prefix>-access-token, <prefix>-refresh-token)")
                .env("SESSION_GATE_COOKIE_PREFIX")
                .default_value("sb"),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark session cookies Secure (enable when served over HTTPS)")
                .env("SESSION_GATE_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session cookie TTL in seconds")
                .env("SESSION_GATE_SESSION_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
}
