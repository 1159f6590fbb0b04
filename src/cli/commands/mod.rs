pub mod gate;
pub mod identity;
pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const ARG_UPSTREAM_URL: &str = "upstream-url";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("session-gate")
        .about("Session gate for the CRM dashboard")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("SESSION_GATE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_UPSTREAM_URL)
                .short('u')
                .long(ARG_UPSTREAM_URL)
                .help("Dashboard frontend that gated requests are forwarded to")
                .env("SESSION_GATE_UPSTREAM_URL")
                .required(true),
        );

    let command = identity::with_args(command);
    let command = gate::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED_ENV: [(&str, Option<&str>); 3] = [
        ("SESSION_GATE_UPSTREAM_URL", Some("http://127.0.0.1:3000")),
        ("SESSION_GATE_IDENTITY_URL", Some("https://project.supabase.co")),
        ("SESSION_GATE_IDENTITY_API_KEY", Some("anon-key")),
    ];

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "session-gate");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Session gate for the CRM dashboard".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_check_args() {
        temp_env::with_vars_unset(
            [
                "SESSION_GATE_PORT",
                "SESSION_GATE_EXEMPT_PRESET",
                "SESSION_GATE_EXEMPT",
                "SESSION_GATE_LOGIN_PATH",
            ],
            || {
                let matches = new().get_matches_from(vec![
                    "session-gate",
                    "--port",
                    "9090",
                    "--upstream-url",
                    "http://127.0.0.1:3000",
                    "--identity-url",
                    "https://project.supabase.co",
                    "--identity-api-key",
                    "anon-key",
                    "--exempt",
                    "^/public/",
                    "--exempt",
                    "!^/public/private",
                ]);

                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(9090));
                assert_eq!(
                    matches.get_one::<String>(ARG_UPSTREAM_URL).cloned(),
                    Some("http://127.0.0.1:3000".to_string())
                );
                assert_eq!(
                    matches.get_one::<String>(gate::ARG_EXEMPT_PRESET).cloned(),
                    Some("static".to_string())
                );
                let exempt: Vec<String> = matches
                    .get_many::<String>(gate::ARG_EXEMPT)
                    .map(|values| values.cloned().collect())
                    .unwrap_or_default();
                assert_eq!(exempt, vec!["^/public/", "!^/public/private"]);
            },
        );
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                REQUIRED_ENV[0],
                REQUIRED_ENV[1],
                REQUIRED_ENV[2],
                ("SESSION_GATE_PORT", Some("443")),
                ("SESSION_GATE_LOGIN_PATH", Some("/signin")),
                ("SESSION_GATE_EXEMPT_PRESET", Some("internal")),
                ("SESSION_GATE_COOKIE_SECURE", Some("true")),
                ("SESSION_GATE_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["session-gate"]);
                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(443));
                assert_eq!(
                    matches.get_one::<String>(gate::ARG_LOGIN_PATH).cloned(),
                    Some("/signin".to_string())
                );
                assert_eq!(
                    matches.get_one::<String>(gate::ARG_EXEMPT_PRESET).cloned(),
                    Some("internal".to_string())
                );
                assert!(matches.get_flag(identity::ARG_COOKIE_SECURE));
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(2)
                );
            },
        );
    }

    #[test]
    fn test_missing_identity_url_is_an_error() {
        temp_env::with_vars(
            [
                REQUIRED_ENV[0],
                ("SESSION_GATE_IDENTITY_URL", None),
                REQUIRED_ENV[2],
            ],
            || {
                let result = new().try_get_matches_from(vec!["session-gate"]);
                assert!(result.is_err());
            },
        );
    }

    #[test]
    fn test_unknown_preset_is_rejected() {
        temp_env::with_vars(REQUIRED_ENV, || {
            let result =
                new().try_get_matches_from(vec!["session-gate", "--exempt-preset", "narrow"]);
            assert!(result.is_err());
        });
    }

    #[test]
    fn test_check_log_level_verbosity() {
        for index in 0..5u8 {
            temp_env::with_vars(
                [
                    REQUIRED_ENV[0],
                    REQUIRED_ENV[1],
                    REQUIRED_ENV[2],
                    ("SESSION_GATE_LOG_LEVEL", None),
                ],
                || {
                    let mut args = vec!["session-gate".to_string()];
                    if index > 0 {
                        args.push(format!("-{}", "v".repeat(usize::from(index))));
                    }
                    let matches = new().get_matches_from(args);
                    assert_eq!(
                        matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                        Some(index)
                    );
                },
            );
        }
    }
}
