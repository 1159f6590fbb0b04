use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::gate::Preset;

pub const ARG_LOGIN_PATH: &str = "login-path";
pub const ARG_HOME_PATH: &str = "home-path";
pub const ARG_EXEMPT_PRESET: &str = "exempt-preset";
pub const ARG_EXEMPT: &str = "exempt";
pub const ARG_TRUST_FORWARDED_HEADERS: &str = "trust-forwarded-headers";

#[derive(Debug)]
pub struct Options {
    pub login_path: String,
    pub home_path: String,
    pub preset: Preset,
    pub exempt: Vec<String>,
    pub trust_forwarded_headers: bool,
}

impl Options {
    /// Parse gate arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the exemption preset is unknown.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let preset = matches
            .get_one::<String>(ARG_EXEMPT_PRESET)
            .map_or(Ok(Preset::default()), |value| value.parse::<Preset>())?;

        Ok(Self {
            login_path: matches
                .get_one::<String>(ARG_LOGIN_PATH)
                .cloned()
                .unwrap_or_else(|| "/login".to_string()),
            home_path: matches
                .get_one::<String>(ARG_HOME_PATH)
                .cloned()
                .unwrap_or_else(|| "/".to_string()),
            preset,
            exempt: matches
                .get_many::<String>(ARG_EXEMPT)
                .map(|values| {
                    values
                        .filter(|value| !value.trim().is_empty())
                        .cloned()
                        .collect()
                })
                .unwrap_or_default(),
            trust_forwarded_headers: matches.get_flag(ARG_TRUST_FORWARDED_HEADERS),
        })
    }
}

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LOGIN_PATH)
                .long(ARG_LOGIN_PATH)
                .help("Path of the login page")
                .env("SESSION_GATE_LOGIN_PATH")
                .default_value("/login"),
        )
        .arg(
            Arg::new(ARG_HOME_PATH)
                .long(ARG_HOME_PATH)
                .help("Where signed-in users are sent when they open the login page")
                .env("SESSION_GATE_HOME_PATH")
                .default_value("/"),
        )
        .arg(
            Arg::new(ARG_EXEMPT_PRESET)
                .long(ARG_EXEMPT_PRESET)
                .help("Built-in exemption rules: static (assets only) or internal (assets, framework internals and /api)")
                .env("SESSION_GATE_EXEMPT_PRESET")
                .value_parser([Preset::Static.as_str(), Preset::Internal.as_str()])
                .default_value(Preset::Static.as_str()),
        )
        .arg(
            Arg::new(ARG_EXEMPT)
                .long(ARG_EXEMPT)
                .help("Extra exemption rule (regex, prefix with ! to gate a path again); later rules win")
                .env("SESSION_GATE_EXEMPT")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new(ARG_TRUST_FORWARDED_HEADERS)
                .long(ARG_TRUST_FORWARDED_HEADERS)
                .help("Trust Host and X-Forwarded-* for absolute redirects; only behind a proxy that sets them")
                .env("SESSION_GATE_TRUST_FORWARDED_HEADERS")
                .action(ArgAction::SetTrue),
        )
}
