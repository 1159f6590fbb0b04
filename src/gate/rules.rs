//! Path exemption rules.
//!
//! Rules are evaluated in order and the last matching rule wins. A rule prefixed
//! with `!` puts a path back under the gate, which is how a broad exemption such as
//! `^/_next/` can carve out a single gated sub-tree without lookahead in the pattern.

use regex::Regex;
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid exemption rule {pattern:?}: {source}")]
    Invalid {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("unknown exemption preset: {0}")]
    UnknownPreset(String),
}

/// Built-in rule sets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Preset {
    /// Static chunks, the image optimizer, the favicon and image files.
    #[default]
    Static,
    /// Everything in `Static`, plus all framework internals and `/api` routes.
    Internal,
}

const STATIC_PATTERNS: &[&str] = &[
    r"^/_next/static/",
    r"^/_next/image(?:/|$)",
    r"^/favicon\.ico$",
    r"\.(?:svg|png|jpg|jpeg|gif|webp|ico)$",
];

const INTERNAL_PATTERNS: &[&str] = &[r"^/_next/", r"^/api(?:/|$)"];

impl Preset {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Internal => "internal",
        }
    }

    /// Patterns making up the preset, in evaluation order.
    #[must_use]
    pub fn patterns(self) -> Vec<&'static str> {
        match self {
            Self::Static => STATIC_PATTERNS.to_vec(),
            Self::Internal => STATIC_PATTERNS
                .iter()
                .chain(INTERNAL_PATTERNS)
                .copied()
                .collect(),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = RuleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "static" => Ok(Self::Static),
            "internal" => Ok(Self::Internal),
            other => Err(RuleError::UnknownPreset(other.to_string())),
        }
    }
}

#[derive(Clone, Debug)]
struct ExemptRule {
    pattern: Regex,
    negated: bool,
}

impl ExemptRule {
    fn parse(rule: &str) -> Result<Self, RuleError> {
        let (negated, body) = match rule.strip_prefix('!') {
            Some(body) => (true, body),
            None => (false, rule),
        };
        let pattern = Regex::new(body).map_err(|source| RuleError::Invalid {
            pattern: rule.to_string(),
            source,
        })?;
        Ok(Self { pattern, negated })
    }
}

/// Ordered set of exemption rules.
#[derive(Clone, Debug, Default)]
pub struct ExemptRules {
    rules: Vec<ExemptRule>,
}

impl ExemptRules {
    /// An empty set: every path is gated.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns an error if any preset pattern fails to compile.
    pub fn preset(preset: Preset) -> Result<Self, RuleError> {
        Self::from_rules(preset.patterns())
    }

    /// # Errors
    /// Returns an error naming the first rule that fails to compile.
    pub fn from_rules<I, S>(rules: I) -> Result<Self, RuleError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for rule in rules {
            set.push(rule.as_ref())?;
        }
        Ok(set)
    }

    /// Append a rule; it takes precedence over every rule before it.
    ///
    /// # Errors
    /// Returns an error if the pattern fails to compile.
    pub fn push(&mut self, rule: &str) -> Result<(), RuleError> {
        self.rules.push(ExemptRule::parse(rule)?);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[must_use]
    pub fn is_exempt(&self, path: &str) -> bool {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.pattern.is_match(path))
            .is_some_and(|rule| !rule.negated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preset(preset: Preset) -> ExemptRules {
        match ExemptRules::preset(preset) {
            Ok(rules) => rules,
            Err(err) => panic!("preset {preset} failed to compile: {err}"),
        }
    }

    #[test]
    fn static_preset_exempts_assets_only() {
        let rules = preset(Preset::Static);
        assert!(rules.is_exempt("/_next/static/chunk.js"));
        assert!(rules.is_exempt("/_next/image"));
        assert!(rules.is_exempt("/_next/image/foo"));
        assert!(rules.is_exempt("/favicon.ico"));
        assert!(rules.is_exempt("/images/logo.svg"));
        assert!(rules.is_exempt("/hero.webp"));

        assert!(!rules.is_exempt("/"));
        assert!(!rules.is_exempt("/dashboard"));
        assert!(!rules.is_exempt("/login"));
        assert!(!rules.is_exempt("/api/leads"));
        assert!(!rules.is_exempt("/_next/data/build/page.json"));
        assert!(!rules.is_exempt("/_next/imagery"));
    }

    #[test]
    fn internal_preset_adds_framework_and_api() {
        let rules = preset(Preset::Internal);
        assert!(rules.is_exempt("/_next/static/chunk.js"));
        assert!(rules.is_exempt("/_next/data/build/page.json"));
        assert!(rules.is_exempt("/api"));
        assert!(rules.is_exempt("/api/chat"));

        assert!(!rules.is_exempt("/apiary"));
        assert!(!rules.is_exempt("/dashboard"));
    }

    #[test]
    fn negated_rule_regates_path() {
        let mut rules = preset(Preset::Internal);
        assert!(rules.push("!^/api/leads").is_ok());
        assert!(!rules.is_exempt("/api/leads"));
        assert!(!rules.is_exempt("/api/leads/42"));
        assert!(rules.is_exempt("/api/chat"));
    }

    #[test]
    fn later_rule_wins() {
        let rules = ExemptRules::from_rules(["!^/docs/private", "^/docs/"]);
        assert!(rules.as_ref().is_ok_and(|r| r.is_exempt("/docs/private/a")));
    }

    #[test]
    fn empty_set_gates_everything() {
        let rules = ExemptRules::new();
        assert!(rules.is_empty());
        assert!(!rules.is_exempt("/_next/static/chunk.js"));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let result = ExemptRules::from_rules(["^/ok", "(unclosed"]);
        match result {
            Err(RuleError::Invalid { pattern, .. }) => assert_eq!(pattern, "(unclosed"),
            other => panic!("expected invalid rule error, got {other:?}"),
        }
    }

    #[test]
    fn preset_from_str() {
        assert_eq!("static".parse::<Preset>().ok(), Some(Preset::Static));
        assert_eq!(" Internal ".parse::<Preset>().ok(), Some(Preset::Internal));
        assert!("narrow".parse::<Preset>().is_err());
    }
}
