//! Session gate: route classification, credential validation and the
//! forward/redirect decision.

use std::{fmt, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::timeout;

use crate::identity::{Authentication, IdentityError, IdentityService, User};

pub mod context;
pub mod cookies;
pub mod layer;
pub mod observer;
pub mod rules;

pub use context::RequestContext;
pub use cookies::{CookieJar, CookieOptions, CookieUpdate, SameSite};
pub use layer::{SessionGateLayer, SessionGateService};
pub use observer::{GateEvent, GateObserver, NoopObserver, TracingObserver};
pub use rules::{ExemptRules, Preset, RuleError};

const DEFAULT_LOGIN_PATH: &str = "/login";
const DEFAULT_HOME_PATH: &str = "/";
const DEFAULT_IDENTITY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteClass {
    LoginPage,
    Protected,
    Exempt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Forward,
    RedirectToLogin,
    RedirectToHome,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => write!(f, "forward"),
            Self::RedirectToLogin => write!(f, "redirect-to-login"),
            Self::RedirectToHome => write!(f, "redirect-to-home"),
        }
    }
}

/// Pure decision table.
#[must_use]
pub const fn decide(authenticated: bool, is_login_page: bool) -> Outcome {
    match (authenticated, is_login_page) {
        (true, true) => Outcome::RedirectToHome,
        (false, false) => Outcome::RedirectToLogin,
        _ => Outcome::Forward,
    }
}

#[derive(Clone, Debug)]
pub struct GateConfig {
    login_path: String,
    home_path: String,
    rules: ExemptRules,
    identity_timeout: Duration,
    trust_forwarded_headers: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::new(ExemptRules::default())
    }
}

impl GateConfig {
    #[must_use]
    pub fn new(rules: ExemptRules) -> Self {
        Self {
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            home_path: DEFAULT_HOME_PATH.to_string(),
            rules,
            identity_timeout: DEFAULT_IDENTITY_TIMEOUT,
            trust_forwarded_headers: false,
        }
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = normalize_path(path.into());
        self
    }

    #[must_use]
    pub fn with_home_path(mut self, path: impl Into<String>) -> Self {
        self.home_path = normalize_path(path.into());
        self
    }

    #[must_use]
    pub fn with_identity_timeout(mut self, identity_timeout: Duration) -> Self {
        self.identity_timeout = identity_timeout;
        self
    }

    /// Build absolute redirects from `Host` / `X-Forwarded-*`. Only for deployments
    /// behind a proxy that overwrites those headers.
    #[must_use]
    pub fn with_trust_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded_headers = trust;
        self
    }

    /// Login and home must differ, or a signed-in user on the login page would be
    /// redirected to it forever.
    ///
    /// # Errors
    /// Returns an error when both paths are the same.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.login_path == self.home_path {
            return Err(ConfigError::RedirectLoop {
                path: self.login_path.clone(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    #[must_use]
    pub fn home_path(&self) -> &str {
        &self.home_path
    }

    #[must_use]
    pub fn rules(&self) -> &ExemptRules {
        &self.rules
    }

    #[must_use]
    pub fn identity_timeout(&self) -> Duration {
        self.identity_timeout
    }

    #[must_use]
    pub fn trust_forwarded_headers(&self) -> bool {
        self.trust_forwarded_headers
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("login path and home path are both {path:?}; signed-in users would loop")]
    RedirectLoop { path: String },
}

fn normalize_path(path: String) -> String {
    let trimmed = path.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// What the gate decided for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub class: RouteClass,
    pub outcome: Outcome,
    pub user: Option<User>,
    /// Credential rewrites to apply to the forwarded request and the response.
    pub refreshed: Vec<CookieUpdate>,
}

impl Verdict {
    fn exempt() -> Self {
        Self {
            class: RouteClass::Exempt,
            outcome: Outcome::Forward,
            user: None,
            refreshed: Vec::new(),
        }
    }
}

/// The single gate type; exemption rules and observer are constructor parameters.
pub struct SessionGate<I> {
    config: Arc<GateConfig>,
    identity: Arc<I>,
    observer: Arc<dyn GateObserver>,
}

impl<I> Clone for SessionGate<I> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            identity: Arc::clone(&self.identity),
            observer: Arc::clone(&self.observer),
        }
    }
}

impl<I> fmt::Debug for SessionGate<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGate")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<I: IdentityService> SessionGate<I> {
    #[must_use]
    pub fn new(config: GateConfig, identity: Arc<I>) -> Self {
        Self {
            config: Arc::new(config),
            identity,
            observer: Arc::new(TracingObserver),
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn GateObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Exemption is checked first, so an exempt login path is never gated.
    #[must_use]
    pub fn classify(&self, path: &str) -> RouteClass {
        if self.config.rules.is_exempt(path) {
            RouteClass::Exempt
        } else if path == self.config.login_path {
            RouteClass::LoginPage
        } else {
            RouteClass::Protected
        }
    }

    /// Run the gate for one request. Never fails: identity errors mean anonymous.
    pub async fn evaluate(&self, context: &RequestContext) -> Verdict {
        let path = context.path();
        let class = self.classify(path);
        if class == RouteClass::Exempt {
            self.observer.record(&GateEvent::Exempt { path });
            return Verdict::exempt();
        }

        let authentication = self.authenticate(context.cookies()).await;
        if let Some(error) = &authentication.error {
            self.observer
                .record(&GateEvent::IdentityFailed { path, error });
        }

        let authenticated = authentication.is_authenticated();
        self.observer.record(&GateEvent::Checked {
            path,
            authenticated,
            refreshed: authentication.refreshed.len(),
        });

        let outcome = decide(authenticated, class == RouteClass::LoginPage);
        self.observer.record(&GateEvent::Decided { path, outcome });

        Verdict {
            class,
            outcome,
            user: authentication.user.filter(|_| authenticated),
            refreshed: authentication.refreshed,
        }
    }

    async fn authenticate(&self, cookies: &CookieJar) -> Authentication {
        let limit = self.config.identity_timeout;
        match timeout(limit, self.identity.current_user(cookies)).await {
            Ok(authentication) => authentication,
            Err(_) => Authentication::failed(IdentityError::Timeout(limit)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    struct FixedIdentity {
        authentication: Authentication,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl FixedIdentity {
        fn new(authentication: Authentication) -> Arc<Self> {
            Arc::new(Self {
                authentication,
                calls: AtomicUsize::new(0),
                delay: None,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                authentication: Authentication::user(user()),
                calls: AtomicUsize::new(0),
                delay: Some(delay),
            })
        }
    }

    impl IdentityService for FixedIdentity {
        async fn current_user(&self, _cookies: &CookieJar) -> Authentication {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.authentication.clone()
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl GateObserver for Recorder {
        fn record(&self, event: &GateEvent<'_>) {
            if let Ok(mut events) = self.events.lock() {
                events.push(format!("{event:?}"));
            }
        }
    }

    fn user() -> User {
        User {
            id: "user-1".to_string(),
            email: None,
            role: None,
        }
    }

    fn gate(identity: Arc<FixedIdentity>) -> SessionGate<FixedIdentity> {
        let rules = match ExemptRules::preset(Preset::Static) {
            Ok(rules) => rules,
            Err(err) => panic!("preset failed: {err}"),
        };
        SessionGate::new(GateConfig::new(rules), identity).with_observer(Arc::new(NoopObserver))
    }

    fn context(path: &str) -> RequestContext {
        RequestContext::new(path, CookieJar::parse("sb-access-token=t"))
    }

    #[test]
    fn decision_table() {
        assert_eq!(decide(true, true), Outcome::RedirectToHome);
        assert_eq!(decide(true, false), Outcome::Forward);
        assert_eq!(decide(false, true), Outcome::Forward);
        assert_eq!(decide(false, false), Outcome::RedirectToLogin);
    }

    #[test]
    fn config_normalizes_paths() {
        let config = GateConfig::default()
            .with_login_path("signin")
            .with_home_path(" /dashboard ");
        assert_eq!(config.login_path(), "/signin");
        assert_eq!(config.home_path(), "/dashboard");
    }

    #[test]
    fn same_login_and_home_is_rejected() {
        let config = GateConfig::default()
            .with_login_path("/signin")
            .with_home_path("signin");
        assert_eq!(
            config.validate(),
            Err(ConfigError::RedirectLoop {
                path: "/signin".to_string()
            })
        );
        assert_eq!(GateConfig::default().validate(), Ok(()));
        assert!(!GateConfig::default().trust_forwarded_headers());
    }

    #[test]
    fn classify_routes() {
        let gate = gate(FixedIdentity::new(Authentication::default()));
        assert_eq!(gate.classify("/login"), RouteClass::LoginPage);
        assert_eq!(gate.classify("/login/extra"), RouteClass::Protected);
        assert_eq!(gate.classify("/dashboard"), RouteClass::Protected);
        assert_eq!(gate.classify("/_next/static/a.js"), RouteClass::Exempt);
    }

    #[tokio::test]
    async fn exempt_path_skips_identity() {
        let identity = FixedIdentity::new(Authentication::default());
        let verdict = gate(identity.clone()).evaluate(&context("/_next/static/chunk.js")).await;
        assert_eq!(verdict.outcome, Outcome::Forward);
        assert_eq!(verdict.class, RouteClass::Exempt);
        assert_eq!(identity.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn authenticated_on_login_goes_home() {
        let identity = FixedIdentity::new(Authentication::user(user()));
        let verdict = gate(identity).evaluate(&context("/login")).await;
        assert_eq!(verdict.outcome, Outcome::RedirectToHome);
    }

    #[tokio::test]
    async fn anonymous_on_protected_goes_to_login() {
        let identity = FixedIdentity::new(Authentication::failed(IdentityError::MissingCredential));
        let verdict = gate(identity).evaluate(&context("/dashboard")).await;
        assert_eq!(verdict.outcome, Outcome::RedirectToLogin);
        assert!(verdict.user.is_none());
    }

    #[tokio::test]
    async fn user_with_error_is_not_trusted() {
        let identity = FixedIdentity::new(Authentication {
            user: Some(user()),
            error: Some(IdentityError::Unavailable { status: 503 }),
            refreshed: Vec::new(),
        });
        let verdict = gate(identity).evaluate(&context("/dashboard")).await;
        assert_eq!(verdict.outcome, Outcome::RedirectToLogin);
        assert!(verdict.user.is_none());
    }

    #[tokio::test]
    async fn refreshed_cookies_are_carried() {
        let refreshed = vec![
            CookieUpdate::new("a", "1", CookieOptions::default()),
            CookieUpdate::new("b", "2", CookieOptions::default()),
            CookieUpdate::new("c", "3", CookieOptions::default()),
        ];
        let identity =
            FixedIdentity::new(Authentication::user(user()).with_refreshed(refreshed.clone()));
        let verdict = gate(identity).evaluate(&context("/dashboard")).await;
        assert_eq!(verdict.outcome, Outcome::Forward);
        assert_eq!(verdict.refreshed, refreshed);
        assert_eq!(verdict.user, Some(user()));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_identity_times_out_as_anonymous() {
        let identity = FixedIdentity::slow(Duration::from_secs(30));
        let gate = SessionGate::new(
            GateConfig::default().with_identity_timeout(Duration::from_millis(100)),
            identity,
        )
        .with_observer(Arc::new(NoopObserver));
        let verdict = gate.evaluate(&context("/dashboard")).await;
        assert_eq!(verdict.outcome, Outcome::RedirectToLogin);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_evaluation_leaves_no_trace() {
        let recorder = Arc::new(Recorder::default());
        let identity = FixedIdentity::slow(Duration::from_secs(30));
        let gate = SessionGate::new(GateConfig::default(), identity.clone())
            .with_observer(recorder.clone());

        let cancelled =
            tokio::time::timeout(Duration::from_secs(1), gate.evaluate(&context("/dashboard")))
                .await;

        assert!(cancelled.is_err());
        assert_eq!(identity.calls.load(Ordering::SeqCst), 1);
        let events = recorder.events.lock().map(|e| e.clone()).unwrap_or_default();
        assert!(events.is_empty(), "{events:?}");
    }

    #[tokio::test]
    async fn observer_sees_every_step() {
        let recorder = Arc::new(Recorder::default());
        let identity = FixedIdentity::new(Authentication::failed(IdentityError::MissingCredential));
        let gate = gate(identity).with_observer(recorder.clone());

        gate.evaluate(&context("/favicon.ico")).await;
        gate.evaluate(&context("/dashboard")).await;

        let events = recorder.events.lock().map(|e| e.clone()).unwrap_or_default();
        assert_eq!(events.len(), 4);
        assert!(events[0].starts_with("Exempt"));
        assert!(events[1].starts_with("IdentityFailed"));
        assert!(events[2].starts_with("Checked"));
        assert!(events[3].contains("RedirectToLogin"));
    }
}
