//! Request cookie parsing and `Set-Cookie` serialization.

use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};
use std::fmt;

/// Cookies presented on a request, in the order they were sent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CookieJar {
    entries: Vec<(String, String)>,
}

impl CookieJar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect cookies from every `Cookie` header on the request.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut jar = Self::new();
        for value in headers.get_all(COOKIE) {
            if let Ok(value) = value.to_str() {
                jar.extend_from_header(value);
            }
        }
        jar
    }

    /// Parse a single `Cookie` header value (`a=1; b=2`).
    #[must_use]
    pub fn parse(header: &str) -> Self {
        let mut jar = Self::new();
        jar.extend_from_header(header);
        jar
    }

    fn extend_from_header(&mut self, header: &str) {
        for pair in header.split(';') {
            let trimmed = pair.trim();
            let mut parts = trimmed.splitn(2, '=');
            let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            self.entries
                .push((key.to_string(), value.trim().to_string()));
        }
    }

    /// First value sent for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Set or overwrite a cookie. Existing duplicates of `name` are collapsed.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.entries.iter().position(|(key, _)| key == name) {
            Some(index) => {
                self.entries[index].1 = value.to_string();
                let mut seen = false;
                self.entries.retain(|(key, _)| {
                    if key != name {
                        return true;
                    }
                    let keep = !seen;
                    seen = true;
                    keep
                });
            }
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(key, _)| key != name);
    }

    /// Apply credential updates in order, the same way a browser would.
    pub fn apply(&mut self, updates: &[CookieUpdate]) {
        for update in updates {
            if update.is_removal() {
                self.remove(&update.name);
            } else {
                self.set(&update.name, &update.value);
            }
        }
    }

    /// Copy of the jar with `updates` applied.
    #[must_use]
    pub fn with_updates(&self, updates: &[CookieUpdate]) -> Self {
        let mut jar = self.clone();
        jar.apply(updates);
        jar
    }

    /// Render the jar as a single `Cookie` header value, `None` when empty.
    ///
    /// # Errors
    /// Returns an error if a cookie contains bytes not allowed in a header.
    pub fn to_header_value(&self) -> Result<Option<HeaderValue>, InvalidHeaderValue> {
        if self.entries.is_empty() {
            return Ok(None);
        }
        let rendered = self
            .entries
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&rendered).map(Some)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "Strict"),
            Self::Lax => write!(f, "Lax"),
            Self::None => write!(f, "None"),
        }
    }
}

/// Attributes sent along with a cookie value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookieOptions {
    pub path: String,
    pub max_age: Option<i64>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            max_age: None,
            http_only: true,
            secure: false,
            same_site: SameSite::Lax,
        }
    }
}

impl CookieOptions {
    #[must_use]
    pub fn with_max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}

/// A cookie the identity service asked to set (or clear).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookieUpdate {
    pub name: String,
    pub value: String,
    pub options: CookieOptions,
}

impl CookieUpdate {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>, options: CookieOptions) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            options,
        }
    }

    /// An update that expires `name` immediately.
    #[must_use]
    pub fn removal(name: impl Into<String>, options: CookieOptions) -> Self {
        Self::new(name, String::new(), options.with_max_age(0))
    }

    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.value.is_empty() && self.options.max_age == Some(0)
    }

    /// Serialize as a `Set-Cookie` header value.
    ///
    /// # Errors
    /// Returns an error if the name or value contain bytes not allowed in a header.
    pub fn to_header_value(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        let options = &self.options;
        let mut cookie = format!("{}={}; Path={}", self.name, self.value, options.path);
        if options.http_only {
            cookie.push_str("; HttpOnly");
        }
        cookie.push_str(&format!("; SameSite={}", options.same_site));
        if let Some(max_age) = options.max_age {
            cookie.push_str(&format!("; Max-Age={max_age}"));
        }
        if options.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }
}
