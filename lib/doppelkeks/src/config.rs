use crate::{Result, error::Error, token::Secret};
use http::Method;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::{fmt, path::Path};
use tokio::fs;

/// Thirty days
pub const DEFAULT_MAX_AGE: u64 = 2_592_000;

fn default_checked_methods() -> Vec<Method> {
    vec![Method::POST, Method::PUT, Method::DELETE]
}

fn default_max_age() -> u64 {
    DEFAULT_MAX_AGE
}

fn deserialize_methods<'de, D>(deserializer: D) -> Result<Vec<Method>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|method| {
            Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .map_err(serde::de::Error::custom)
        })
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPathMatcher {
    Exact(String),
    Pattern { pattern: String },
}

/// Path exempt from verification
#[derive(Clone, Deserialize)]
#[serde(try_from = "RawPathMatcher")]
pub enum PathMatcher {
    /// Exact match against the request path
    Exact(String),

    /// Regular expression match against the request path
    Pattern(Regex),
}

impl PathMatcher {
    #[inline]
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(exact) => exact == path,
            Self::Pattern(regex) => regex.is_match(path),
        }
    }
}

impl fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(exact) => f.debug_tuple("Exact").field(exact).finish(),
            Self::Pattern(regex) => f.debug_tuple("Pattern").field(&regex.as_str()).finish(),
        }
    }
}

impl TryFrom<RawPathMatcher> for PathMatcher {
    type Error = regex::Error;

    fn try_from(value: RawPathMatcher) -> Result<Self, Self::Error> {
        match value {
            RawPathMatcher::Exact(exact) => Ok(Self::Exact(exact)),
            RawPathMatcher::Pattern { pattern } => Regex::new(&pattern).map(Self::Pattern),
        }
    }
}

impl From<&str> for PathMatcher {
    fn from(value: &str) -> Self {
        Self::Exact(value.into())
    }
}

impl From<String> for PathMatcher {
    fn from(value: String) -> Self {
        Self::Exact(value)
    }
}

impl From<Regex> for PathMatcher {
    fn from(value: Regex) -> Self {
        Self::Pattern(value)
    }
}

/// Validator configuration
///
/// ```toml
/// secret = "at-least-thirty-two-bytes-of-secret-data"
/// checked-methods = ["POST", "PUT", "DELETE", "PATCH"]
/// excluded-paths = ["/webhooks/github", { pattern = "^/api/public/" }]
/// max-age = 86400
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Configuration {
    pub secret: Secret,
    #[serde(
        default = "default_checked_methods",
        deserialize_with = "deserialize_methods"
    )]
    pub checked_methods: Vec<Method>,
    #[serde(default)]
    pub excluded_paths: Vec<PathMatcher>,
    #[serde(default = "default_max_age")]
    pub max_age: u64,
}

impl Configuration {
    /// Configuration with the defaults and the given secret
    pub fn new<K>(secret: K) -> Result<Self>
    where
        K: AsRef<[u8]>,
    {
        Ok(Self::with_secret(Secret::new(secret)?))
    }

    #[must_use]
    pub fn with_secret(secret: Secret) -> Self {
        Self {
            secret,
            checked_methods: default_checked_methods(),
            excluded_paths: Vec::new(),
            max_age: DEFAULT_MAX_AGE,
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(Error::config)
    }

    pub async fn load<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let content = fs::read_to_string(path).await.map_err(Error::config)?;
        Self::from_toml(&content)
    }

    #[must_use]
    pub fn checked_methods<I>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = Method>,
    {
        self.checked_methods = methods.into_iter().collect();
        self
    }

    #[must_use]
    pub fn exclude_path<M>(mut self, matcher: M) -> Self
    where
        M: Into<PathMatcher>,
    {
        self.excluded_paths.push(matcher.into());
        self
    }

    pub fn exclude_pattern(self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(Error::config)?;
        Ok(self.exclude_path(regex))
    }

    #[must_use]
    pub fn max_age(mut self, max_age: u64) -> Self {
        self.max_age = max_age;
        self
    }

    #[inline]
    #[must_use]
    pub fn is_checked(&self, method: &Method) -> bool {
        self.checked_methods.contains(method)
    }

    #[inline]
    #[must_use]
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths
            .iter()
            .any(|matcher| matcher.matches(path))
    }
}
