use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.search1api.com";

/// Preset defaults. `Test` keeps integration runs fast: one attempt, tiny delays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Production,
    Test,
}

impl Profile {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

impl FromStr for Profile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "prod" | "production" => Ok(Self::Production),
            "test" | "integration" => Ok(Self::Test),
            other => Err(Error::NotConfigured(format!(
                "unknown profile {other:?} (expected production or test)"
            ))),
        }
    }
}

/// Connection, retry and cache settings. Immutable once built; the `with_*` methods consume
/// and return a new value.
#[derive(Clone)]
pub struct Config {
    api_key: String,
    base_url: String,
    profile: Profile,
    timeout: Duration,
    max_attempts: u32,
    retry_base_delay: Duration,
    retry_max_delay: Duration,
    health_timeout: Duration,
    cache_ttl: Duration,
    cache_max_entries: usize,
}

impl Config {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self::for_profile(Profile::Production, api_key, base_url)
    }

    pub fn for_profile(
        profile: Profile,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let base = Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim().trim_end_matches('/').to_string(),
            profile,
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(1_000),
            retry_max_delay: Duration::from_secs(10),
            health_timeout: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(3_600),
            cache_max_entries: 1_000,
        };
        match profile {
            Profile::Production => base,
            Profile::Test => Self {
                timeout: Duration::from_secs(5),
                max_attempts: 1,
                retry_base_delay: Duration::from_millis(10),
                retry_max_delay: Duration::from_millis(100),
                health_timeout: Duration::from_secs(1),
                cache_ttl: Duration::from_secs(60),
                cache_max_entries: 100,
                ..base
            },
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total attempts per logical call, including the first. Clamped to at least 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, base: Duration) -> Self {
        self.retry_base_delay = base;
        self
    }

    pub fn with_retry_max_delay(mut self, max: Duration) -> Self {
        self.retry_max_delay = max;
        self
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// 0 means unbounded.
    pub fn with_cache_max_entries(mut self, n: usize) -> Self {
        self.cache_max_entries = n;
        self
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn retry_base_delay(&self) -> Duration {
        self.retry_base_delay
    }

    pub fn retry_max_delay(&self) -> Duration {
        self.retry_max_delay
    }

    pub fn health_timeout(&self) -> Duration {
        self.health_timeout
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    pub fn cache_max_entries(&self) -> usize {
        self.cache_max_entries
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Config summary safe to print: the API key is reduced to a presence flag.
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "base_url": self.base_url,
            "profile": self.profile.as_str(),
            "api_key_present": !self.api_key.trim().is_empty(),
            "timeout_ms": self.timeout.as_millis() as u64,
            "max_attempts": self.max_attempts,
            "retry_base_delay_ms": self.retry_base_delay.as_millis() as u64,
            "retry_max_delay_ms": self.retry_max_delay.as_millis() as u64,
            "health_timeout_ms": self.health_timeout.as_millis() as u64,
            "cache_ttl_s": self.cache_ttl.as_secs(),
            "cache_max_entries": self.cache_max_entries,
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("profile", &self.profile)
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("retry_max_delay", &self.retry_max_delay)
            .field("health_timeout", &self.health_timeout)
            .field("cache_ttl", &self.cache_ttl)
            .field("cache_max_entries", &self.cache_max_entries)
            .finish()
    }
}
