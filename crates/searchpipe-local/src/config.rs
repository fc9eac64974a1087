//! Environment-backed configuration.
//!
//! Blank values count as missing everywhere, so `FOO=` in a shell or env file never
//! shadows a fallback.

use searchpipe_core::config::DEFAULT_BASE_URL;
use searchpipe_core::{Config, Error, Profile, Result};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_parsed<T: FromStr>(key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable setting, using the profile default");
            None
        }
    }
}

pub fn api_key_from_env() -> Option<String> {
    env("SEARCHPIPE_API_KEY").or_else(|| env("SEARCH_API_KEY"))
}

pub fn base_url_from_env() -> String {
    env("SEARCHPIPE_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

pub fn profile_from_env() -> Result<Profile> {
    match env("SEARCHPIPE_PROFILE") {
        Some(p) => p.parse(),
        None => Ok(Profile::default()),
    }
}

/// Build a `Config` from `SEARCHPIPE_*` variables on top of the selected profile.
///
/// Fails with `NotConfigured` when no API key is set or the profile name is unknown.
pub fn config_from_env() -> Result<Config> {
    let api_key = api_key_from_env().ok_or_else(|| {
        Error::NotConfigured(
            "no API key: set SEARCHPIPE_API_KEY (or SEARCH_API_KEY)".to_string(),
        )
    })?;
    Ok(overlay_env(Config::for_profile(
        profile_from_env()?,
        api_key,
        base_url_from_env(),
    )))
}

/// Apply the numeric overrides to an existing config.
pub fn overlay_env(mut cfg: Config) -> Config {
    if let Some(ms) = env_parsed::<u64>("SEARCHPIPE_TIMEOUT_MS") {
        cfg = cfg.with_timeout(Duration::from_millis(ms));
    }
    if let Some(n) = env_parsed::<u32>("SEARCHPIPE_MAX_RETRIES") {
        cfg = cfg.with_max_attempts(n);
    }
    if let Some(ms) = env_parsed::<u64>("SEARCHPIPE_RETRY_DELAY_MS") {
        cfg = cfg.with_retry_delay(Duration::from_millis(ms));
    }
    if let Some(ms) = env_parsed::<u64>("SEARCHPIPE_RETRY_MAX_DELAY_MS") {
        cfg = cfg.with_retry_max_delay(Duration::from_millis(ms));
    }
    if let Some(ms) = env_parsed::<u64>("SEARCHPIPE_HEALTH_TIMEOUT_MS") {
        cfg = cfg.with_health_timeout(Duration::from_millis(ms));
    }
    if let Some(s) = env_parsed::<u64>("SEARCHPIPE_CACHE_TTL_S") {
        cfg = cfg.with_cache_ttl(Duration::from_secs(s));
    }
    if let Some(n) = env_parsed::<usize>("SEARCHPIPE_CACHE_MAX_ENTRIES") {
        cfg = cfg.with_cache_max_entries(n);
    }
    cfg
}
