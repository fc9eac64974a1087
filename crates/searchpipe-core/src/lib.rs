use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub mod config;

pub use config::{Config, Profile};

/// Envelope `code` values observed from the remote API.
pub mod codes {
    pub const SUCCESS: &str = "SUCCESS";
    pub const NO_RESULTS: &str = "NO_RESULTS";
    pub const RATE_LIMIT_ERROR: &str = "RATE_LIMIT_ERROR";
    pub const AUTHENTICATION_ERROR: &str = "AUTHENTICATION_ERROR";
    pub const SERVER_ERROR: &str = "SERVER_ERROR";
    pub const CRAWL_ERROR: &str = "CRAWL_ERROR";
    /// Synthesized for a 404 whose body carries no envelope code.
    pub const NOT_FOUND: &str = "NOT_FOUND";
    /// Synthesized for any other non-2xx status without an envelope code.
    pub const HTTP_ERROR: &str = "HTTP_ERROR";
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("api error {code} (HTTP {status}): {message}")]
    Api {
        code: String,
        status: u16,
        message: String,
    },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl Error {
    pub fn api(code: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            status,
            message: message.into(),
        }
    }

    /// Transient failures worth another attempt: transport problems and server-side (5xx) errors.
    /// Client-side rejections and broken response contracts are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Validation(_) | Self::MalformedResponse(_) | Self::NotConfigured(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The final error of a logical call, tagged with how many attempts were made.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct RequestFailure {
    pub error: Error,
    pub attempts: u32,
}

impl RequestFailure {
    pub fn new(error: Error, attempts: u32) -> Self {
        Self { error, attempts }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Search,
    News,
    Crawl,
}

impl OperationKind {
    pub const ALL: [OperationKind; 3] = [Self::Search, Self::News, Self::Crawl];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::News => "news",
            Self::Crawl => "crawl",
        }
    }

    /// Path segment of the remote endpoint, relative to the base URL.
    pub fn endpoint(self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Day,
    Week,
    Month,
    Year,
    /// No time restriction. Never sent on the wire.
    None,
}

impl TimeRange {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
            Self::None => "none",
        }
    }

    fn wire_value(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            other => Some(other.as_str()),
        }
    }
}

impl FromStr for TimeRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            "none" | "" => Ok(Self::None),
            other => Err(Error::Validation(format!(
                "time_range must be one of day, week, month, year, none (got {other:?})"
            ))),
        }
    }
}

fn validate_query(query: &str) -> Result<()> {
    if query.trim().is_empty() {
        return Err(Error::Validation(
            "query is required and must be a non-empty string".to_string(),
        ));
    }
    Ok(())
}

/// Push `(key, value)` when the trimmed value is non-empty.
fn push_opt(out: &mut Vec<(&'static str, String)>, key: &'static str, v: Option<&str>) {
    if let Some(s) = v.map(str::trim).filter(|s| !s.is_empty()) {
        out.push((key, s.to_string()));
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParameters {
    pub query: String,
    pub language: Option<String>,
    pub country: Option<String>,
    /// 1-based result page.
    pub page: Option<u32>,
    /// Safe-search flag, 0 or 1.
    pub safe: Option<u8>,
    pub time_range: Option<TimeRange>,
    /// Result source (search engine identifier) understood by the remote API.
    pub service: Option<String>,
}

impl SearchParameters {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_safe(mut self, safe: u8) -> Self {
        self.safe = Some(safe);
        self
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = Some(time_range);
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_query(&self.query)?;
        if self.page == Some(0) {
            return Err(Error::Validation("page must be >= 1".to_string()));
        }
        if let Some(safe) = self.safe {
            if safe > 1 {
                return Err(Error::Validation(format!(
                    "safe must be 0 or 1 (got {safe})"
                )));
            }
        }
        Ok(())
    }

    /// Wire query parameters, in the remote API's naming convention.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![("q", self.query.trim().to_string())];
        push_opt(&mut out, "language", self.language.as_deref());
        push_opt(&mut out, "country", self.country.as_deref());
        if let Some(page) = self.page {
            out.push(("page", page.to_string()));
        }
        if let Some(safe) = self.safe {
            out.push(("safe", safe.to_string()));
        }
        push_opt(
            &mut out,
            "timeRange",
            self.time_range.and_then(TimeRange::wire_value),
        );
        push_opt(&mut out, "service", self.service.as_deref());
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsParameters {
    pub query: String,
    pub language: Option<String>,
    pub country: Option<String>,
    pub time_range: Option<TimeRange>,
}

impl NewsParameters {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = Some(time_range);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_query(&self.query)
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![("q", self.query.trim().to_string())];
        push_opt(&mut out, "language", self.language.as_deref());
        push_opt(&mut out, "country", self.country.as_deref());
        push_opt(
            &mut out,
            "timeRange",
            self.time_range.and_then(TimeRange::wire_value),
        );
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlParameters {
    pub url: String,
}

impl CrawlParameters {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn validate(&self) -> Result<()> {
        let raw = self.url.trim();
        let invalid = || {
            Error::Validation(format!(
                "{raw:?} is not a valid URL (expected an absolute http or https URL)"
            ))
        };
        let parsed = url::Url::parse(raw).map_err(|_| invalid())?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(invalid());
        }
        Ok(())
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![("url", self.url.trim().to_string())]
    }
}

/// One logical request against the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Operation {
    Search(SearchParameters),
    News(NewsParameters),
    Crawl(CrawlParameters),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Search(_) => OperationKind::Search,
            Self::News(_) => OperationKind::News,
            Self::Crawl(_) => OperationKind::Crawl,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Search(p) => p.validate(),
            Self::News(p) => p.validate(),
            Self::Crawl(p) => p.validate(),
        }
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Search(p) => p.query_pairs(),
            Self::News(p) => p.query_pairs(),
            Self::Crawl(p) => p.query_pairs(),
        }
    }

    /// Short human label (the query, or the crawl target) for logs and messages.
    pub fn subject(&self) -> &str {
        match self {
            Self::Search(p) => p.query.trim(),
            Self::News(p) => p.query.trim(),
            Self::Crawl(p) => p.url.trim(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: Option<String>,
    pub url: String,
    #[serde(default, alias = "snippet")]
    pub content: Option<String>,
    #[serde(default)]
    pub position: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub query: String,
    pub results: Vec<SearchHit>,
    #[serde(default)]
    pub suggestions: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsHit {
    #[serde(default)]
    pub title: Option<String>,
    pub url: String,
    #[serde(default, alias = "snippet")]
    pub content: Option<String>,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsResults {
    #[serde(default)]
    pub query: String,
    pub results: Vec<NewsHit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    /// Page metadata; values are expected to be scalars.
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum RemoteResult {
    Search(SearchResults),
    News(NewsResults),
    Crawl(CrawlResult),
}

impl RemoteResult {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Search(_) => OperationKind::Search,
            Self::News(_) => OperationKind::News,
            Self::Crawl(_) => OperationKind::Crawl,
        }
    }
}

/// The remote search API as seen by the orchestrator and the health prober.
#[async_trait::async_trait]
pub trait SearchApi: Send + Sync {
    fn name(&self) -> &'static str;
    /// One logical call, retries included.
    async fn request(&self, op: &Operation) -> std::result::Result<RemoteResult, RequestFailure>;
    /// Single-attempt connectivity/credential check.
    async fn health(&self, timeout: Duration) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// Uniform tool result: one text block plus an error flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub content: Vec<ToolContent>,
    pub is_error: bool,
}

impl ToolResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self::with_flag(text.into(), false)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::with_flag(text.into(), true)
    }

    fn with_flag(text: String, is_error: bool) -> Self {
        Self {
            content: vec![ToolContent {
                kind: "text".to_string(),
                text,
            }],
            is_error,
        }
    }

    pub fn first_text(&self) -> &str {
        self.content.first().map(|c| c.text.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStats {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub elapsed_us_sum: u64,
}

impl OperationStats {
    pub fn average_latency_ms(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.elapsed_us_sum as f64) / (self.total as f64) / 1_000.0
        }
    }
}

/// Point-in-time copy of the orchestrator's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub started_at_epoch_s: u64,
    pub operations: BTreeMap<OperationKind, OperationStats>,
}

impl StatsSnapshot {
    pub fn operation(&self, kind: OperationKind) -> OperationStats {
        self.operations.get(&kind).copied().unwrap_or_default()
    }

    pub fn total_searches(&self) -> u64 {
        self.operation(OperationKind::Search).total
    }

    pub fn total_news_searches(&self) -> u64 {
        self.operation(OperationKind::News).total
    }

    pub fn total_crawls(&self) -> u64 {
        self.operation(OperationKind::Crawl).total
    }

    pub fn total_requests(&self) -> u64 {
        self.operations.values().map(|s| s.total).sum()
    }

    pub fn successful_requests(&self) -> u64 {
        self.operations.values().map(|s| s.successful).sum()
    }

    pub fn failed_requests(&self) -> u64 {
        self.operations.values().map(|s| s.failed).sum()
    }

    pub fn average_latency_ms(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        let sum: u64 = self.operations.values().map(|s| s.elapsed_us_sum).sum();
        (sum as f64) / (total as f64) / 1_000.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            (self.hits as f64) / (lookups as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_and_whitespace_queries_are_rejected() {
        for q in ["", "   ", "\n\t"] {
            let err = SearchParameters::new(q).validate().unwrap_err();
            assert!(matches!(err, Error::Validation(ref m) if m.contains("query")));
            assert!(NewsParameters::new(q).validate().is_err());
        }
        let missing: SearchParameters = serde_json::from_str("{}").unwrap();
        assert!(missing.validate().is_err());
    }

    #[test]
    fn page_and_safe_bounds_are_enforced() {
        let p = SearchParameters::new("rust").with_page(0);
        assert!(matches!(p.validate(), Err(Error::Validation(m)) if m.contains("page")));
        let s = SearchParameters::new("rust").with_safe(2);
        assert!(matches!(s.validate(), Err(Error::Validation(m)) if m.contains("safe")));
        assert!(SearchParameters::new("rust")
            .with_page(1)
            .with_safe(1)
            .validate()
            .is_ok());
    }

    #[test]
    fn crawl_urls_must_be_absolute_http() {
        for bad in [
            "not-a-valid-url",
            "",
            "/relative/path",
            "ftp://example.com/x",
            "mailto:me@example.com",
        ] {
            let err = CrawlParameters::new(bad).validate().unwrap_err();
            assert!(
                matches!(err, Error::Validation(ref m) if m.contains("valid URL")),
                "{bad:?} -> {err}"
            );
        }
        assert!(CrawlParameters::new("https://example.com/a?b=c")
            .validate()
            .is_ok());
        assert!(CrawlParameters::new("  http://localhost:8080/ ")
            .validate()
            .is_ok());
    }

    #[test]
    fn query_pairs_use_remote_naming_and_skip_absent_fields() {
        let p = SearchParameters::new("  rust async ")
            .with_language("en")
            .with_page(2)
            .with_safe(0)
            .with_time_range(TimeRange::Week)
            .with_service("google");
        assert_eq!(
            p.query_pairs(),
            vec![
                ("q", "rust async".to_string()),
                ("language", "en".to_string()),
                ("page", "2".to_string()),
                ("safe", "0".to_string()),
                ("timeRange", "week".to_string()),
                ("service", "google".to_string()),
            ]
        );

        let none = NewsParameters::new("x").with_time_range(TimeRange::None);
        assert_eq!(none.query_pairs(), vec![("q", "x".to_string())]);
    }

    #[test]
    fn time_range_parses_case_insensitively() {
        assert_eq!("Month".parse::<TimeRange>().unwrap(), TimeRange::Month);
        assert_eq!(" none ".parse::<TimeRange>().unwrap(), TimeRange::None);
        assert!("fortnight".parse::<TimeRange>().is_err());
    }

    #[test]
    fn retryability_follows_error_class() {
        assert!(Error::Network("reset".into()).is_retryable());
        assert!(Error::Timeout(Duration::from_millis(5)).is_retryable());
        assert!(Error::api(codes::SERVER_ERROR, 503, "down").is_retryable());
        assert!(!Error::api(codes::RATE_LIMIT_ERROR, 429, "slow down").is_retryable());
        assert!(!Error::api(codes::AUTHENTICATION_ERROR, 401, "bad key").is_retryable());
        assert!(!Error::MalformedResponse("not json".into()).is_retryable());
        assert!(!Error::Validation("query".into()).is_retryable());
    }

    #[test]
    fn parses_news_hit_wire_shape() {
        let js = r#"{"title":"T","url":"https://n.example/1","content":"c","position":1,
                     "publishedDate":"2024-01-02T03:04:05Z","source":"Wire"}"#;
        let hit: NewsHit = serde_json::from_str(js).unwrap();
        assert_eq!(hit.published_date.as_deref(), Some("2024-01-02T03:04:05Z"));
        assert_eq!(hit.source.as_deref(), Some("Wire"));
        assert_eq!(hit.position, Some(1));
    }

    #[test]
    fn tool_response_serializes_with_camel_case_flag() {
        let v = serde_json::to_value(ToolResponse::error("boom")).unwrap();
        assert_eq!(v["isError"], serde_json::json!(true));
        assert_eq!(v["content"][0]["type"], serde_json::json!("text"));
        assert_eq!(v["content"][0]["text"], serde_json::json!("boom"));
    }

    #[test]
    fn stats_snapshot_derives_averages_from_sums() {
        let mut snap = StatsSnapshot::default();
        snap.operations.insert(
            OperationKind::Search,
            OperationStats {
                total: 4,
                successful: 3,
                failed: 1,
                elapsed_us_sum: 8_000,
            },
        );
        assert_eq!(snap.total_searches(), 4);
        assert_eq!(snap.total_crawls(), 0);
        assert!((snap.average_latency_ms() - 2.0).abs() < 1e-9);
        assert!((OperationStats::default().average_latency_ms()).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn search_query_pairs_always_lead_with_trimmed_query(q in "\\PC*") {
            let pairs = SearchParameters::new(q.clone()).query_pairs();
            prop_assert_eq!(pairs[0].0, "q");
            prop_assert_eq!(pairs[0].1.as_str(), q.trim());
        }
    }
}
