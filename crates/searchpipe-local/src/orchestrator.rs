use crate::cache::ResponseCache;
use crate::render::render;
use crate::stats::StatsAggregator;
use searchpipe_core::{
    codes, CacheStats, Config, CrawlParameters, Error, NewsParameters, Operation, OperationKind,
    SearchApi, SearchParameters, StatsSnapshot, ToolResponse,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Entry point for tool calls: validate, consult the cache, call the remote, render.
///
/// Every path ends in a `ToolResponse`; failures become `is_error = true` with a readable
/// message. The cache and the stats belong to this instance alone.
pub struct SearchOrchestrator {
    api: Arc<dyn SearchApi>,
    cache: ResponseCache,
    stats: StatsAggregator,
}

impl SearchOrchestrator {
    pub fn new(api: Arc<dyn SearchApi>, cache: ResponseCache) -> Self {
        Self {
            api,
            cache,
            stats: StatsAggregator::new(),
        }
    }

    pub fn from_config(api: Arc<dyn SearchApi>, config: &Config) -> Self {
        Self::new(api, ResponseCache::from_config(config))
    }

    pub async fn perform_search(&self, params: &SearchParameters) -> ToolResponse {
        self.execute(Operation::Search(params.clone())).await
    }

    pub async fn perform_news_search(&self, params: &NewsParameters) -> ToolResponse {
        self.execute(Operation::News(params.clone())).await
    }

    pub async fn perform_crawl(&self, params: &CrawlParameters) -> ToolResponse {
        self.execute(Operation::Crawl(params.clone())).await
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Answer a call whose raw arguments never became parameters. It still counts as a
    /// failed call of `kind`.
    pub fn reject(&self, kind: OperationKind, err: &Error) -> ToolResponse {
        self.stats.record(kind, false, Duration::ZERO);
        let message = match err {
            Error::Validation(m) => invalid_input_message(kind, m),
            other => other.to_string(),
        };
        warn!(%kind, %message, "call rejected");
        ToolResponse::error(message)
    }

    async fn execute(&self, op: Operation) -> ToolResponse {
        let t0 = Instant::now();
        let kind = op.kind();
        let outcome = self.run(&op).await;
        let elapsed = t0.elapsed();
        self.stats.record(kind, outcome.is_ok(), elapsed);
        let elapsed_ms = elapsed.as_millis() as u64;
        match outcome {
            Ok(text) => {
                info!(%kind, elapsed_ms, "call succeeded");
                ToolResponse::text(text)
            }
            Err(message) => {
                warn!(%kind, elapsed_ms, %message, "call failed");
                ToolResponse::error(message)
            }
        }
    }

    async fn run(&self, op: &Operation) -> Result<String, String> {
        if let Err(e) = op.validate() {
            return Err(failure_message(op, &e, 0));
        }
        if let Some(hit) = self.cache.lookup(op) {
            debug!(kind = %op.kind(), "served from cache");
            return Ok(render(&hit));
        }
        match self.api.request(op).await {
            Ok(result) => {
                let text = render(&result);
                self.cache.store(op, result);
                Ok(text)
            }
            Err(failure) => Err(failure_message(op, &failure.error, failure.attempts)),
        }
    }
}

fn attempts_suffix(attempts: u32) -> String {
    if attempts > 1 {
        format!(" (after {attempts} attempts)")
    } else {
        String::new()
    }
}

fn invalid_input_message(kind: OperationKind, m: &str) -> String {
    match kind {
        OperationKind::Crawl => format!("Invalid URL: {m}"),
        OperationKind::Search | OperationKind::News => format!("Invalid parameters: {m}"),
    }
}

fn failure_message(op: &Operation, err: &Error, attempts: u32) -> String {
    let after = attempts_suffix(attempts);
    match err {
        Error::Validation(m) => invalid_input_message(op.kind(), m),
        Error::Api {
            code,
            status,
            message,
        } => api_failure_message(op, code, *status, message, &after),
        Error::MalformedResponse(m) => {
            format!("Invalid response from the search API: {m}")
        }
        Error::Timeout(d) => format!(
            "Request timeout: the search API did not respond within {}ms{after}",
            d.as_millis()
        ),
        Error::Network(m) => format!("Network error while contacting the search API: {m}{after}"),
        Error::NotConfigured(m) => format!("Search API is not configured: {m}"),
    }
}

fn api_failure_message(op: &Operation, code: &str, status: u16, message: &str, after: &str) -> String {
    let detail = match message.trim() {
        "" => String::new(),
        m => format!(": {m}"),
    };
    let subject = op.subject();
    if status == 429 || code == codes::RATE_LIMIT_ERROR {
        format!("Search API rate limit exceeded (HTTP {status}){detail}. Please retry later.")
    } else if matches!(status, 401 | 403) || code == codes::AUTHENTICATION_ERROR {
        format!("Authentication failed (HTTP {status}){detail}. Check that the API key is valid.")
    } else if code == codes::NO_RESULTS {
        format!("No results found for {subject:?}{detail}")
    } else if status == 404 || code == codes::CRAWL_ERROR || code == codes::NOT_FOUND {
        format!("Resource not found: {subject} (HTTP {status}, {code}){detail}")
    } else {
        format!("Search API error (HTTP {status}, {code}){detail}{after}")
    }
}
