use rmcp::{
    handler::server::router::tool::ToolRouter as RmcpToolRouter,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, ServiceExt,
};
use schemars::JsonSchema;
use searchpipe_core::{
    Config, CrawlParameters, Error, NewsParameters, OperationKind, SearchParameters, TimeRange,
    ToolResponse,
};
use searchpipe_local::{HealthProber, SearchOrchestrator};
use serde::Deserialize;
use std::sync::Arc;

mod envelope;
use envelope::*;

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub(crate) struct SearchArgs {
    /// Search query (required, non-empty).
    #[serde(default)]
    pub(crate) query: Option<String>,
    /// Result language, e.g. "en".
    #[serde(default)]
    pub(crate) language: Option<String>,
    /// Country code, e.g. "us".
    #[serde(default)]
    pub(crate) country: Option<String>,
    /// 1-based result page (integer, or a numeric string).
    #[serde(default)]
    pub(crate) page: Option<serde_json::Value>,
    /// Safe search: 0 (off) or 1 (on).
    #[serde(default)]
    pub(crate) safe: Option<serde_json::Value>,
    /// One of: day, week, month, year, none.
    #[serde(default)]
    pub(crate) time_range: Option<String>,
    /// Result source understood by the remote API (e.g. "google").
    #[serde(default)]
    pub(crate) service: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub(crate) struct NewsArgs {
    /// News query (required, non-empty).
    #[serde(default)]
    pub(crate) query: Option<String>,
    #[serde(default)]
    pub(crate) language: Option<String>,
    #[serde(default)]
    pub(crate) country: Option<String>,
    /// One of: day, week, month, year, none.
    #[serde(default)]
    pub(crate) time_range: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub(crate) struct CrawlArgs {
    /// Absolute http(s) URL to crawl.
    #[serde(default)]
    pub(crate) url: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub(crate) struct SearchpipeUsageArgs {}

fn time_range(raw: Option<&str>) -> searchpipe_core::Result<Option<TimeRange>> {
    raw.map(str::parse::<TimeRange>).transpose()
}

/// Integer argument given as a JSON number or a numeric string; `null` counts as absent.
fn int_arg(name: &str, raw: Option<&serde_json::Value>) -> searchpipe_core::Result<Option<i64>> {
    use serde_json::Value;
    let invalid = |v: &Value| Error::Validation(format!("{name} must be an integer (got {v})"));
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(v @ Value::Number(n)) => n.as_i64().map(Some).ok_or_else(|| invalid(v)),
        Some(v @ Value::String(s)) => s.trim().parse::<i64>().map(Some).map_err(|_| invalid(v)),
        Some(v) => Err(invalid(v)),
    }
}

// Values that fit the field type go on to `SearchParameters::validate` for the range check.
fn page_arg(raw: Option<&serde_json::Value>) -> searchpipe_core::Result<Option<u32>> {
    int_arg("page", raw)?
        .map(|n| {
            u32::try_from(n)
                .map_err(|_| Error::Validation(format!("page must be >= 1 (got {n})")))
        })
        .transpose()
}

fn safe_arg(raw: Option<&serde_json::Value>) -> searchpipe_core::Result<Option<u8>> {
    int_arg("safe", raw)?
        .map(|n| {
            u8::try_from(n)
                .map_err(|_| Error::Validation(format!("safe must be 0 or 1 (got {n})")))
        })
        .transpose()
}

impl SearchArgs {
    pub(crate) fn into_params(self) -> searchpipe_core::Result<SearchParameters> {
        Ok(SearchParameters {
            query: self.query.unwrap_or_default(),
            language: self.language,
            country: self.country,
            page: page_arg(self.page.as_ref())?,
            safe: safe_arg(self.safe.as_ref())?,
            time_range: time_range(self.time_range.as_deref())?,
            service: self.service,
        })
    }
}

impl NewsArgs {
    pub(crate) fn into_params(self) -> searchpipe_core::Result<NewsParameters> {
        Ok(NewsParameters {
            query: self.query.unwrap_or_default(),
            language: self.language,
            country: self.country,
            time_range: time_range(self.time_range.as_deref())?,
        })
    }
}

struct Backend {
    orchestrator: SearchOrchestrator,
    prober: HealthProber,
}

#[derive(Clone)]
pub(crate) struct SearchpipeMcp {
    tool_router: RmcpToolRouter<Self>,
    // A missing API key keeps the server up; every tool then reports "not configured".
    backend: Arc<Result<Backend, searchpipe_core::Error>>,
}

#[tool_router]
impl SearchpipeMcp {
    pub(crate) fn new(config: searchpipe_core::Result<Config>) -> Self {
        let backend = config.and_then(searchpipe_local::build).map(|(orchestrator, prober)| {
            Backend {
                orchestrator,
                prober,
            }
        });
        if let Err(e) = &backend {
            tracing::warn!(error = %e, "search backend unavailable");
        }
        Self {
            tool_router: Self::tool_router(),
            backend: Arc::new(backend),
        }
    }

    fn backend(&self) -> Result<&Backend, CallToolResult> {
        match &*self.backend {
            Ok(b) => Ok(b),
            Err(e) => Err(text_result(ToolResponse::error(format!("Search API {e}")))),
        }
    }

    #[tool(description = "Web search through the remote search API (cached, retried). Returns ranked titles, URLs and snippets as text.")]
    async fn search(
        &self,
        params: Parameters<Option<SearchArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let backend = match self.backend() {
            Ok(b) => b,
            Err(r) => return Ok(r),
        };
        let args = params.0.unwrap_or_default();
        let resp = match args.into_params() {
            Ok(p) => backend.orchestrator.perform_search(&p).await,
            Err(e) => backend.orchestrator.reject(OperationKind::Search, &e),
        };
        Ok(text_result(resp))
    }

    #[tool(description = "News search through the remote search API (cached, retried). Returns headlines with source and publication date.")]
    async fn news(&self, params: Parameters<Option<NewsArgs>>) -> Result<CallToolResult, McpError> {
        let backend = match self.backend() {
            Ok(b) => b,
            Err(r) => return Ok(r),
        };
        let args = params.0.unwrap_or_default();
        let resp = match args.into_params() {
            Ok(p) => backend.orchestrator.perform_news_search(&p).await,
            Err(e) => backend.orchestrator.reject(OperationKind::News, &e),
        };
        Ok(text_result(resp))
    }

    #[tool(description = "Fetch a web page through the remote crawl endpoint and return its title, text and metadata.")]
    async fn crawl(&self, params: Parameters<Option<CrawlArgs>>) -> Result<CallToolResult, McpError> {
        let backend = match self.backend() {
            Ok(b) => b,
            Err(r) => return Ok(r),
        };
        let args = params.0.unwrap_or_default();
        let p = CrawlParameters::new(args.url.unwrap_or_default());
        Ok(text_result(backend.orchestrator.perform_crawl(&p).await))
    }

    #[tool(description = "Single-attempt connectivity and API key check against the remote search API")]
    async fn health(&self) -> Result<CallToolResult, McpError> {
        let backend = match self.backend() {
            Ok(b) => b,
            Err(r) => return Ok(r),
        };
        let report = backend.prober.check().await;
        let text = format!("{} ({}ms)", report.message, report.latency_ms);
        Ok(text_result(if report.ok {
            ToolResponse::text(text)
        } else {
            ToolResponse::error(text)
        }))
    }

    #[tool(description = "Report in-process call and cache stats since server start (no secrets)")]
    async fn searchpipe_usage(
        &self,
        _params: Parameters<Option<SearchpipeUsageArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let t0 = std::time::Instant::now();
        let backend = match self.backend() {
            Ok(b) => b,
            Err(r) => return Ok(r),
        };
        let stats = backend.orchestrator.stats();
        let cache = backend.orchestrator.cache_stats();
        let mut payload = serde_json::json!({
            "ok": true,
            "started_at_epoch_s": stats.started_at_epoch_s,
            "totals": {
                "requests": stats.total_requests(),
                "successful": stats.successful_requests(),
                "failed": stats.failed_requests(),
                "searches": stats.total_searches(),
                "news_searches": stats.total_news_searches(),
                "crawls": stats.total_crawls(),
                "average_latency_ms": stats.average_latency_ms(),
            },
            "operations": stats.operations,
            "cache": {
                "hits": cache.hits,
                "misses": cache.misses,
                "entries": cache.entries,
                "hit_rate": cache.hit_rate(),
            },
        });
        add_envelope_fields(&mut payload, "searchpipe_usage", t0.elapsed().as_millis());
        Ok(tool_result(payload))
    }
}

#[tool_handler]
impl rmcp::ServerHandler for SearchpipeMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Search, news and crawl through a remote search API with retries, timeouts and a response cache. Results are plain text."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

pub(crate) async fn serve_stdio(config: searchpipe_core::Result<Config>) -> Result<(), McpError> {
    let svc = SearchpipeMcp::new(config);
    let running = svc
        .serve(stdio())
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    running
        .waiting()
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(())
}
