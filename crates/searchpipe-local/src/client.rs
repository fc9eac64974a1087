use crate::retry::RetryPolicy;
use searchpipe_core::{
    codes, Config, CrawlResult, Error, NewsResults, Operation, OperationKind, RemoteResult,
    RequestFailure, Result, SearchApi, SearchResults,
};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

fn is_success_status(status: u16) -> bool {
    (200..300).contains(&status)
}

fn code_for_status(status: u16) -> &'static str {
    match status {
        401 | 403 => codes::AUTHENTICATION_ERROR,
        404 => codes::NOT_FOUND,
        429 => codes::RATE_LIMIT_ERROR,
        500..=599 => codes::SERVER_ERROR,
        _ => codes::HTTP_ERROR,
    }
}

fn api_error(status: u16, env: &Envelope) -> Error {
    let code = env
        .code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| code_for_status(status));
    let message = env
        .message
        .clone()
        .filter(|m| !m.trim().is_empty())
        .or_else(|| {
            reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .map(str::to_string)
        })
        .unwrap_or_default();
    Error::api(code, status, message)
}

/// Parse the response envelope, turning non-2xx statuses into `Error::Api`.
///
/// A 2xx body that is not a JSON object breaks the contract (`MalformedResponse`); a non-2xx
/// body is allowed to be anything, the status alone decides the error code then.
fn parse_envelope(status: u16, body: &[u8]) -> Result<Envelope> {
    match serde_json::from_slice::<Envelope>(body) {
        Ok(env) if is_success_status(status) => Ok(env),
        Ok(env) => Err(api_error(status, &env)),
        Err(e) if is_success_status(status) => Err(Error::MalformedResponse(format!(
            "response body is not a valid JSON envelope: {e}"
        ))),
        Err(_) => Err(api_error(status, &Envelope::default())),
    }
}

pub(crate) fn decode_result(kind: OperationKind, status: u16, body: &[u8]) -> Result<RemoteResult> {
    let env = parse_envelope(status, body)?;
    match env.success {
        Some(true) => {}
        Some(false) => return Err(api_error(status, &env)),
        None => {
            return Err(Error::MalformedResponse(
                "response envelope is missing the `success` flag".to_string(),
            ))
        }
    }
    let data = env.data.filter(|d| !d.is_null()).ok_or_else(|| {
        Error::MalformedResponse(format!("{kind} response is missing the `data` field"))
    })?;
    // serde's struct derive also accepts sequences; only objects are valid payloads.
    if !data.is_object() {
        return Err(Error::MalformedResponse(format!(
            "{kind} `data` must be a JSON object"
        )));
    }
    let decoded = match kind {
        OperationKind::Search => serde_json::from_value::<SearchResults>(data).map(RemoteResult::Search),
        OperationKind::News => serde_json::from_value::<NewsResults>(data).map(RemoteResult::News),
        OperationKind::Crawl => serde_json::from_value::<CrawlResult>(data).map(RemoteResult::Crawl),
    };
    let decoded =
        decoded.map_err(|e| Error::MalformedResponse(format!("invalid {kind} `data`: {e}")))?;
    if let RemoteResult::Crawl(c) = &decoded {
        if c.url.trim().is_empty() {
            return Err(Error::MalformedResponse(
                "crawl `data` has an empty `url`".to_string(),
            ));
        }
    }
    Ok(decoded)
}

/// Upper bound on TCP/TLS connection setup, below the per-attempt timeout for most profiles.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// The budget that actually ran out when reqwest itself reports a timeout.
fn expired_budget(attempt_timeout: Duration, connect_phase: bool) -> Duration {
    if connect_phase {
        attempt_timeout.min(CONNECT_TIMEOUT)
    } else {
        attempt_timeout
    }
}

/// HTTP client for the remote search API: per-attempt timeout, retry with backoff, and
/// classification of every failure into `searchpipe_core::Error`.
#[derive(Debug, Clone)]
pub struct ResilientClient {
    http: reqwest::Client,
    config: Config,
    policy: RetryPolicy,
}

impl ResilientClient {
    pub fn new(config: Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("searchpipe/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::NotConfigured(format!("http client: {e}")))?;
        Ok(Self::with_http(http, config))
    }

    pub fn with_http(http: reqwest::Client, config: Config) -> Self {
        let policy = RetryPolicy::from_config(&config);
        debug!(
            max_attempts = policy.max_attempts,
            timeout_ms = config.timeout().as_millis() as u64,
            max_backoff_ms = policy.max_total_delay().as_millis() as u64,
            "search api client ready"
        );
        Self {
            http,
            config,
            policy,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// One logical call under an explicit per-attempt timeout.
    pub async fn request_with_timeout(
        &self,
        op: &Operation,
        timeout: Duration,
    ) -> std::result::Result<RemoteResult, RequestFailure> {
        let kind = op.kind();
        let url = self.config.endpoint(kind.endpoint());
        let pairs = op.query_pairs();
        self.policy
            .run(|attempt| {
                debug!(%kind, attempt, "sending request");
                let url = url.as_str();
                let pairs = pairs.as_slice();
                async move {
                    let (status, body) = self.get(url, pairs, timeout).await?;
                    decode_result(kind, status, &body)
                }
            })
            .await
    }

    /// Single attempt against `/health`; succeeds only on 2xx with `success: true`.
    pub async fn health_with_timeout(&self, timeout: Duration) -> Result<()> {
        let (status, body) = self
            .get(&self.config.endpoint("health"), &[], timeout)
            .await?;
        let env = parse_envelope(status, &body)?;
        match env.success {
            Some(true) => Ok(()),
            _ => Err(api_error(status, &env)),
        }
    }

    async fn get(
        &self,
        url: &str,
        pairs: &[(&'static str, String)],
        timeout: Duration,
    ) -> Result<(u16, Vec<u8>)> {
        let mut rb = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json");
        if !pairs.is_empty() {
            rb = rb.query(pairs);
        }
        let key = self.config.api_key().trim();
        if !key.is_empty() {
            rb = rb.bearer_auth(key);
        }

        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                Error::Timeout(expired_budget(timeout, e.is_connect()))
            } else {
                Error::Network(e.to_string())
            }
        };
        let t0 = Instant::now();
        let exchange = async {
            let resp = rb.send().await.map_err(classify)?;
            let status = resp.status().as_u16();
            let body = resp.bytes().await.map_err(classify)?;
            Ok::<_, Error>((status, body.to_vec()))
        };
        // Dropping the future abandons the exchange; the caller only needs the logical outcome.
        let out = match tokio::time::timeout(timeout, exchange).await {
            Ok(r) => r,
            Err(_) => Err(Error::Timeout(timeout)),
        };
        debug!(
            url,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            ok = out.is_ok(),
            "http exchange finished"
        );
        out
    }
}

#[async_trait::async_trait]
impl SearchApi for ResilientClient {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn request(&self, op: &Operation) -> std::result::Result<RemoteResult, RequestFailure> {
        self.request_with_timeout(op, self.config.timeout()).await
    }

    async fn health(&self, timeout: Duration) -> Result<()> {
        self.health_with_timeout(timeout).await
    }
}
