use searchpipe_core::{Error, SearchApi};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub ok: bool,
    pub backend: &'static str,
    pub latency_ms: u64,
    pub message: String,
}

/// Single-shot connectivity check with its own (short) timeout. Never retries and never
/// touches the cache or the call stats.
pub struct HealthProber {
    api: Arc<dyn SearchApi>,
    timeout: Duration,
}

impl HealthProber {
    pub fn new(api: Arc<dyn SearchApi>, timeout: Duration) -> Self {
        Self { api, timeout }
    }

    pub async fn test_connection(&self) -> bool {
        self.check().await.ok
    }

    pub async fn check(&self) -> HealthReport {
        let t0 = Instant::now();
        let outcome = self.api.health(self.timeout).await;
        let latency_ms = t0.elapsed().as_millis() as u64;
        let backend = self.api.name();
        match outcome {
            Ok(()) => {
                info!(backend, latency_ms, "health probe ok");
                HealthReport {
                    ok: true,
                    backend,
                    latency_ms,
                    message: "Search API is reachable".to_string(),
                }
            }
            Err(e) => {
                warn!(backend, latency_ms, error = %e, "health probe failed");
                HealthReport {
                    ok: false,
                    backend,
                    latency_ms,
                    message: probe_message(&e),
                }
            }
        }
    }
}

fn probe_message(e: &Error) -> String {
    match e {
        Error::Timeout(d) => format!("Health check timeout after {}ms", d.as_millis()),
        Error::Api { status, .. } if matches!(status, 401 | 403) => {
            format!("Search API rejected the API key (HTTP {status})")
        }
        other => format!("Search API is unreachable: {other}"),
    }
}
