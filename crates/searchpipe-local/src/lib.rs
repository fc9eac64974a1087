//! Local implementations for searchpipe: the reqwest-backed resilient client, the in-memory
//! response cache, call statistics and the orchestrator tying them together.

use searchpipe_core::{Config, Result, SearchApi};
use std::sync::Arc;

pub mod cache;
pub mod client;
pub mod config;
pub mod health;
pub mod orchestrator;
pub mod render;
pub mod retry;
pub mod stats;

#[cfg(test)]
mod test_support;

pub use cache::ResponseCache;
pub use client::ResilientClient;
pub use health::{HealthProber, HealthReport};
pub use orchestrator::SearchOrchestrator;
pub use retry::RetryPolicy;
pub use stats::StatsAggregator;

/// Wire an orchestrator and a health prober around one shared remote client.
pub fn build(config: Config) -> Result<(SearchOrchestrator, HealthProber)> {
    let health_timeout = config.health_timeout();
    let client = ResilientClient::new(config)?;
    let cache = ResponseCache::from_config(client.config());
    let api: Arc<dyn SearchApi> = Arc::new(client);
    Ok((
        SearchOrchestrator::new(api.clone(), cache),
        HealthProber::new(api, health_timeout),
    ))
}
