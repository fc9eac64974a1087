use axum::Router;
use searchpipe_core::{Config, Profile};
use std::net::SocketAddr;
use std::time::Duration;

pub(crate) async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Test profile with three attempts and millisecond backoff.
pub(crate) fn test_config(addr: SocketAddr) -> Config {
    Config::for_profile(Profile::Test, "test-key", format!("http://{addr}"))
        .with_timeout(Duration::from_secs(2))
        .with_max_attempts(3)
        .with_retry_delay(Duration::from_millis(5))
        .with_retry_max_delay(Duration::from_millis(20))
}

/// A `/search` success envelope whose titles and URLs are derived from `q`.
pub(crate) fn search_payload(q: &str, n: usize) -> serde_json::Value {
    let results: Vec<serde_json::Value> = (1..=n)
        .map(|i| {
            serde_json::json!({
                "title": format!("{q} result {i}"),
                "url": format!("https://example.com/{q}/{i}"),
                "content": format!("About {q}, part {i}."),
                "position": i,
            })
        })
        .collect();
    serde_json::json!({
        "success": true,
        "data": {
            "query": q,
            "results": results,
            "suggestions": [format!("{q} tutorial")],
        },
        "message": "ok",
        "code": "SUCCESS",
    })
}
