use axum::{extract::Query, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use rmcp::{
    model::CallToolRequestParam,
    service::{RoleClient, RunningService, ServiceExt},
    transport::{ConfigureCommandExt, TokioChildProcess},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn text_of(r: &rmcp::model::CallToolResult) -> String {
    r.content
        .iter()
        .filter_map(|c| c.as_text().map(|t| t.text.clone()))
        .collect::<Vec<_>>()
        .join("\n")
}

async fn call(
    service: &RunningService<RoleClient, ()>,
    name: &'static str,
    args: serde_json::Value,
) -> rmcp::model::CallToolResult {
    service
        .call_tool(CallToolRequestParam {
            name: name.to_string().into(),
            arguments: Some(args.as_object().cloned().unwrap()),
        })
        .await
        .expect("call_tool")
}

async fn spawn(
    addr: SocketAddr,
    extra: &[(&str, &str)],
) -> Result<RunningService<RoleClient, ()>, Box<dyn std::error::Error>> {
    let bin = assert_cmd::cargo::cargo_bin!("searchpipe");
    let extra: Vec<(String, String)> = extra
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let service = ()
        .serve(TokioChildProcess::new(
            tokio::process::Command::new(bin).configure(|cmd| {
                cmd.args(["mcp-stdio"]);
                cmd.env("RUST_LOG", "off");
                cmd.env_remove("SEARCHPIPE_ENV_FILE");
                cmd.env("SEARCHPIPE_API_KEY", "k");
                cmd.env("SEARCHPIPE_BASE_URL", format!("http://{addr}"));
                cmd.env("SEARCHPIPE_PROFILE", "test");
                for (k, v) in &extra {
                    cmd.env(k, v);
                }
            }),
        )?)
        .await?;
    Ok(service)
}

#[tokio::test]
async fn mcp_stdio_exposes_the_search_tools() -> Result<(), Box<dyn std::error::Error>> {
    let addr = serve(Router::new()).await;
    let service = spawn(addr, &[]).await?;
    let tools = service.list_tools(Default::default()).await?;
    let names: std::collections::HashSet<String> =
        tools.tools.iter().map(|t| t.name.to_string()).collect();
    for must in ["search", "news", "crawl", "health", "searchpipe_usage"] {
        assert!(names.contains(must), "missing required tool: {must}");
    }
    service.cancel().await?;
    Ok(())
}

#[tokio::test]
async fn mcp_stdio_search_retries_caches_and_counts() -> Result<(), Box<dyn std::error::Error>> {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new().route(
        "/search",
        get({
            let hits = hits.clone();
            move |Query(q): Query<HashMap<String, String>>| {
                let n = hits.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n <= 2 {
                        return StatusCode::SERVICE_UNAVAILABLE.into_response();
                    }
                    let query = q.get("q").cloned().unwrap_or_default();
                    Json(serde_json::json!({
                        "success": true,
                        "data": {
                            "query": query,
                            "results": [{"title": "Tokio", "url": "https://tokio.rs", "content": "runtime"}]
                        }
                    }))
                    .into_response()
                }
            }
        }),
    );
    let addr = serve(app).await;
    let service = spawn(
        addr,
        &[
            ("SEARCHPIPE_MAX_RETRIES", "3"),
            ("SEARCHPIPE_RETRY_DELAY_MS", "5"),
        ],
    )
    .await?;

    let first = call(&service, "search", serde_json::json!({"query": "tokio"})).await;
    assert_eq!(first.is_error, Some(false), "{}", text_of(&first));
    assert!(text_of(&first).contains("https://tokio.rs"));
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    let second = call(&service, "search", serde_json::json!({"query": "tokio"})).await;
    assert_eq!(text_of(&second), text_of(&first));
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    let empty = call(&service, "search", serde_json::json!({"query": ""})).await;
    assert_eq!(empty.is_error, Some(true));
    assert!(text_of(&empty).contains("query"));

    let usage = call(&service, "searchpipe_usage", serde_json::json!({})).await;
    let v = usage.structured_content.clone().expect("structured usage");
    assert_eq!(v["totals"]["searches"].as_u64(), Some(3));
    assert_eq!(v["totals"]["failed"].as_u64(), Some(1));
    assert_eq!(v["cache"]["hits"].as_u64(), Some(1));

    service.cancel().await?;
    Ok(())
}

#[tokio::test]
async fn mcp_stdio_crawl_rejects_bad_urls() -> Result<(), Box<dyn std::error::Error>> {
    let addr = serve(Router::new()).await;
    let service = spawn(addr, &[]).await?;
    let r = call(&service, "crawl", serde_json::json!({"url": "not-a-valid-url"})).await;
    assert_eq!(r.is_error, Some(true));
    assert!(text_of(&r).contains("valid URL"));
    service.cancel().await?;
    Ok(())
}
