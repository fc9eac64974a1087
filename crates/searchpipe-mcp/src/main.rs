use anyhow::Result;
use clap::{Parser, Subcommand};
use searchpipe_core::{CrawlParameters, NewsParameters, SearchParameters, TimeRange, ToolResponse};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "stdio")]
mod mcp;

#[derive(Parser, Debug)]
#[command(name = "searchpipe")]
#[command(about = "Resilient search/news/crawl over a remote search API (CLI + MCP stdio server)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as an MCP stdio server (for Cursor / MCP clients).
    #[cfg(feature = "stdio")]
    McpStdio,
    /// One-shot web search; prints the rendered results.
    Search(SearchCmd),
    /// One-shot news search; prints the rendered results.
    News(NewsCmd),
    /// Crawl one URL; prints the extracted content.
    Crawl(CrawlCmd),
    /// Diagnose configuration and connectivity (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct OutputArgs {
    /// Output format: text|json
    #[arg(long = "output", alias = "format", default_value = "text")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct SearchCmd {
    /// Search query.
    query: String,
    #[arg(long)]
    language: Option<String>,
    #[arg(long)]
    country: Option<String>,
    /// 1-based result page.
    #[arg(long)]
    page: Option<u32>,
    /// Safe search: 0 or 1.
    #[arg(long)]
    safe: Option<u8>,
    /// day|week|month|year|none
    #[arg(long)]
    time_range: Option<String>,
    /// Result source understood by the remote API.
    #[arg(long)]
    service: Option<String>,
    #[command(flatten)]
    out: OutputArgs,
}

#[derive(clap::Args, Debug)]
struct NewsCmd {
    /// News query.
    query: String,
    #[arg(long)]
    language: Option<String>,
    #[arg(long)]
    country: Option<String>,
    /// day|week|month|year|none
    #[arg(long)]
    time_range: Option<String>,
    #[command(flatten)]
    out: OutputArgs,
}

#[derive(clap::Args, Debug)]
struct CrawlCmd {
    /// Absolute http(s) URL.
    url: String,
    #[command(flatten)]
    out: OutputArgs,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Probe the remote `/health` endpoint (single attempt).
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    check_health: bool,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

/// Opt-in `KEY=VALUE` env file (`SEARCHPIPE_ENV_FILE`).
///
/// Only fills variables that are not already set; values are never logged.
fn load_env_file() {
    let Some(p) = std::env::var("SEARCHPIPE_ENV_FILE")
        .ok()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
    else {
        return;
    };
    let Ok(txt) = std::fs::read_to_string(&p) else {
        return;
    };
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let s = s.strip_prefix("export ").unwrap_or(s);
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        let v = v.trim().trim_matches('"');
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v);
        }
    }
}

/// Logs go to stderr; stdout belongs to the MCP transport and CLI output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,searchpipe=info,searchpipe_local=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn parse_time_range(raw: Option<&str>) -> Result<Option<TimeRange>> {
    raw.map(str::parse::<TimeRange>)
        .transpose()
        .map_err(|e| anyhow::anyhow!(e))
}

/// Print the response; `Ok(false)` when it is an error response.
fn emit(resp: &ToolResponse, output: &str) -> Result<bool> {
    match output.to_ascii_lowercase().as_str() {
        "json" => println!("{}", serde_json::to_string(resp)?),
        _ => println!("{}", resp.first_text()),
    }
    Ok(!resp.is_error)
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();
    init_tracing();

    let cli = Cli::parse();

    let ok = match cli.command {
        #[cfg(feature = "stdio")]
        Commands::McpStdio => {
            mcp::serve_stdio(searchpipe_local::config::config_from_env())
                .await
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
            true
        }
        Commands::Search(args) => {
            let (orchestrator, _) =
                searchpipe_local::build(searchpipe_local::config::config_from_env()?)?;
            let params = SearchParameters {
                query: args.query,
                language: args.language,
                country: args.country,
                page: args.page,
                safe: args.safe,
                time_range: parse_time_range(args.time_range.as_deref())?,
                service: args.service,
            };
            emit(&orchestrator.perform_search(&params).await, &args.out.output)?
        }
        Commands::News(args) => {
            let (orchestrator, _) =
                searchpipe_local::build(searchpipe_local::config::config_from_env()?)?;
            let params = NewsParameters {
                query: args.query,
                language: args.language,
                country: args.country,
                time_range: parse_time_range(args.time_range.as_deref())?,
            };
            emit(
                &orchestrator.perform_news_search(&params).await,
                &args.out.output,
            )?
        }
        Commands::Crawl(args) => {
            let (orchestrator, _) =
                searchpipe_local::build(searchpipe_local::config::config_from_env()?)?;
            emit(
                &orchestrator
                    .perform_crawl(&CrawlParameters::new(args.url))
                    .await,
                &args.out.output,
            )?
        }
        Commands::Doctor(args) => {
            let t0 = std::time::Instant::now();
            let mut checks: Vec<serde_json::Value> = Vec::new();
            let (configured, config_error) = match searchpipe_local::config::config_from_env() {
                Ok(cfg) => {
                    let summary = cfg.redacted_summary();
                    if args.check_health {
                        let (_, prober) = searchpipe_local::build(cfg)?;
                        let report = prober.check().await;
                        checks.push(serde_json::json!({
                            "name": "remote_health",
                            "ok": report.ok,
                            "skipped": false,
                            "elapsed_ms": report.latency_ms,
                            "message": report.message,
                        }));
                    } else {
                        checks.push(serde_json::json!({
                            "name": "remote_health",
                            "ok": true,
                            "skipped": true,
                            "elapsed_ms": 0,
                            "message": null,
                        }));
                    }
                    (summary, serde_json::Value::Null)
                }
                Err(e) => (serde_json::Value::Null, serde_json::json!(e.to_string())),
            };
            let ok = config_error.is_null()
                && checks
                    .iter()
                    .all(|c| c["ok"].as_bool().unwrap_or(false));
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "doctor",
                "ok": ok,
                "name": "searchpipe",
                "version": env!("CARGO_PKG_VERSION"),
                "elapsed_ms": t0.elapsed().as_millis() as u64,
                "features": { "stdio": cfg!(feature = "stdio") },
                "configured": configured,
                "config_error": config_error,
                "checks": checks,
            });
            println!("{v}");
            true
        }
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "searchpipe",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("searchpipe {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
            true
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
