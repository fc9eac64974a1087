//! Plain-text rendering of remote results.
//!
//! Everything the remote returned is rendered; limits belong upstream.

use searchpipe_core::{CrawlResult, NewsResults, RemoteResult, SearchResults};
use std::fmt::Write as _;

pub fn render(result: &RemoteResult) -> String {
    match result {
        RemoteResult::Search(r) => render_search(r),
        RemoteResult::News(r) => render_news(r),
        RemoteResult::Crawl(r) => render_crawl(r),
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

pub fn render_search(r: &SearchResults) -> String {
    let mut out = String::new();
    if r.results.is_empty() {
        let _ = writeln!(out, "No results found for {:?}.", r.query);
    } else {
        let _ = writeln!(
            out,
            "Search results for {:?} ({}):",
            r.query,
            plural(r.results.len(), "result", "results")
        );
    }
    for (i, hit) in r.results.iter().enumerate() {
        let rank = hit.position.unwrap_or((i + 1) as u32);
        let title = non_empty(hit.title.as_deref()).unwrap_or("(untitled)");
        let _ = write!(out, "\n{rank}. {title}\n   URL: {}\n", hit.url);
        if let Some(content) = non_empty(hit.content.as_deref()) {
            let _ = writeln!(out, "   {content}");
        }
    }
    if let Some(suggestions) = r.suggestions.as_ref().filter(|s| !s.is_empty()) {
        let _ = write!(out, "\nSuggestions: {}\n", suggestions.join(", "));
    }
    out.trim_end().to_string()
}

pub fn render_news(r: &NewsResults) -> String {
    let mut out = String::new();
    if r.results.is_empty() {
        let _ = writeln!(out, "No news found for {:?}.", r.query);
    } else {
        let _ = writeln!(
            out,
            "News results for {:?} ({}):",
            r.query,
            plural(r.results.len(), "article", "articles")
        );
    }
    for (i, hit) in r.results.iter().enumerate() {
        let rank = hit.position.unwrap_or((i + 1) as u32);
        let title = non_empty(hit.title.as_deref()).unwrap_or("(untitled)");
        let _ = write!(out, "\n{rank}. {title}\n   URL: {}\n", hit.url);
        if let Some(source) = non_empty(hit.source.as_deref()) {
            let _ = writeln!(out, "   Source: {source}");
        }
        if let Some(published) = non_empty(hit.published_date.as_deref()) {
            let _ = writeln!(out, "   Published: {published}");
        }
        if let Some(content) = non_empty(hit.content.as_deref()) {
            let _ = writeln!(out, "   {content}");
        }
    }
    out.trim_end().to_string()
}

fn scalar_text(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

pub fn render_crawl(r: &CrawlResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Crawled content from {}", r.url);
    if let Some(title) = non_empty(r.title.as_deref()) {
        let _ = writeln!(out, "Title: {title}");
    }
    match non_empty(r.content.as_deref()) {
        Some(content) => {
            let _ = write!(out, "\n{content}\n");
        }
        None => {
            let _ = write!(out, "\n(no extractable content)\n");
        }
    }
    if let Some(meta) = r.metadata.as_ref().filter(|m| !m.is_empty()) {
        let _ = write!(out, "\nMetadata:\n");
        for (k, v) in meta {
            let _ = writeln!(out, "- {k}: {}", scalar_text(v));
        }
    }
    out.trim_end().to_string()
}
