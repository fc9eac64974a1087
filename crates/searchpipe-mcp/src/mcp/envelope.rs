use rmcp::model::{CallToolResult, Content};
use searchpipe_core::ToolResponse;

pub(crate) const SCHEMA_VERSION: u64 = 1;

/// Stable keys every structured payload carries.
pub(crate) fn add_envelope_fields(payload: &mut serde_json::Value, kind: &str, elapsed_ms: u128) {
    payload["schema_version"] = serde_json::json!(SCHEMA_VERSION);
    payload["kind"] = serde_json::json!(kind);
    payload["elapsed_ms"] = serde_json::json!(elapsed_ms);
}

/// Structured content plus a text fallback for clients that only read `content[0].text`.
pub(crate) fn tool_result(payload: serde_json::Value) -> CallToolResult {
    let mut r = CallToolResult::structured(payload.clone());
    r.content = vec![Content::text(payload.to_string())];
    r
}

/// One text block; the error flag carries over unchanged.
pub(crate) fn text_result(resp: ToolResponse) -> CallToolResult {
    let content = resp
        .content
        .into_iter()
        .map(|c| Content::text(c.text))
        .collect();
    if resp.is_error {
        CallToolResult::error(content)
    } else {
        CallToolResult::success(content)
    }
}
