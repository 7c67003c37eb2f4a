//! Response shaping helpers shared by all tool handlers

use rmcp::model::{CallToolResult, Content};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};

/// Successful tool result carrying pretty-printed JSON.
pub fn json_result(value: &Value) -> CallToolResult {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    CallToolResult::success(vec![Content::text(text)])
}

/// Failed tool result: the error travels as data so the agent can still parse it.
pub fn error_result(err: &Error) -> CallToolResult {
    let body = json!({ "error": err.to_json() });
    let text = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
    CallToolResult::error(vec![Content::text(text)])
}

/// Convert an operation outcome into a tool result.
pub fn from_result<T: Serialize>(result: Result<T>) -> CallToolResult {
    match result.and_then(|v| serde_json::to_value(v).map_err(Error::from)) {
        Ok(value) => json_result(&value),
        Err(e) => {
            tracing::debug!(kind = e.kind(), error = %e, "tool call failed");
            error_result(&e)
        }
    }
}

/// Embed one call's outcome inside a combined response: the value, or `{"error": ...}`.
pub fn inline<T: Serialize>(result: Result<T>) -> Value {
    match result.and_then(|v| serde_json::to_value(v).map_err(Error::from)) {
        Ok(value) => value,
        Err(e) => json!({ "error": e.to_json() }),
    }
}

/// Text of the first content block, for assertions.
#[cfg(test)]
pub(crate) fn result_text(result: &CallToolResult) -> String {
    result
        .content
        .first()
        .and_then(|c| c.raw.as_text())
        .map(|t| t.text.clone())
        .unwrap_or_default()
}
