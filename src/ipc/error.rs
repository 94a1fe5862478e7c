use serde_json::json;

use crate::error::AppError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Failure response for a domain error. Internal detail is logged, not returned.
pub fn fail(id: &str, e: &AppError) -> serde_json::Value {
    if let AppError::Internal(detail) = e {
        tracing::error!(request_id = %id, error = %detail, "request failed");
    }
    err(id, e.code(), e.public_message(), None)
}
