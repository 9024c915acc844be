//! Building host responses from invocation outcomes.
//!
//! Callers of an intercepted request always get a response shaped like one
//! from the network, error statuses included.

use std::collections::HashMap;

use serde_json::{json, Value};

use opbridge_http::{status_text, HttpResponse};

use crate::error::{BridgeError, CallError};
use crate::runtime::InvocationResult;

/// Permissive CORS headers added to every synthesized response.
pub const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    (
        "Access-Control-Allow-Methods",
        "GET, POST, PUT, DELETE, PATCH, OPTIONS",
    ),
    ("Access-Control-Allow-Headers", "*"),
];

pub fn cors_headers() -> HashMap<String, String> {
    CORS_HEADERS
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// Response for a successful invocation.
pub fn from_result(result: &InvocationResult) -> HttpResponse {
    json_response(result.status, result.payload.clone())
}

/// Response for any bridge failure. Status comes from the error, 500 when
/// it carries none.
pub fn from_error(error: &BridgeError) -> HttpResponse {
    match error {
        BridgeError::Call(call) => from_call_error(call),
        BridgeError::NoMatch { .. } => {
            json_response(error.status_code(), json!({ "detail": error.to_string() }))
        }
    }
}

/// An operation that answered with an error status keeps its own payload
/// as the body; errors without a payload get `{"detail": message}`.
pub fn from_call_error(error: &CallError) -> HttpResponse {
    let body = if error.payload.is_null() {
        json!({ "detail": error.message })
    } else {
        error.payload.clone()
    };
    json_response(error.status, body)
}

fn json_response(status: u16, body: Value) -> HttpResponse {
    let mut headers = cors_headers();

    // No content for these, whatever the payload said.
    if status == 204 || status == 304 {
        return HttpResponse {
            status,
            status_text: status_text(status),
            headers,
            body: Value::Null,
            body_text: Some(String::new()),
        };
    }

    headers.insert("Content-Type".to_string(), "application/json".to_string());
    let body_text = body.to_string();
    HttpResponse {
        status,
        status_text: status_text(status),
        headers,
        body,
        body_text: Some(body_text),
    }
}
