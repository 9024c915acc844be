//! Decomposing an intercepted request into a [`ResolvedCall`].
//!
//! Translation is a pure function of its inputs. Query values stay strings;
//! coercing them to the operation's parameter types is the runtime's job.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use opbridge_http::RequestBody;

use crate::registry::RouteMatch;
use crate::route::PathParams;
use crate::target::RequestTarget;

/// Query parameters. A key seen once maps to a string, a repeated key to
/// an array of strings in URL order.
pub type QueryParams = BTreeMap<String, Value>;

/// Everything the runtime needs to run one operation. Built per request
/// and never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCall {
    pub operation_id: String,
    #[serde(default)]
    pub path_params: PathParams,
    #[serde(default)]
    pub query_params: QueryParams,
    #[serde(default)]
    pub body: Option<Value>,
}

impl ResolvedCall {
    pub fn new(operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            path_params: PathParams::new(),
            query_params: QueryParams::new(),
            body: None,
        }
    }

    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params
            .insert(name.into(), Value::String(value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Build the call for a matched route.
pub fn translate(
    matched: &RouteMatch<'_>,
    target: &RequestTarget,
    body: Option<&RequestBody>,
) -> ResolvedCall {
    ResolvedCall {
        operation_id: matched.operation.operation_id.clone(),
        path_params: matched.params.clone(),
        query_params: target
            .query
            .as_deref()
            .map(parse_query)
            .unwrap_or_default(),
        body: body.and_then(decode_body),
    }
}

/// Form-decode a raw query string.
pub fn parse_query(query: &str) -> QueryParams {
    let mut params = QueryParams::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let value = Value::String(value.into_owned());
        match params.get_mut(key.as_ref()) {
            None => {
                params.insert(key.into_owned(), value);
            }
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
    params
}

/// Turn a request body into the JSON handed to the runtime.
///
/// Text bodies are literal-normalized and parsed; text that still is not
/// JSON is passed on unchanged as a JSON string. Blank text means no body.
pub fn decode_body(body: &RequestBody) -> Option<Value> {
    match body {
        RequestBody::Json(value) => Some(value.clone()),
        RequestBody::Text(text) if text.trim().is_empty() => None,
        RequestBody::Text(text) => {
            let normalized = normalize_literals(text);
            Some(
                serde_json::from_str(&normalized)
                    .unwrap_or_else(|_| Value::String(text.clone())),
            )
        }
    }
}

/// Rewrite the runtime's `True`/`False`/`None` tokens to JSON literals.
///
/// Only whole tokens outside string literals are touched, so
/// `"Trueish"` and `{"name": "None"}` come through unchanged.
pub fn normalize_literals(text: &str) -> Cow<'_, str> {
    let mut out = String::with_capacity(text.len());
    let mut changed = false;
    let mut in_string = false;
    let mut escaped = false;
    let mut token_start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }

        if c.is_alphanumeric() || c == '_' {
            token_start.get_or_insert(i);
            continue;
        }

        if let Some(start) = token_start.take() {
            changed |= push_token(&mut out, &text[start..i]);
        }
        if c == '"' {
            in_string = true;
        }
        out.push(c);
    }

    if let Some(start) = token_start {
        changed |= push_token(&mut out, &text[start..]);
    }

    if changed {
        Cow::Owned(out)
    } else {
        Cow::Borrowed(text)
    }
}

/// Append `token`, rewritten if it is a runtime literal. Returns whether it was.
fn push_token(out: &mut String, token: &str) -> bool {
    let literal = match token {
        "True" => "true",
        "False" => "false",
        "None" => "null",
        _ => {
            out.push_str(token);
            return false;
        }
    };
    out.push_str(literal);
    true
}
