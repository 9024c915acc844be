//! Operations: named backend entry points with an HTTP-like address.

use serde::{Deserialize, Deserializer, Serialize};

use opbridge_http::Method;

/// Operations the runtime defines for its own introspection. They never
/// reach the registry.
pub const INTERNAL_OPERATIONS: [&str; 3] = [
    "get_bridge_endpoints",
    "get_bridge_registry",
    "invoke_bridge_endpoint",
];

/// A named, invokable unit of backend logic.
///
/// The serialized form uses the field names of the runtime's endpoint
/// listing (`operationId`, `requestModel`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub operation_id: String,

    #[serde(deserialize_with = "operation_method")]
    pub method: Method,

    /// Path template, e.g. `/users/{id}`.
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_model: Option<String>,
}

impl Operation {
    pub fn new(operation_id: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            method,
            path: path.into(),
            summary: None,
            tags: Vec::new(),
            request_model: None,
            response_model: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_models(
        mut self,
        request_model: Option<String>,
        response_model: Option<String>,
    ) -> Self {
        self.request_model = request_model;
        self.response_model = response_model;
        self
    }

    /// The summary, or `"{METHOD} {path}"` when none was given.
    pub fn display_summary(&self) -> String {
        self.summary
            .clone()
            .unwrap_or_else(|| format!("{} {}", self.method, self.path))
    }

    pub fn is_internal(&self) -> bool {
        INTERNAL_OPERATIONS.contains(&self.operation_id.as_str())
    }
}

/// Accepts any casing of the five operation methods.
fn operation_method<'de, D>(deserializer: D) -> Result<Method, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let method: Method = raw.parse().map_err(serde::de::Error::custom)?;
    if !method.is_operation_method() {
        return Err(serde::de::Error::custom(format!(
            "method {} cannot be used for an operation",
            method
        )));
    }
    Ok(method)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserialize_endpoint_listing_entry() {
        let op: Operation = serde_json::from_value(json!({
            "operationId": "get_user",
            "path": "/users/{id}",
            "method": "get",
            "summary": "Fetch one user",
            "tags": ["users"],
            "responseModel": "UserRead",
            "requestModel": null
        }))
        .unwrap();

        assert_eq!(op.operation_id, "get_user");
        assert_eq!(op.method, Method::GET);
        assert_eq!(op.tags, vec!["users".to_string()]);
        assert_eq!(op.response_model.as_deref(), Some("UserRead"));
        assert_eq!(op.request_model, None);
    }

    #[test]
    fn head_and_unknown_methods_rejected() {
        let head = serde_json::from_value::<Operation>(json!({
            "operationId": "probe", "path": "/", "method": "HEAD"
        }));
        assert!(head.is_err());

        let trace = serde_json::from_value::<Operation>(json!({
            "operationId": "trace", "path": "/", "method": "TRACE"
        }));
        assert!(trace.is_err());
    }

    #[test]
    fn serializes_with_uppercase_method() {
        let op = Operation::new("list_users", Method::GET, "/users").with_tag("users");
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({"operationId": "list_users", "method": "GET", "path": "/users", "tags": ["users"]})
        );
    }

    #[test]
    fn summary_falls_back_to_method_and_path() {
        let op = Operation::new("create_post", Method::POST, "/posts");
        assert_eq!(op.display_summary(), "POST /posts");
        assert_eq!(op.with_summary("Create").display_summary(), "Create");
    }

    #[test]
    fn internal_operations_flagged() {
        assert!(Operation::new("get_bridge_registry", Method::GET, "/bridge/registry").is_internal());
        assert!(!Operation::new("get_user", Method::GET, "/users/{id}").is_internal());
    }
}
