//! The embedded runtime contract.
//!
//! The runtime is a black box that can run code, install packages and
//! touch its own filesystem. Once a backend is loaded it also answers two
//! bridge calls: `invoke` (returning a `{content, status_code}` envelope)
//! and `endpoints` (the operation listing). Both come back as raw JSON and
//! are validated by the bridge, never trusted.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RuntimeError;
use crate::translate::ResolvedCall;

#[async_trait]
pub trait EmbeddedRuntime: Send + Sync {
    /// Load the runtime itself.
    async fn start(&self) -> Result<(), RuntimeError>;

    /// Packages already present, e.g. restored from a persisted session.
    async fn installed_packages(&self) -> Result<Vec<String>, RuntimeError>;

    async fn install_package(&self, package: &str) -> Result<(), RuntimeError>;

    /// Back `mount_point` with durable storage.
    async fn mount_persistent(&self, mount_point: &str) -> Result<(), RuntimeError>;

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), RuntimeError>;

    /// Execute source code. `filename` is used for tracebacks only.
    async fn run(&self, code: &str, filename: &str) -> Result<(), RuntimeError>;

    /// Run one operation. Returns the raw `{content, status_code}` envelope.
    async fn invoke(&self, call: &ResolvedCall) -> Result<Value, RuntimeError>;

    /// The raw endpoint listing of the loaded backend.
    async fn endpoints(&self) -> Result<Value, RuntimeError>;

    async fn shutdown(&self) -> Result<(), RuntimeError>;
}

/// Backend code to load into the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum BackendSource {
    /// A single script.
    Script { name: String, code: String },
    /// A file tree written into the runtime, then `entry` is run.
    Files {
        entry: String,
        files: BTreeMap<String, String>,
    },
}

impl BackendSource {
    pub fn script(name: impl Into<String>, code: impl Into<String>) -> Self {
        BackendSource::Script {
            name: name.into(),
            code: code.into(),
        }
    }

    /// Name used in logs.
    pub fn name(&self) -> &str {
        match self {
            BackendSource::Script { name, .. } => name,
            BackendSource::Files { entry, .. } => entry,
        }
    }
}

/// Outcome of one invocation.
///
/// A status of 400 or above is a failure even though the runtime call
/// itself returned normally.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationResult {
    pub payload: Value,
    pub status: u16,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Envelope {
    #[serde(default)]
    content: Value,
    #[serde(default)]
    status_code: Option<u16>,
}

impl InvocationResult {
    pub fn new(payload: Value, status: u16) -> Self {
        Self { payload, status }
    }

    pub fn ok(payload: Value) -> Self {
        Self::new(payload, 200)
    }

    /// Decode the runtime's `{content, status_code}` envelope. A missing
    /// status means 200.
    pub fn from_envelope(raw: Value) -> Result<Self, serde_json::Error> {
        let envelope: Envelope = serde_json::from_value(raw)?;
        Ok(Self {
            payload: envelope.content,
            status: envelope.status_code.unwrap_or(200),
        })
    }

    pub fn is_failure(&self) -> bool {
        self.status >= 400
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_decodes() {
        let result =
            InvocationResult::from_envelope(json!({"content": {"id": 7}, "status_code": 201}))
                .unwrap();
        assert_eq!(result, InvocationResult::new(json!({"id": 7}), 201));
        assert!(!result.is_failure());
    }

    #[test]
    fn missing_status_defaults_to_200() {
        let result = InvocationResult::from_envelope(json!({"content": [1, 2]})).unwrap();
        assert_eq!(result.status, 200);
    }

    #[test]
    fn error_status_is_failure() {
        let result =
            InvocationResult::from_envelope(json!({"content": {"detail": "nope"}, "status_code": 404}))
                .unwrap();
        assert!(result.is_failure());
    }

    #[test]
    fn malformed_envelopes_rejected() {
        assert!(InvocationResult::from_envelope(json!([1, 2, 3])).is_err());
        assert!(InvocationResult::from_envelope(json!({"content": 1, "status_code": "200"})).is_err());
        assert!(InvocationResult::from_envelope(json!({"data": 1})).is_err());
    }

    #[test]
    fn backend_source_tagged_by_format() {
        let source: BackendSource = serde_json::from_value(json!({
            "format": "files",
            "entry": "main.py",
            "files": {"main.py": "print('hi')"}
        }))
        .unwrap();
        assert_eq!(source.name(), "main.py");
        assert_eq!(BackendSource::script("app.py", "").name(), "app.py");
    }
}
