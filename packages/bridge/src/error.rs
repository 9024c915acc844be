//! Error taxonomy for the bridge.

use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;

use opbridge_http::Method;

use crate::route::RouteError;

/// Errors reported by the embedded runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Code inside the runtime raised. The runtime itself is still usable.
    #[error("runtime error: {0}")]
    Failed(String),

    /// The runtime itself is gone.
    #[error("runtime crashed: {0}")]
    Crashed(String),
}

/// The session could not reach the ready state.
///
/// Fatal until `initialize()` is called again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitializationError {
    #[error("failed to start runtime: {0}")]
    Start(#[source] RuntimeError),

    #[error("failed to query runtime: {0}")]
    Runtime(#[source] RuntimeError),

    #[error("failed to mount persistent storage at '{mount_point}': {source}")]
    Mount {
        mount_point: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to install package '{package}': {source}")]
    Install {
        package: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to load bridge scaffold: {0}")]
    Scaffold(#[source] RuntimeError),

    #[error("initialization timed out after {0:?}")]
    TimedOut(Duration),

    /// `teardown()` ran while this attempt was still booting.
    #[error("session was torn down during initialization")]
    Cancelled,
}

/// The operation registry rejected a set of operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("operation id '{operation_id}' is defined more than once")]
    DuplicateOperation { operation_id: String },

    #[error("operation has an empty id (path '{path}')")]
    MissingOperationId { path: String },

    #[error("operation '{operation_id}': {source}")]
    InvalidRoute {
        operation_id: String,
        #[source]
        source: RouteError,
    },
}

/// Backend source failed to load. Recoverable: retry with another source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendLoadError {
    #[error(transparent)]
    Initialization(#[from] InitializationError),

    #[error("backend failed to execute: {0}")]
    Runtime(#[source] RuntimeError),

    #[error("backend does not honor the bridge contract: {message}")]
    InvalidContract { message: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// A single operation invocation failed.
///
/// Carries the status and payload that the synthesized response uses.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("call to '{operation_id}' failed with status {status}: {message}")]
pub struct CallError {
    pub operation_id: String,
    pub status: u16,
    pub payload: Value,
    pub message: String,
    pub cause: Option<RuntimeError>,
}

impl CallError {
    /// The operation answered with an error status.
    pub fn from_status(operation_id: &str, status: u16, payload: Value) -> Self {
        let message = payload
            .get("detail")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| opbridge_http::status_text(status));
        Self {
            operation_id: operation_id.to_string(),
            status,
            payload,
            message,
            cause: None,
        }
    }

    /// The runtime raised while running the operation.
    pub fn from_runtime(operation_id: &str, error: RuntimeError) -> Self {
        let message = error.to_string();
        Self {
            operation_id: operation_id.to_string(),
            status: 500,
            payload: json!({ "detail": message }),
            message,
            cause: Some(error),
        }
    }

    /// The runtime returned something other than a `{content, status_code}` envelope.
    pub fn bad_envelope(operation_id: &str, error: serde_json::Error) -> Self {
        Self {
            operation_id: operation_id.to_string(),
            status: 502,
            payload: Value::Null,
            message: format!("malformed invocation result: {}", error),
            cause: None,
        }
    }

    pub fn timed_out(operation_id: &str, limit: Duration) -> Self {
        Self {
            operation_id: operation_id.to_string(),
            status: 504,
            payload: Value::Null,
            message: format!("no result within {:?}", limit),
            cause: None,
        }
    }

    /// The session could not be brought up to serve the call.
    pub fn unavailable(operation_id: &str, error: &InitializationError) -> Self {
        Self {
            operation_id: operation_id.to_string(),
            status: 503,
            payload: Value::Null,
            message: error.to_string(),
            cause: None,
        }
    }

    /// Whether the runtime itself died during the call.
    pub fn is_crash(&self) -> bool {
        matches!(self.cause, Some(RuntimeError::Crashed(_)))
    }
}

/// Durable storage failed. Always logged, never propagated past the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("persistence {operation} failed: {message}")]
pub struct PersistenceError {
    pub operation: &'static str,
    pub message: String,
}

impl PersistenceError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterceptError {
    #[error("an interceptor is already installed; restore() it first")]
    AlreadyInstalled,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {message}")]
    Invalid { message: String },
}

/// Umbrella error for anything that can go wrong handling an intercepted request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Call(#[from] CallError),

    #[error("No operation found for {method} {path}")]
    NoMatch { method: Method, path: String },
}

impl BridgeError {
    /// HTTP status a synthesized response for this error carries.
    pub fn status_code(&self) -> u16 {
        match self {
            BridgeError::NoMatch { .. } => 404,
            BridgeError::Call(e) => e.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_takes_detail_as_message() {
        let e = CallError::from_status("get_user", 404, json!({"detail": "User not found"}));
        assert_eq!(e.message, "User not found");
        assert_eq!(e.status, 404);
        assert!(format!("{}", e).contains("get_user"));
        assert!(!e.is_crash());
    }

    #[test]
    fn status_error_without_detail_uses_reason_phrase() {
        let e = CallError::from_status("get_user", 409, json!(["conflict"]));
        assert_eq!(e.message, "Conflict");
    }

    #[test]
    fn runtime_errors_become_500() {
        let e = CallError::from_runtime("boom", RuntimeError::Failed("ZeroDivisionError".into()));
        assert_eq!(e.status, 500);
        assert_eq!(e.payload["detail"], "runtime error: ZeroDivisionError");
        assert!(!e.is_crash());

        let e = CallError::from_runtime("boom", RuntimeError::Crashed("worker gone".into()));
        assert!(e.is_crash());
    }

    #[test]
    fn bridge_error_status_codes() {
        let no_match = BridgeError::NoMatch {
            method: Method::GET,
            path: "/nope".to_string(),
        };
        assert_eq!(no_match.status_code(), 404);
        assert_eq!(no_match.to_string(), "No operation found for GET /nope");

        let call = BridgeError::from(CallError::timed_out("slow", Duration::from_millis(5)));
        assert_eq!(call.status_code(), 504);

        let unavailable = BridgeError::from(CallError::unavailable(
            "get_user",
            &InitializationError::Cancelled,
        ));
        assert_eq!(unavailable.status_code(), 503);
        assert_eq!(
            unavailable.to_string(),
            "call to 'get_user' failed with status 503: session was torn down during initialization"
        );
    }
}
