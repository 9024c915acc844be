#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use opbridge::{
    BridgeConfig, EmbeddedRuntime, InvocationBridge, Persistence, PersistenceError, ResolvedCall,
    RuntimeError, StorageUsage,
};

/// In-memory runtime that answers from a script and records what it was asked.
#[derive(Default)]
pub struct ScriptedRuntime {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    events: Vec<String>,
    preinstalled: Vec<String>,
    endpoints: Value,
    responses: HashMap<String, Result<Value, RuntimeError>>,
    invocations: Vec<ResolvedCall>,
    files: BTreeMap<String, Vec<u8>>,
    start_failures: usize,
    run_error: Option<RuntimeError>,
    start_delay: Duration,
    invoke_delay: Duration,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self::default().with_endpoints(users_endpoints())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn with_endpoints(self, endpoints: Value) -> Self {
        self.set_endpoints(endpoints);
        self
    }

    pub fn with_preinstalled(self, packages: &[&str]) -> Self {
        self.state().preinstalled = packages.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Envelope returned for `operation_id`.
    pub fn respond(self, operation_id: &str, envelope: Value) -> Self {
        self.state()
            .responses
            .insert(operation_id.to_string(), Ok(envelope));
        self
    }

    pub fn respond_error(self, operation_id: &str, error: RuntimeError) -> Self {
        self.state()
            .responses
            .insert(operation_id.to_string(), Err(error));
        self
    }

    /// Make the next `count` starts fail.
    pub fn fail_starts(self, count: usize) -> Self {
        self.state().start_failures = count;
        self
    }

    pub fn fail_runs(self, error: RuntimeError) -> Self {
        self.state().run_error = Some(error);
        self
    }

    pub fn with_start_delay(self, delay: Duration) -> Self {
        self.state().start_delay = delay;
        self
    }

    pub fn with_invoke_delay(self, delay: Duration) -> Self {
        self.state().invoke_delay = delay;
        self
    }

    pub fn set_endpoints(&self, endpoints: Value) {
        self.state().endpoints = endpoints;
    }

    pub fn events(&self) -> Vec<String> {
        self.state().events.clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.state().events.iter().filter(|e| *e == event).count()
    }

    pub fn invocations(&self) -> Vec<ResolvedCall> {
        self.state().invocations.clone()
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state()
            .files
            .get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    fn record(&self, event: String) {
        self.state().events.push(event);
    }
}

#[async_trait]
impl EmbeddedRuntime for ScriptedRuntime {
    async fn start(&self) -> Result<(), RuntimeError> {
        let delay = self.state().start_delay;
        tokio::time::sleep(delay).await;

        let mut state = self.state();
        state.events.push("start".to_string());
        if state.start_failures > 0 {
            state.start_failures -= 1;
            return Err(RuntimeError::Failed("runtime download failed".to_string()));
        }
        Ok(())
    }

    async fn installed_packages(&self) -> Result<Vec<String>, RuntimeError> {
        Ok(self.state().preinstalled.clone())
    }

    async fn install_package(&self, package: &str) -> Result<(), RuntimeError> {
        self.record(format!("install:{}", package));
        Ok(())
    }

    async fn mount_persistent(&self, mount_point: &str) -> Result<(), RuntimeError> {
        self.record(format!("mount:{}", mount_point));
        Ok(())
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), RuntimeError> {
        self.record(format!("write:{}", path));
        self.state().files.insert(path.to_string(), contents.to_vec());
        Ok(())
    }

    async fn run(&self, _code: &str, filename: &str) -> Result<(), RuntimeError> {
        self.record(format!("run:{}", filename));
        match self.state().run_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn invoke(&self, call: &ResolvedCall) -> Result<Value, RuntimeError> {
        let delay = self.state().invoke_delay;
        tokio::time::sleep(delay).await;

        let mut state = self.state();
        state.invocations.push(call.clone());
        state
            .responses
            .get(&call.operation_id)
            .cloned()
            .unwrap_or_else(|| Ok(json!({"content": {"detail": "Not Found"}, "status_code": 404})))
    }

    async fn endpoints(&self) -> Result<Value, RuntimeError> {
        Ok(self.state().endpoints.clone())
    }

    async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.record("shutdown".to_string());
        Ok(())
    }
}

/// Persistence that counts calls and can be told to fail every one.
#[derive(Default)]
pub struct RecordingPersistence {
    saves: AtomicUsize,
    loads: AtomicUsize,
    clears: AtomicUsize,
    failing: bool,
}

impl RecordingPersistence {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    fn outcome(&self, operation: &'static str) -> Result<(), PersistenceError> {
        if self.failing {
            Err(PersistenceError::new(operation, "quota exceeded"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Persistence for RecordingPersistence {
    async fn save(&self) -> Result<(), PersistenceError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.outcome("save")
    }

    async fn load(&self) -> Result<(), PersistenceError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.outcome("load")
    }

    async fn clear(&self) -> Result<(), PersistenceError> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.outcome("clear")
    }

    async fn usage_info(&self) -> Result<StorageUsage, PersistenceError> {
        self.outcome("usage")?;
        Ok(StorageUsage {
            supported: true,
            quota: Some(1 << 30),
            usage: Some(4096),
        })
    }
}

/// A small users API plus one of the runtime's own bridge operations.
pub fn users_endpoints() -> Value {
    json!([
        {"operationId": "list_users", "method": "GET", "path": "/users", "summary": "List users", "tags": ["users"]},
        {"operationId": "create_user", "method": "POST", "path": "/users", "tags": ["users"]},
        {"operationId": "get_user", "method": "GET", "path": "/users/{id}", "tags": ["users"]},
        {"operationId": "update_user", "method": "PUT", "path": "/users/{id}", "tags": ["users"]},
        {"operationId": "get_bridge_endpoints", "method": "GET", "path": "/_bridge/endpoints"}
    ])
}

pub fn bridge_with(runtime: &Arc<ScriptedRuntime>, config: BridgeConfig) -> InvocationBridge {
    InvocationBridge::new(runtime.clone(), config)
}
