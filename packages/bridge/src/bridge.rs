//! The invocation bridge: sole owner of the embedded runtime's lifecycle.
//!
//! A bridge is a cheap handle; clones share one runtime session. The
//! session moves `Uninitialized -> Initializing -> Ready`, or to `Failed`
//! from which another `initialize()` starts over. Concurrent callers of
//! `initialize()` all await the same in-flight future.
//!
//! Operation sets are held behind an `ArcSwap`, so a reload replaces the
//! registry in one store while readers keep whatever snapshot they loaded.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::error::{
    BackendLoadError, CallError, InitializationError, RegistryError, RuntimeError,
};
use crate::operation::Operation;
use crate::persistence::{NoPersistence, Persistence, StorageUsage};
use crate::registry::OperationRegistry;
use crate::runtime::{BackendSource, EmbeddedRuntime, InvocationResult};
use crate::translate::ResolvedCall;

/// Where the runtime session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

type InitFuture = Shared<BoxFuture<'static, Result<(), InitializationError>>>;

#[derive(Default)]
enum InitSlot {
    #[default]
    Uninitialized,
    Initializing(InitFuture),
    Ready,
    Failed(InitializationError),
}

#[derive(Default)]
struct Session {
    slot: InitSlot,
    installed: BTreeSet<String>,
    mounted: Vec<String>,
    /// Bumped by teardown so a stale initialization cannot mark the new
    /// session ready.
    generation: u64,
}

struct Inner {
    runtime: Arc<dyn EmbeddedRuntime>,
    persistence: Arc<dyn Persistence>,
    config: BridgeConfig,
    scaffold: Option<BackendSource>,
    registry: ArcSwap<OperationRegistry>,
    session: Mutex<Session>,
}

/// Builder for [`InvocationBridge`].
pub struct BridgeBuilder {
    runtime: Arc<dyn EmbeddedRuntime>,
    persistence: Arc<dyn Persistence>,
    config: BridgeConfig,
    scaffold: Option<BackendSource>,
}

impl BridgeBuilder {
    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Source run once at the end of every initialization, before any
    /// backend is loaded.
    pub fn with_scaffold(mut self, scaffold: BackendSource) -> Self {
        self.scaffold = Some(scaffold);
        self
    }

    pub fn build(self) -> InvocationBridge {
        InvocationBridge {
            inner: Arc::new(Inner {
                runtime: self.runtime,
                persistence: self.persistence,
                config: self.config,
                scaffold: self.scaffold,
                registry: ArcSwap::from_pointee(OperationRegistry::new()),
                session: Mutex::new(Session::default()),
            }),
        }
    }
}

#[derive(Clone)]
pub struct InvocationBridge {
    inner: Arc<Inner>,
}

impl fmt::Debug for InvocationBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationBridge")
            .field("phase", &self.phase())
            .field("operations", &self.inner.registry.load().len())
            .finish()
    }
}

impl InvocationBridge {
    /// A bridge without durable storage.
    pub fn new(runtime: Arc<dyn EmbeddedRuntime>, config: BridgeConfig) -> Self {
        Self::builder(runtime).with_config(config).build()
    }

    pub fn builder(runtime: Arc<dyn EmbeddedRuntime>) -> BridgeBuilder {
        BridgeBuilder {
            runtime,
            persistence: Arc::new(NoPersistence),
            config: BridgeConfig::default(),
            scaffold: None,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn phase(&self) -> SessionPhase {
        match &self.inner.lock_session().slot {
            InitSlot::Uninitialized => SessionPhase::Uninitialized,
            InitSlot::Initializing(_) => SessionPhase::Initializing,
            InitSlot::Ready => SessionPhase::Ready,
            InitSlot::Failed(_) => SessionPhase::Failed,
        }
    }

    /// The error that put the session into `Failed`, if it is there.
    pub fn last_error(&self) -> Option<InitializationError> {
        match &self.inner.lock_session().slot {
            InitSlot::Failed(error) => Some(error.clone()),
            _ => None,
        }
    }

    /// Packages known to be present in the runtime, sorted.
    pub fn installed_packages(&self) -> Vec<String> {
        self.inner.lock_session().installed.iter().cloned().collect()
    }

    pub fn mounted_paths(&self) -> Vec<String> {
        self.inner.lock_session().mounted.clone()
    }

    /// Bring the session to `Ready`.
    ///
    /// Returns immediately when already ready. While an initialization is
    /// running every caller awaits that same attempt. After a failure the
    /// next call starts a fresh attempt.
    pub async fn initialize(&self) -> Result<(), InitializationError> {
        let pending = {
            let mut session = self.inner.lock_session();
            match &session.slot {
                InitSlot::Ready => return Ok(()),
                InitSlot::Initializing(pending) => pending.clone(),
                InitSlot::Uninitialized | InitSlot::Failed(_) => {
                    let inner = Arc::clone(&self.inner);
                    let generation = session.generation;
                    let pending = async move { inner.run_initialize(generation).await }
                        .boxed()
                        .shared();
                    session.slot = InitSlot::Initializing(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    /// Load backend code and replace the registry with the operations it
    /// exposes.
    ///
    /// On any error the previous operation set stays in place, so the
    /// caller can retry with another source or fall back to
    /// [`restore_operations`](Self::restore_operations).
    pub async fn load_backend(
        &self,
        source: &BackendSource,
    ) -> Result<Vec<Operation>, BackendLoadError> {
        self.initialize().await?;

        if let BackendSource::Files { entry, files } = source {
            if !files.contains_key(entry) {
                return Err(BackendLoadError::InvalidContract {
                    message: format!("entry file '{}' is not part of the source", entry),
                });
            }
        }

        info!(backend = source.name(), "loading backend");
        self.inner
            .load_source(source)
            .await
            .map_err(BackendLoadError::Runtime)?;

        let listing = self
            .inner
            .runtime
            .endpoints()
            .await
            .map_err(BackendLoadError::Runtime)?;
        let operations = decode_endpoints(listing)?;

        let operations = self.restore_operations(operations).map_err(|e| match e {
            RegistryError::DuplicateOperation { .. } => BackendLoadError::Registry(e),
            other => BackendLoadError::InvalidContract {
                message: other.to_string(),
            },
        })?;
        info!(
            backend = source.name(),
            operations = operations.len(),
            "backend loaded"
        );
        Ok(operations)
    }

    /// Replace the registry with a known operation set, e.g. one cached
    /// from an earlier successful load.
    pub fn restore_operations(
        &self,
        operations: Vec<Operation>,
    ) -> Result<Vec<Operation>, RegistryError> {
        let registry = OperationRegistry::from_operations(operations)?;
        let operations = registry.all();
        self.inner.registry.store(Arc::new(registry));
        Ok(operations)
    }

    /// Current operation set.
    pub fn get_endpoints(&self) -> Vec<Operation> {
        self.inner.registry.load().all()
    }

    /// Snapshot of the registry. Stays valid across later reloads.
    pub fn registry(&self) -> Arc<OperationRegistry> {
        self.inner.registry.load_full()
    }

    /// Run one operation and return its full result.
    ///
    /// Initializes the session on first use. A result with status 400 or
    /// above comes back as a [`CallError`] carrying that status and
    /// payload.
    pub async fn dispatch(&self, call: &ResolvedCall) -> Result<InvocationResult, CallError> {
        let operation_id = call.operation_id.as_str();
        self.initialize()
            .await
            .map_err(|e| CallError::unavailable(operation_id, &e))?;

        debug!(operation = operation_id, "invoking operation");
        let invocation = self.inner.runtime.invoke(call);
        let outcome = match self.inner.config.call_timeout() {
            Some(limit) => tokio::time::timeout(limit, invocation)
                .await
                .map_err(|_| CallError::timed_out(operation_id, limit))?,
            None => invocation.await,
        };

        let raw = match outcome {
            Ok(raw) => raw,
            Err(error) => {
                if let RuntimeError::Crashed(_) = &error {
                    self.inner.mark_crashed(&error);
                }
                return Err(CallError::from_runtime(operation_id, error));
            }
        };

        let result = InvocationResult::from_envelope(raw)
            .map_err(|e| CallError::bad_envelope(operation_id, e))?;
        if result.is_failure() {
            return Err(CallError::from_status(
                operation_id,
                result.status,
                result.payload,
            ));
        }

        if self.inner.config.persist_after_write && self.is_mutating(operation_id) {
            self.persist().await;
        }
        Ok(result)
    }

    /// Run one operation and return its payload.
    pub async fn call(&self, call: &ResolvedCall) -> Result<Value, CallError> {
        self.dispatch(call).await.map(|result| result.payload)
    }

    fn is_mutating(&self, operation_id: &str) -> bool {
        self.inner
            .registry
            .load()
            .get(operation_id)
            .is_some_and(|operation| operation.method.is_mutating())
    }

    /// Flush runtime storage. Failures are logged and swallowed.
    pub async fn persist(&self) {
        self.inner.persist().await;
    }

    /// Drop all persisted runtime state. Failures are logged and swallowed.
    pub async fn clear_storage(&self) {
        if let Err(e) = self.inner.persistence.clear().await {
            warn!(error = %e, "clearing persisted state failed");
        }
    }

    pub async fn storage_usage(&self) -> StorageUsage {
        match self.inner.persistence.usage_info().await {
            Ok(usage) => usage,
            Err(e) => {
                warn!(error = %e, "storage usage unavailable");
                StorageUsage::default()
            }
        }
    }

    /// Shut the runtime down and forget the session and its operations.
    pub async fn teardown(&self) -> Result<(), RuntimeError> {
        self.inner
            .registry
            .store(Arc::new(OperationRegistry::new()));
        let started = {
            let mut session = self.inner.lock_session();
            let started = !matches!(session.slot, InitSlot::Uninitialized);
            *session = Session {
                generation: session.generation + 1,
                ..Session::default()
            };
            started
        };
        if started {
            self.inner.runtime.shutdown().await?;
        }
        info!("runtime session torn down");
        Ok(())
    }
}

impl Inner {
    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_initialize(&self, generation: u64) -> Result<(), InitializationError> {
        info!(packages = self.config.packages.len(), "initializing runtime");
        let outcome = match self.config.init_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.boot(generation))
                .await
                .unwrap_or(Err(InitializationError::TimedOut(limit))),
            None => self.boot(generation).await,
        };

        let idle = {
            let mut session = self.lock_session();
            if session.generation == generation {
                match &outcome {
                    Ok(()) => {
                        info!("runtime ready");
                        session.slot = InitSlot::Ready;
                    }
                    Err(e) => {
                        error!(error = %e, "runtime initialization failed");
                        session.slot = InitSlot::Failed(e.clone());
                    }
                }
                return outcome;
            }
            matches!(session.slot, InitSlot::Uninitialized)
        };

        // Torn down mid-boot: the runtime may have been started again after
        // teardown's shutdown. Stop it unless a newer session now owns it.
        debug!("session torn down during initialization");
        if idle {
            if let Err(e) = self.runtime.shutdown().await {
                warn!(error = %e, "stopping abandoned runtime failed");
            }
        }
        Err(InitializationError::Cancelled)
    }

    /// Apply `update` to the session record only while it still belongs to
    /// `generation`.
    fn update_session(
        &self,
        generation: u64,
        update: impl FnOnce(&mut Session),
    ) -> Result<(), InitializationError> {
        let mut session = self.lock_session();
        if session.generation != generation {
            return Err(InitializationError::Cancelled);
        }
        update(&mut session);
        Ok(())
    }

    fn check_generation(&self, generation: u64) -> Result<(), InitializationError> {
        self.update_session(generation, |_| ())
    }

    async fn boot(&self, generation: u64) -> Result<(), InitializationError> {
        self.runtime
            .start()
            .await
            .map_err(InitializationError::Start)?;
        self.check_generation(generation)?;

        if let Err(e) = self.persistence.load().await {
            warn!(error = %e, "restoring persisted state failed");
        }
        self.check_generation(generation)?;

        let mount_point = self.config.mount_point.as_str();
        self.runtime
            .mount_persistent(mount_point)
            .await
            .map_err(|source| InitializationError::Mount {
                mount_point: mount_point.to_string(),
                source,
            })?;
        self.update_session(generation, |session| {
            if !session.mounted.iter().any(|path| path == mount_point) {
                session.mounted.push(mount_point.to_string());
            }
        })?;

        let present: BTreeSet<String> = self
            .runtime
            .installed_packages()
            .await
            .map_err(InitializationError::Runtime)?
            .into_iter()
            .collect();
        self.update_session(generation, |session| {
            session.installed.extend(present.iter().cloned())
        })?;

        let mut installed_any = false;
        for package in &self.config.packages {
            if present.contains(package) {
                debug!(package = package.as_str(), "package already installed");
                continue;
            }
            info!(package = package.as_str(), "installing package");
            self.runtime
                .install_package(package)
                .await
                .map_err(|source| InitializationError::Install {
                    package: package.clone(),
                    source,
                })?;
            self.update_session(generation, |session| {
                session.installed.insert(package.clone());
            })?;
            installed_any = true;
        }

        if let Some(scaffold) = &self.scaffold {
            self.load_source(scaffold)
                .await
                .map_err(InitializationError::Scaffold)?;
            self.check_generation(generation)?;
        }

        if installed_any {
            self.persist().await;
        }
        Ok(())
    }

    async fn load_source(&self, source: &BackendSource) -> Result<(), RuntimeError> {
        match source {
            BackendSource::Script { name, code } => self.runtime.run(code, name).await,
            BackendSource::Files { entry, files } => {
                for (path, contents) in files {
                    self.runtime.write_file(path, contents.as_bytes()).await?;
                }
                let code = files.get(entry).ok_or_else(|| {
                    RuntimeError::Failed(format!("entry file '{}' was not written", entry))
                })?;
                self.runtime.run(code, entry).await
            }
        }
    }

    async fn persist(&self) {
        match self.persistence.save().await {
            Ok(()) => debug!("runtime state persisted"),
            Err(e) => warn!(error = %e, "persisting runtime state failed"),
        }
    }

    /// A dead runtime needs a fresh initialization before the next call.
    ///
    /// The backend went down with it, so its operations stop routing until
    /// `load_backend` (or `restore_operations`) runs again.
    fn mark_crashed(&self, error: &RuntimeError) {
        error!(error = %error, "runtime crashed");
        let mut session = self.lock_session();
        if let InitSlot::Ready = session.slot {
            session.slot = InitSlot::Failed(InitializationError::Runtime(error.clone()));
            self.registry.store(Arc::new(OperationRegistry::new()));
        }
    }
}

/// Strictly decode the runtime's endpoint listing, dropping the bridge's
/// own meta-operations.
fn decode_endpoints(listing: Value) -> Result<Vec<Operation>, BackendLoadError> {
    let entries = match listing {
        Value::Array(entries) => entries,
        other => {
            return Err(BackendLoadError::InvalidContract {
                message: format!("endpoint listing is not an array: {}", other),
            })
        }
    };

    let mut operations = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let operation: Operation =
            serde_json::from_value(entry).map_err(|e| BackendLoadError::InvalidContract {
                message: format!("endpoint {}: {}", index, e),
            })?;
        if operation.is_internal() {
            debug!(operation = operation.operation_id.as_str(), "skipping bridge operation");
            continue;
        }
        operations.push(operation);
    }
    Ok(operations)
}
