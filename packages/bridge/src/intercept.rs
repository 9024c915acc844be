//! Routing the host's outgoing requests through the bridge.
//!
//! [`HostFetch`] is the host's request primitive made explicit: a slot
//! holding the current [`HttpExecutor`]. Installing an [`Interceptor`]
//! swaps the slot's executor for one that answers matching requests from
//! the embedded backend and forwards everything else, untouched, to the
//! executor it replaced. `restore()` puts that original back.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use lazy_static::lazy_static;
use tracing::{debug, debug_span, info, info_span, Instrument};
use uuid::Uuid;

use opbridge_http::{Error, HttpExecutor, HttpRequest, HttpResponse, ReqwestExecutor};

use crate::bridge::InvocationBridge;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, InterceptError};
use crate::synthesize;
use crate::translate::translate;

lazy_static! {
    static ref GLOBAL_FETCH: HostFetch = HostFetch::new(Arc::new(ReqwestExecutor::default()));
}

pub struct HostFetch {
    current: RwLock<Arc<dyn HttpExecutor>>,
    /// The executor replaced by `install()`, while installed.
    original: Mutex<Option<Arc<dyn HttpExecutor>>>,
}

impl HostFetch {
    pub fn new(executor: Arc<dyn HttpExecutor>) -> Self {
        Self {
            current: RwLock::new(executor),
            original: Mutex::new(None),
        }
    }

    /// The process-wide request primitive, backed by the network.
    pub fn global() -> &'static HostFetch {
        &GLOBAL_FETCH
    }

    /// The executor requests currently go through.
    pub fn current(&self) -> Arc<dyn HttpExecutor> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let executor = self.current();
        executor.execute(request).await
    }

    /// Route matching requests through `bridge`.
    ///
    /// Refuses while an earlier installation is active; `restore()` first.
    pub fn install(
        &self,
        bridge: InvocationBridge,
        config: BridgeConfig,
    ) -> Result<(), InterceptError> {
        let mut original = self.original.lock().unwrap_or_else(PoisonError::into_inner);
        if original.is_some() {
            return Err(InterceptError::AlreadyInstalled);
        }

        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let replaced = Arc::clone(&current);
        info!(api_prefix = config.api_prefix.as_str(), "installing request interceptor");
        *current = Arc::new(Interceptor::new(Arc::clone(&replaced), bridge, config));
        *original = Some(replaced);
        Ok(())
    }

    /// Put back the executor `install()` replaced. Returns whether there
    /// was anything to restore.
    pub fn restore(&self) -> bool {
        let mut original = self.original.lock().unwrap_or_else(PoisonError::into_inner);
        match original.take() {
            Some(replaced) => {
                *self.current.write().unwrap_or_else(PoisonError::into_inner) = replaced;
                info!("request interceptor removed");
                true
            }
            None => false,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.original
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Executor answering matching requests from the embedded backend.
pub struct Interceptor {
    original: Arc<dyn HttpExecutor>,
    bridge: InvocationBridge,
    config: BridgeConfig,
}

impl Interceptor {
    pub fn new(original: Arc<dyn HttpExecutor>, bridge: InvocationBridge, config: BridgeConfig) -> Self {
        Self {
            original,
            bridge,
            config,
        }
    }

    /// Answer an intercepted request, or say why it could not be.
    pub async fn handle(&self, request: &HttpRequest) -> Result<HttpResponse, BridgeError> {
        let method = request.method;
        let target = self
            .config
            .resolve_target(&request.url)
            .ok_or_else(|| BridgeError::NoMatch {
                method,
                path: request.url.clone(),
            })?;

        let registry = self.bridge.registry();
        let matched = method
            .is_operation_method()
            .then(|| registry.find(method, &target.path))
            .flatten()
            .ok_or_else(|| BridgeError::NoMatch {
                method,
                path: target.path.clone(),
            })?;

        let call = translate(&matched, &target, request.body.as_ref());
        debug!(
            operation = call.operation_id.as_str(),
            params = ?call.path_params,
            "matched operation"
        );

        let result = self.bridge.dispatch(&call).await?;
        Ok(synthesize::from_result(&result))
    }
}

#[async_trait]
impl HttpExecutor for Interceptor {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        if !self.config.matches(&request.url) {
            debug!(url = request.url.as_str(), "passing request through");
            return self.original.execute(request).await;
        }

        let request_id = Uuid::new_v4();
        let span = if self.config.debug {
            info_span!("intercept", %request_id, method = %request.method, url = %request.url)
        } else {
            debug_span!("intercept", %request_id, method = %request.method, url = %request.url)
        };

        async {
            let response = match self.handle(&request).await {
                Ok(response) => response,
                // A dead runtime is a transport failure, like a dropped connection.
                Err(BridgeError::Call(error)) if error.is_crash() => {
                    return Err(Error::Transport {
                        message: error.to_string(),
                    });
                }
                Err(error) => synthesize::from_error(&error),
            };
            if self.config.debug {
                info!(status = response.status, "request answered by bridge");
            } else {
                debug!(status = response.status, "request answered by bridge");
            }
            Ok(response)
        }
        .instrument(span)
        .await
    }
}
