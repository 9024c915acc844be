//! # opbridge
//!
//! Serve a web backend's API from an embedded runtime, in-process.
//!
//! Host code keeps issuing ordinary HTTP-shaped requests. Once the
//! [`Interceptor`] is installed into [`HostFetch`], requests under the API
//! prefix never reach the network: they are matched against the backend's
//! operations, translated into a [`ResolvedCall`], run inside the runtime
//! by the [`InvocationBridge`] and answered with a synthesized response.
//! Everything else passes through untouched.
//!
//! ```ignore
//! use std::sync::Arc;
//! use opbridge::{BackendSource, BridgeConfig, HostFetch, InvocationBridge};
//! use opbridge_http::HttpRequest;
//!
//! let config = BridgeConfig::from_file("bridge.json")?;
//! let bridge = InvocationBridge::new(Arc::new(runtime), config.clone());
//! bridge.load_backend(&BackendSource::script("main.py", source)).await?;
//!
//! let fetch = HostFetch::global();
//! fetch.install(bridge, config)?;
//! let response = fetch.fetch(HttpRequest::get("/api/users/7")).await?;
//! assert_eq!(response.status, 200);
//! fetch.restore();
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod intercept;
pub mod logging;
pub mod operation;
pub mod persistence;
pub mod registry;
pub mod route;
pub mod runtime;
pub mod synthesize;
pub mod target;
pub mod translate;

pub use bridge::{BridgeBuilder, InvocationBridge, SessionPhase};
pub use config::{BridgeConfig, RouteMatcher};
pub use error::{
    BackendLoadError, BridgeError, CallError, ConfigError, InitializationError, InterceptError,
    PersistenceError, RegistryError, RuntimeError,
};
pub use intercept::{HostFetch, Interceptor};
pub use operation::Operation;
pub use persistence::{NoPersistence, Persistence, StorageUsage};
pub use registry::{OperationRegistry, RouteMatch};
pub use route::{PathParams, RouteError, RoutePattern, Segment};
pub use runtime::{BackendSource, EmbeddedRuntime, InvocationResult};
pub use target::RequestTarget;
pub use translate::{translate, QueryParams, ResolvedCall};
