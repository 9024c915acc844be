//! Bridge configuration.
//!
//! Loaded from JSON (camelCase keys, every key optional):
//!
//! ```json
//! {
//!   "apiPrefix": "/api",
//!   "baseUrl": "http://localhost:8000",
//!   "packages": ["fastapi", "sqlmodel"],
//!   "debug": true,
//!   "initTimeoutMs": 60000,
//!   "callTimeoutMs": 10000
//! }
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;
use crate::target::RequestTarget;

/// Decides whether a request URL is routed through the bridge.
pub type RouteMatcher = Arc<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    /// URL path prefix routed through the bridge.
    pub api_prefix: String,

    /// Origin (and optional base path) of the emulated server. Absolute
    /// URLs on any other origin pass through to the network.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Remove `api_prefix` before matching operation paths.
    pub strip_prefix: bool,

    /// Packages installed into the runtime during initialization.
    pub packages: Vec<String>,

    /// Log every intercepted request at info level.
    pub debug: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_timeout_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_timeout_ms: Option<u64>,

    /// Runtime path backed by durable storage.
    pub mount_point: String,

    /// Flush runtime storage after each successful mutating call.
    pub persist_after_write: bool,

    #[serde(skip)]
    route_matcher: Option<RouteMatcher>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_prefix: "/api".to_string(),
            base_url: None,
            strip_prefix: true,
            packages: Vec::new(),
            debug: false,
            init_timeout_ms: None,
            call_timeout_ms: None,
            mount_point: "/data".to_string(),
            persist_after_write: true,
            route_matcher: None,
        }
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("api_prefix", &self.api_prefix)
            .field("base_url", &self.base_url)
            .field("strip_prefix", &self.strip_prefix)
            .field("packages", &self.packages)
            .field("debug", &self.debug)
            .field("init_timeout_ms", &self.init_timeout_ms)
            .field("call_timeout_ms", &self.call_timeout_ms)
            .field("mount_point", &self.mount_point)
            .field("persist_after_write", &self.persist_after_write)
            .field("route_matcher", &self.route_matcher.as_ref().map(|_| "custom"))
            .finish()
    }
}

impl BridgeConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validated()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check invariants and normalize the API prefix (no trailing `/`).
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if !self.api_prefix.is_empty() && !self.api_prefix.starts_with('/') {
            return Err(ConfigError::Invalid {
                message: format!("apiPrefix '{}' must start with '/'", self.api_prefix),
            });
        }
        self.api_prefix = self.api_prefix.trim_end_matches('/').to_string();

        if let Some(base_url) = &self.base_url {
            Url::parse(base_url).map_err(|e| ConfigError::Invalid {
                message: format!("baseUrl '{}': {}", base_url, e),
            })?;
        }

        if !self.mount_point.starts_with('/') {
            return Err(ConfigError::Invalid {
                message: format!("mountPoint '{}' must be absolute", self.mount_point),
            });
        }

        Ok(self)
    }

    /// Set the intercepted prefix. A missing leading `/` is added and
    /// trailing ones are dropped, as `validated()` would require.
    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim_end_matches('/');
        self.api_prefix = if trimmed.is_empty() || trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_packages<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.packages = packages.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout_ms = Some(duration_millis(timeout));
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = Some(duration_millis(timeout));
        self
    }

    pub fn with_persist_after_write(mut self, persist: bool) -> Self {
        self.persist_after_write = persist;
        self
    }

    /// Replace the default prefix check with a custom predicate over the raw URL.
    pub fn with_route_matcher<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.route_matcher = Some(Arc::new(matcher));
        self
    }

    pub fn init_timeout(&self) -> Option<Duration> {
        self.init_timeout_ms.map(Duration::from_millis)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    /// Parsed `base_url`. Unparseable values count as unset.
    pub fn base(&self) -> Option<Url> {
        self.base_url.as_deref().and_then(|raw| Url::parse(raw).ok())
    }

    /// Whether `url` should be intercepted.
    pub fn matches(&self, url: &str) -> bool {
        match &self.route_matcher {
            Some(matcher) => matcher(url),
            None => self.default_match(url),
        }
    }

    fn default_match(&self, url: &str) -> bool {
        RequestTarget::parse(url, self.base().as_ref())
            .is_some_and(|target| target.has_prefix(&self.api_prefix))
    }

    /// Reduce an intercepted URL to the path and query operations match on.
    pub fn resolve_target(&self, url: &str) -> Option<RequestTarget> {
        let target = RequestTarget::parse(url, self.base().as_ref())?;
        if self.strip_prefix {
            // A custom matcher may accept URLs outside the prefix.
            Some(target.strip_prefix(&self.api_prefix).unwrap_or(target))
        } else {
            Some(target)
        }
    }
}

/// Whole milliseconds, saturating instead of wrapping.
fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
