//! Subscriber setup for hosts that do not bring their own.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::BridgeConfig;

/// Filter used when `RUST_LOG` is unset.
pub fn default_directive(config: &BridgeConfig) -> &'static str {
    if config.debug {
        "opbridge=debug"
    } else {
        "opbridge=info"
    }
}

/// Install a fmt subscriber. `RUST_LOG` wins over the config's level.
///
/// Returns `false` when a global subscriber was already set; calling this
/// more than once is harmless.
pub fn init(config: &BridgeConfig) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .is_ok()
}
