//! Built-in lifecycle listeners.

pub mod access_log;
pub mod prometheus;

use std::sync::Arc;

use log::info;

use crate::{
    config::Bridge,
    core::{BridgeResult, ListenerRegistry},
};

pub use access_log::AccessLogListener;
pub use prometheus::PrometheusListener;

/// Register the listeners enabled in the bridge config.
pub fn register_configured(registry: &ListenerRegistry, bridge: &Bridge) -> BridgeResult<()> {
    if let Some(access_log) = &bridge.access_log {
        registry.register(Arc::new(AccessLogListener::new(access_log)?));
        info!("Access log enabled: {}", access_log.format);
    }

    if bridge.prometheus {
        registry.register(Arc::new(PrometheusListener::new()));
        info!("Prometheus metrics enabled");
    }

    Ok(())
}
