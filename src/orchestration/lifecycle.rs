//! Worker lifecycle management
//!
//! A worker is booted once from config, handles any number of invocation
//! envelopes and is terminated when its host shuts down.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use log::{info, warn};
use serde_json::Value as JsonValue;

use crate::{
    config::Config,
    core::{Application, BridgeResult, ResponseEnvelope},
    listener,
};

use super::{adapter::DispatcherAdapter, router::RequestRouter};

/// Counters kept over a worker's life.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Envelopes that produced a response
    pub handled: u64,
    /// Responses with a 5xx status
    pub failed: u64,
    /// Envelopes rejected before dispatch
    pub rejected: u64,
}

/// A booted application ready to handle envelopes
pub struct Worker {
    adapter: DispatcherAdapter,
    handled: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

impl Worker {
    /// Build the application from config: prototype bindings, configured
    /// listeners and the route table.
    pub fn boot(config: &Config) -> BridgeResult<Self> {
        info!("Booting worker...");

        let mut app = Application::new();
        for (key, value) in &config.bindings {
            app.instance(key.clone(), value.clone());
        }

        listener::register_configured(app.listeners(), &config.bridge)?;

        let router = RequestRouter::from_config(config)?;
        info!(
            "Worker booted with {} route patterns, {} bindings, {} listeners",
            router.len(),
            config.bindings.len(),
            app.listeners().len()
        );

        Ok(Self::from_adapter(
            DispatcherAdapter::new(app, Arc::new(router))
                .with_failure_body(config.bridge.failure_body),
        ))
    }

    /// Wrap an adapter built by hand.
    pub fn from_adapter(adapter: DispatcherAdapter) -> Self {
        Self {
            adapter,
            handled: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn adapter(&self) -> &DispatcherAdapter {
        &self.adapter
    }

    /// Handle one invocation envelope.
    pub fn handle(&self, envelope: &JsonValue) -> BridgeResult<ResponseEnvelope> {
        match self.adapter.handle(envelope) {
            Ok(response) => {
                self.handled.fetch_add(1, Ordering::Relaxed);
                if response.is_server_error() {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(response)
            }
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                warn!("Rejected envelope: {e}");
                Err(e)
            }
        }
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            handled: self.handled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    /// Shut the worker down and report what it did.
    pub fn terminate(self) -> WorkerStats {
        let stats = self.stats();
        info!(
            "Worker terminated: {} handled, {} failed, {} rejected",
            stats.handled, stats.failed, stats.rejected
        );
        stats
    }
}
