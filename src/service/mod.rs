//! Request dispatch for the gNMI and health services.
//!
//! # Data Flow
//! ```text
//! transport (http::server)
//!     → Dispatcher::{get, set, check, watch}
//!     → bound context to the configured timeout
//!     → AdmissionController::acquire
//!     → HandlerRegistry::resolve (origin → handler)
//!     → caller-supplied handler
//!     → aggregate response, drop admission permit
//! ```
//!
//! # Design Decisions
//! - The dispatcher owns the registry; there is no process-wide state
//! - Handler and admission errors are returned unchanged
//! - Permits and bounded contexts are released by drop on every exit path

mod gnmi;
mod health;

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use tonic::Status;

use crate::admission::AdmissionController;
use crate::config::ServerConfig;
use crate::observability::metrics;
use crate::registry::{
    self, DeleteHandler, HandlerRegistry, ReadHandler, ReplaceHandler, UpdateHandler,
};

pub use gnmi::effective_origin;
pub use health::{check_handler, watch_handler, CheckHandler, WatchHandler, WatchSink};

/// Routes protocol calls to registered handlers under admission control.
pub struct Dispatcher {
    timeout: Duration,
    admission: AdmissionController,
    registry: HandlerRegistry,
    check: ArcSwapOption<CheckHandler>,
    watch: ArcSwapOption<WatchHandler>,
}

impl Dispatcher {
    /// Build a dispatcher from a config with defaults already applied.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            timeout: config.timeout(),
            admission: AdmissionController::new(config.max_rpc_capacity()),
            registry: HandlerRegistry::new(),
            check: ArcSwapOption::empty(),
            watch: ArcSwapOption::empty(),
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register the Get handler for `origin` (empty string = default origin).
    pub fn register_read(&self, origin: impl Into<String>, handler: ReadHandler) {
        self.registry.register::<registry::Read>(origin, handler);
    }

    pub fn register_update(&self, origin: impl Into<String>, handler: UpdateHandler) {
        self.registry.register::<registry::Update>(origin, handler);
    }

    pub fn register_replace(&self, origin: impl Into<String>, handler: ReplaceHandler) {
        self.registry.register::<registry::Replace>(origin, handler);
    }

    pub fn register_delete(&self, origin: impl Into<String>, handler: DeleteHandler) {
        self.registry.register::<registry::Delete>(origin, handler);
    }

    /// Install the health Check handler, replacing any previous one.
    pub fn set_check_handler(&self, handler: CheckHandler) {
        self.check.store(Some(Arc::new(handler)));
    }

    /// Install the health Watch handler, replacing any previous one.
    pub fn set_watch_handler(&self, handler: WatchHandler) {
        self.watch.store(Some(Arc::new(handler)));
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("timeout", &self.timeout)
            .field("admission", &self.admission)
            .field("registry", &self.registry)
            .field("check", &self.check.load().is_some())
            .field("watch", &self.watch.load().is_some())
            .finish()
    }
}

/// Log and count the outcome of one call.
fn finish<T>(method: &'static str, started: Instant, result: &Result<T, Status>) {
    match result {
        Ok(_) => {
            tracing::debug!(method, elapsed = ?started.elapsed(), "RPC completed");
            metrics::record_rpc(method, tonic::Code::Ok, started);
        }
        Err(status) => {
            tracing::debug!(method, code = %status.code(), message = %status.message(), "RPC failed");
            metrics::record_rpc(method, status.code(), started);
        }
    }
}
