//! Worker and driver configuration.

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of the port reported by GET_PORT.
///
/// Stands in for the worker's own service entry point, which may only learn
/// its port after binding.
pub trait PortProvider: Send + Sync {
    fn current_port(&self) -> u16;
}

impl PortProvider for u16 {
    fn current_port(&self) -> u16 {
        *self
    }
}

impl PortProvider for AtomicU16 {
    fn current_port(&self) -> u16 {
        self.load(Ordering::SeqCst)
    }
}

impl<P: PortProvider + ?Sized> PortProvider for Arc<P> {
    fn current_port(&self) -> u16 {
        (**self).current_port()
    }
}

#[derive(Clone)]
pub struct WorkerConfig {
    pub port: Arc<dyn PortProvider>,
    pub heartbeat_interval: Duration,
}

impl WorkerConfig {
    pub fn new(port: impl PortProvider + 'static) -> Self {
        Self {
            port: Arc::new(port),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

impl std::fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("port", &self.port.current_port())
            .field("heartbeat_interval", &self.heartbeat_interval)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// How long the driver waits without receiving any message, heartbeats
    /// included, before declaring the worker unresponsive.
    pub liveness_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            liveness_timeout: DEFAULT_LIVENESS_TIMEOUT,
        }
    }
}

impl DriverConfig {
    pub fn with_liveness_timeout(mut self, timeout: Duration) -> Self {
        self.liveness_timeout = timeout;
        self
    }
}
