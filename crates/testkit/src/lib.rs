//! testkit: remote control of a long-lived test worker process.
//!
//! A driver connects to a worker over one TCP connection and issues
//! GET_PORT and EXECUTE_APP commands. The worker answers each with one
//! response and writes periodic heartbeats on the same connection.

pub mod bridge;
pub mod config;
pub mod demo;
pub mod driver;
pub mod lifecycle;
pub mod logging;
pub mod worker;
pub mod workload;

pub use bridge::protocol::{Command, Response, SessionId, WorkerMessage};
pub use config::{DriverConfig, PortProvider, WorkerConfig};
pub use driver::{BinarySpawner, DriverClient, DriverError, WorkerProcess, WorkerSpawner};
pub use lifecycle::SessionOutcome;
pub use worker::{Dispatcher, DispatcherState, run_session};
pub use workload::{ExecutionContext, ExecutionError, Workload, WorkloadRegistry, current_label};
