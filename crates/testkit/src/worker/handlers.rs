//! Command handlers. Each produces exactly one [`Response`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::Instrument;

use crate::bridge::protocol::{Response, SessionId};
use crate::config::PortProvider;
use crate::workload::{ExecutionContext, ExecutionError, WorkloadRegistry, current_label, with_label};

pub struct Handlers {
    port: Arc<dyn PortProvider>,
    registry: Arc<WorkloadRegistry>,
}

impl Handlers {
    pub fn new(port: Arc<dyn PortProvider>, registry: Arc<WorkloadRegistry>) -> Self {
        Self { port, registry }
    }

    /// GET_PORT: the worker's current service port. No side effects.
    pub fn get_port(&self) -> Response {
        Response::Port(self.port.current_port())
    }

    /// EXECUTE_APP: run the named workload to completion under `thread_label`.
    ///
    /// The label is scoped to the call and the previous label is current again
    /// on every exit path, including a panic inside the workload.
    pub async fn execute_app(
        &self,
        session: SessionId,
        workload: &str,
        thread_label: &str,
    ) -> Result<Response, ExecutionError> {
        let instance = self.registry.resolve(workload)?;
        let ctx = ExecutionContext::new(thread_label, session);
        let previous = current_label();

        tracing::debug!(workload, thread_label, ?previous, "Executing workload");

        let span = tracing::info_span!("workload", workload, label = thread_label);
        let run = with_label(thread_label, instance.execute_app(&ctx));
        let result = off_scheduler(AssertUnwindSafe(run).catch_unwind().instrument(span)).await;

        debug_assert_eq!(current_label(), previous);

        match result {
            Ok(Ok(())) => {
                tracing::debug!(workload, "Workload completed");
                Ok(Response::Ack)
            }
            Ok(Err(e)) => {
                let message = format!("{e:#}");
                tracing::error!(workload, thread_label, error = %message, "Workload failed");
                Err(ExecutionError::Failed {
                    workload: workload.to_string(),
                    message,
                })
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(workload, thread_label, panic = %message, "Workload panicked");
                Err(ExecutionError::Panicked {
                    workload: workload.to_string(),
                    message,
                })
            }
        }
    }
}

/// Drive `fut` so that a workload blocking its thread does not starve the
/// session's other tasks, the heartbeat in particular.
///
/// On the multi-thread runtime the current worker thread is handed over to
/// the workload and its queued tasks move to another worker. The current-thread
/// runtime has nowhere to move them, so there the future is awaited in place.
async fn off_scheduler<F: Future>(fut: F) -> F::Output {
    let handle = Handle::current();
    match handle.runtime_flavor() {
        RuntimeFlavor::MultiThread => tokio::task::block_in_place(|| handle.block_on(fut)),
        _ => fut.await,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
