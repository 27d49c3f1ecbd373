//! Worker side of the protocol.
//!
//! A session pairs two tasks on one connection:
//! - the [`Dispatcher`] reads one command at a time, runs its handler to
//!   completion and writes the single response
//! - the heartbeat task writes keep-alives on the same write side
//!
//! The session ends on the first failure of any kind and reports a
//! [`SessionOutcome`]. Process exit is left to the caller.

mod handlers;
mod heartbeat;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::bridge::channel::{ChannelError, ChannelReader, ChannelWriter};
use crate::bridge::protocol::{Command, PING, ProtocolError, SessionId, WorkerMessage};
use crate::bridge::transport::Connection;
use crate::config::WorkerConfig;
use crate::lifecycle::SessionOutcome;
use crate::workload::{ExecutionError, WorkloadRegistry};

pub use handlers::Handlers;
pub use heartbeat::spawn_heartbeat;

/// How long a cancelled heartbeat may take to finish a pending write before
/// it is aborted. A driver that stopped reading would otherwise hold the
/// session open forever.
const HEARTBEAT_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// Waiting for the next command.
    Listening,
    /// Running a handler. No further command is read until it responds.
    Dispatching,
    /// The session is over.
    Terminated,
}

#[derive(Debug, thiserror::Error)]
enum DispatchError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Reads commands and emits responses in request order.
pub struct Dispatcher<R, W> {
    session: SessionId,
    reader: ChannelReader<R, serde_json::Value>,
    writer: ChannelWriter<W, WorkerMessage>,
    handlers: Handlers,
    state: DispatcherState,
}

impl<R, W> Dispatcher<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        session: SessionId,
        reader: ChannelReader<R, serde_json::Value>,
        writer: ChannelWriter<W, WorkerMessage>,
        handlers: Handlers,
    ) -> Self {
        Self {
            session,
            reader,
            writer,
            handlers,
            state: DispatcherState::Listening,
        }
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    /// Serve commands until the channel closes or something fails.
    pub async fn run(&mut self) -> SessionOutcome {
        let outcome = loop {
            if let Err(e) = self.step().await {
                break self.terminate(e).await;
            }
        };
        self.state = DispatcherState::Terminated;
        outcome
    }

    /// One Listening → Dispatching → Listening cycle.
    async fn step(&mut self) -> Result<(), DispatchError> {
        self.state = DispatcherState::Listening;
        let frame = self.reader.receive().await?;
        let command = Command::from_frame(frame)?;

        self.state = DispatcherState::Dispatching;
        tracing::debug!(command = command.name(), "Dispatching command");

        let response = match command {
            Command::GetPort => self.handlers.get_port(),
            Command::ExecuteApp {
                workload,
                thread_label,
            } => {
                self.handlers
                    .execute_app(self.session, &workload, &thread_label)
                    .await?
            }
            Command::Ping => return Err(ProtocolError::Unroutable(PING).into()),
        };

        self.writer.send(response.into()).await?;
        self.state = DispatcherState::Listening;
        Ok(())
    }

    async fn terminate(&self, error: DispatchError) -> SessionOutcome {
        match error {
            DispatchError::Channel(ChannelError::Closed) => {
                tracing::info!("Driver closed the channel");
                SessionOutcome::Closed
            }
            DispatchError::Channel(e) => {
                tracing::error!(error = %e, "Channel failed");
                SessionOutcome::ChannelFailed
            }
            DispatchError::Protocol(e) => {
                tracing::error!(error = %e, "Protocol violation, closing connection");
                SessionOutcome::ProtocolViolation
            }
            DispatchError::Execution(e) => {
                tracing::error!(error = %e, "Workload failed, closing connection");
                let reason = e.to_string();
                if let Err(send_err) = self
                    .writer
                    .send(WorkerMessage::Failure { reason })
                    .await
                {
                    tracing::warn!(error = %send_err, "Could not report workload failure to driver");
                }
                SessionOutcome::WorkloadFailed
            }
        }
    }
}

/// Serve one driver session to completion.
pub async fn run_session<R, W>(
    connection: Connection<R, W>,
    config: &WorkerConfig,
    registry: Arc<WorkloadRegistry>,
) -> SessionOutcome
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let session = connection.session();
    let span = tracing::info_span!(
        "session",
        session_id = %session,
        peer = ?connection.peer(),
    );

    async move {
        let (reader, writer) = connection.into_split();
        let writer = ChannelWriter::new(writer);

        let shutdown = CancellationToken::new();
        let mut heartbeat = spawn_heartbeat(
            writer.clone(),
            config.heartbeat_interval,
            shutdown.clone(),
        );

        let handlers = Handlers::new(Arc::clone(&config.port), registry);
        let mut dispatcher = Dispatcher::new(session, ChannelReader::new(reader), writer, handlers);
        tracing::info!("Session started");

        let outcome = dispatcher.run().await;

        shutdown.cancel();
        match tokio::time::timeout(HEARTBEAT_SHUTDOWN_GRACE, &mut heartbeat).await {
            Ok(Ok(sent)) => tracing::debug!(heartbeats = sent, "Heartbeat task finished"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Heartbeat task failed"),
            Err(_) => {
                tracing::warn!("Heartbeat write stalled, aborting");
                heartbeat.abort();
            }
        }

        tracing::info!(%outcome, "Session ended");
        outcome
    }
    .instrument(span)
    .await
}
