//! Driver side of the protocol.
//!
//! [`DriverClient`] issues one command at a time and waits for its response,
//! skipping heartbeats. Silence longer than the liveness timeout means the
//! worker is gone or wedged. [`WorkerProcess`] spawns a worker that dials
//! back to the driver and reports how its session ended.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::process::{Child, Command as ProcessCommand};

use crate::bridge::channel::{ChannelError, ChannelReader, ChannelWriter};
use crate::bridge::protocol::{Command, WorkerMessage};
use crate::config::DriverConfig;
use crate::lifecycle::SessionOutcome;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("worker reported failure: {0}")]
    Failure(String),

    #[error("unexpected response: {0:?}")]
    Unexpected(WorkerMessage),

    #[error("no message from worker in {0:?}")]
    Unresponsive(Duration),

    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub struct DriverClient<R = OwnedReadHalf, W = OwnedWriteHalf> {
    reader: ChannelReader<R, WorkerMessage>,
    writer: ChannelWriter<W, Command>,
    config: DriverConfig,
    heartbeats: u64,
}

impl DriverClient {
    pub async fn connect(
        addr: impl ToSocketAddrs,
        config: DriverConfig,
    ) -> Result<Self, DriverError> {
        let stream = TcpStream::connect(addr).await?;
        Self::from_stream(stream, config)
    }

    pub fn from_stream(stream: TcpStream, config: DriverConfig) -> Result<Self, DriverError> {
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Self::new(reader, writer, config))
    }
}

impl<R, W> DriverClient<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, config: DriverConfig) -> Self {
        Self {
            reader: ChannelReader::new(reader),
            writer: ChannelWriter::new(writer),
            config,
            heartbeats: 0,
        }
    }

    /// Heartbeats seen so far on this connection.
    pub fn heartbeats(&self) -> u64 {
        self.heartbeats
    }

    /// Send a command and wait for its response.
    pub async fn request(&mut self, command: Command) -> Result<WorkerMessage, DriverError> {
        tracing::debug!(command = command.name(), "Sending command");
        self.writer.send(command).await?;
        self.next_response().await
    }

    pub async fn get_port(&mut self) -> Result<u16, DriverError> {
        match self.request(Command::GetPort).await? {
            WorkerMessage::Port { port } => Ok(port),
            other => Err(DriverError::Unexpected(other)),
        }
    }

    /// Run a workload on the worker. Blocks until it acknowledges or fails.
    pub async fn execute_app(
        &mut self,
        workload: &str,
        thread_label: &str,
    ) -> Result<(), DriverError> {
        let command = Command::ExecuteApp {
            workload: workload.to_string(),
            thread_label: thread_label.to_string(),
        };
        match self.request(command).await? {
            WorkerMessage::Ack => Ok(()),
            WorkerMessage::Failure { reason } => Err(DriverError::Failure(reason)),
            other => Err(DriverError::Unexpected(other)),
        }
    }

    /// Next non-heartbeat message, bounded by the liveness timeout per message.
    async fn next_response(&mut self) -> Result<WorkerMessage, DriverError> {
        let timeout = self.config.liveness_timeout;
        loop {
            let message = tokio::time::timeout(timeout, self.reader.receive())
                .await
                .map_err(|_| DriverError::Unresponsive(timeout))??;

            if message.is_heartbeat() {
                self.heartbeats += 1;
                tracing::trace!(heartbeats = self.heartbeats, "Heartbeat");
                continue;
            }
            return Ok(message);
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerSpawnConfig {
    /// Address the worker must dial.
    pub driver_addr: SocketAddr,
}

/// Extension point for different worker launch strategies.
pub trait WorkerSpawner: Send + Sync {
    fn spawn(&self, config: &WorkerSpawnConfig) -> io::Result<Child>;
}

/// Launches a worker binary with `--connect <driver_addr>` plus extra arguments.
#[derive(Debug, Clone)]
pub struct BinarySpawner {
    program: PathBuf,
    args: Vec<String>,
}

impl BinarySpawner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl WorkerSpawner for BinarySpawner {
    fn spawn(&self, config: &WorkerSpawnConfig) -> io::Result<Child> {
        ProcessCommand::new(&self.program)
            .arg("--connect")
            .arg(config.driver_addr.to_string())
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
    }
}

/// A spawned worker and the driver connection it dialed.
pub struct WorkerProcess {
    child: Child,
    client: DriverClient,
}

impl WorkerProcess {
    /// Listen on loopback, spawn the worker and wait for it to connect.
    pub async fn spawn(
        spawner: &dyn WorkerSpawner,
        config: DriverConfig,
    ) -> Result<Self, DriverError> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let driver_addr = listener.local_addr()?;

        tracing::info!(%driver_addr, "Spawning worker");
        let mut child = spawner
            .spawn(&WorkerSpawnConfig { driver_addr })
            .map_err(DriverError::Spawn)?;

        let timeout = config.liveness_timeout;
        let stream = tokio::select! {
            accepted = tokio::time::timeout(timeout, listener.accept()) => {
                let (stream, peer) = accepted.map_err(|_| DriverError::Unresponsive(timeout))??;
                tracing::debug!(%peer, "Worker connected");
                stream
            }
            status = child.wait() => {
                let status = status?;
                return Err(DriverError::Spawn(io::Error::other(format!(
                    "worker exited before connecting: {status}"
                ))));
            }
        };

        let client = DriverClient::from_stream(stream, config)?;
        Ok(Self { child, client })
    }

    pub fn client(&mut self) -> &mut DriverClient {
        &mut self.client
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Close the connection and wait for the worker to exit.
    ///
    /// Returns `None` if the exit status does not map to a session outcome
    /// (killed by a signal, startup failure).
    pub async fn close(self) -> Result<Option<SessionOutcome>, DriverError> {
        let Self { mut child, client } = self;
        drop(client);

        let status = child.wait().await?;
        let outcome = status.code().and_then(SessionOutcome::from_exit_code);
        tracing::info!(%status, ?outcome, "Worker exited");
        Ok(outcome)
    }
}
