use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgGroup, Parser};

use testkit::bridge::transport::{self, Connection, WorkerListener};
use testkit::lifecycle::{STARTUP_FAILURE_EXIT_CODE, SessionOutcome};
use testkit::{WorkerConfig, demo, logging, run_session};

/// Worker process controlled by a test driver over a single connection.
#[derive(Debug, Parser)]
#[command(name = "testkit-worker", version)]
#[command(group(ArgGroup::new("endpoint").required(true).args(["listen", "connect"])))]
struct Args {
    /// Bind here and serve the first driver that connects.
    #[arg(long, env = "TESTKIT_LISTEN")]
    listen: Option<SocketAddr>,

    /// Dial a driver listening here. Requires --port.
    #[arg(long, env = "TESTKIT_CONNECT", requires = "port")]
    connect: Option<SocketAddr>,

    /// Port reported by GET_PORT. Optional with --listen, where it defaults
    /// to the bound port.
    #[arg(long, env = "TESTKIT_PORT")]
    port: Option<u16>,

    /// Heartbeat interval in milliseconds.
    #[arg(long = "heartbeat-ms", env = "TESTKIT_HEARTBEAT_MS", default_value_t = 1000)]
    heartbeat_ms: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_tracing();
    let args = Args::parse();

    tracing::info!("testkit-worker {}", env!("CARGO_PKG_VERSION"));

    let connection = match open_connection(&args).await {
        Ok(connection) => connection,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Worker failed to start");
            return ExitCode::from(STARTUP_FAILURE_EXIT_CODE);
        }
    };

    let port = args.port.or(connection.local_port()).unwrap_or_default();
    let config = WorkerConfig::new(port)
        .with_heartbeat_interval(Duration::from_millis(args.heartbeat_ms));
    tracing::debug!(?config, "Worker configured");

    let outcome: SessionOutcome = run_session(connection, &config, Arc::new(demo::registry())).await;

    if outcome.is_success() {
        tracing::info!(%outcome, "Worker exiting");
    } else {
        tracing::error!(%outcome, exit_code = outcome.exit_code(), "Worker exiting after failure");
    }
    ExitCode::from(outcome.exit_code())
}

async fn open_connection(args: &Args) -> anyhow::Result<Connection> {
    if let Some(addr) = args.listen {
        let listener = WorkerListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let local = listener.local_addr()?;
        tracing::info!(%local, "Waiting for driver");
        println!("LISTENING {local}");
        return listener.accept().await.context("failed to accept driver");
    }

    if let Some(addr) = args.connect {
        return transport::connect(addr)
            .await
            .with_context(|| format!("failed to connect to driver at {addr}"));
    }

    anyhow::bail!("one of --listen or --connect is required")
}
