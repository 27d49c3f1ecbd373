//! Keep-alive writer sharing the session's write side with the dispatcher.

use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::bridge::channel::{ChannelError, ChannelWriter};
use crate::bridge::protocol::WorkerMessage;

/// Spawn the heartbeat task. Resolves to the number of heartbeats written.
///
/// Stops when `shutdown` is cancelled or a write fails.
pub fn spawn_heartbeat<W>(
    writer: ChannelWriter<W, WorkerMessage>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<u64>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(run_heartbeat(writer, interval, shutdown))
}

async fn run_heartbeat<W>(
    writer: ChannelWriter<W, WorkerMessage>,
    interval: Duration,
    shutdown: CancellationToken,
) -> u64
where
    W: AsyncWrite + Unpin,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    let mut sent = 0;
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            _ = ticker.tick() => {
                match writer.send(WorkerMessage::Heartbeat).await {
                    Ok(()) => sent += 1,
                    Err(ChannelError::Closed) => {
                        tracing::debug!("Channel closed, stopping heartbeat");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Heartbeat write failed");
                        break;
                    }
                }
            }
        }
    }

    tracing::trace!(sent, "Heartbeat stopped");
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::channel::ChannelReader;

    #[tokio::test]
    async fn writes_heartbeats_until_cancelled() {
        let (a, b) = tokio::io::duplex(1024);
        let writer = ChannelWriter::<_, WorkerMessage>::new(a);
        let mut reader = ChannelReader::<_, WorkerMessage>::new(b);
        let shutdown = CancellationToken::new();

        let handle = spawn_heartbeat(writer, Duration::from_millis(5), shutdown.clone());

        for _ in 0..3 {
            assert_eq!(reader.receive().await.unwrap(), WorkerMessage::Heartbeat);
        }
        shutdown.cancel();

        let sent = handle.await.unwrap();
        assert!(sent >= 3, "sent {sent}");
    }

    #[tokio::test]
    async fn stops_when_peer_disconnects() {
        let (a, b) = tokio::io::duplex(1024);
        drop(b);
        let writer = ChannelWriter::<_, WorkerMessage>::new(a);

        let handle = spawn_heartbeat(writer, Duration::from_millis(1), CancellationToken::new());

        assert_eq!(handle.await.unwrap(), 0);
    }
}
