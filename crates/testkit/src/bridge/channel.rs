//! Typed message channel over a framed byte stream.
//!
//! The read side has a single owner. The write side is shared: every writer
//! holds the lock for exactly one framed send (encode, write, flush), so
//! frames from different writers never interleave.

use std::io;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};

use super::codec::JsonCodec;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Peer shut down the stream (end-of-stream on read, broken pipe on write).
    #[error("channel closed by peer")]
    Closed,

    #[error("corrupt frame: {0}")]
    Corrupt(String),

    #[error("channel I/O error: {0}")]
    Io(#[source] io::Error),
}

impl ChannelError {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl From<io::Error> for ChannelError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::InvalidData => Self::Corrupt(e.to_string()),
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof => Self::Closed,
            _ => Self::Io(e),
        }
    }
}

/// Exclusive read side of a channel.
pub struct ChannelReader<R, T> {
    inner: FramedRead<R, JsonCodec<T>>,
}

impl<R, T> ChannelReader<R, T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    pub fn new(reader: R) -> Self {
        Self {
            inner: FramedRead::new(reader, JsonCodec::new()),
        }
    }

    /// Wait for the next complete message.
    pub async fn receive(&mut self) -> Result<T, ChannelError> {
        match self.inner.next().await {
            Some(Ok(item)) => Ok(item),
            Some(Err(e)) => Err(e.into()),
            None => Err(ChannelError::Closed),
        }
    }
}

/// Shared write side of a channel. Clones write to the same stream.
pub struct ChannelWriter<W, T> {
    inner: Arc<Mutex<FramedWrite<W, JsonCodec<T>>>>,
}

impl<W, T> Clone for ChannelWriter<W, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W, T> ChannelWriter<W, T>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    pub fn new(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FramedWrite::new(writer, JsonCodec::new()))),
        }
    }

    /// Write one message and flush it. Returns once the frame is on the wire.
    pub async fn send(&self, message: T) -> Result<(), ChannelError> {
        let mut writer = self.inner.lock().await;
        writer.send(message).await.map_err(ChannelError::from)
    }
}
