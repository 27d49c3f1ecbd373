//! Framed codec for driver/worker messages.
//!
//! Uses LengthDelimitedCodec (4-byte big-endian prefix) for framing and
//! serde_json for the payload. Works over any AsyncRead/AsyncWrite.

use std::io;
use std::marker::PhantomData;

use serde::{Serialize, de::DeserializeOwned};
use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Frames larger than this are rejected as corrupt.
const MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

/// Codec that frames messages with a length prefix and serializes with JSON.
///
/// Malformed payloads decode to `io::ErrorKind::InvalidData`.
pub struct JsonCodec<T> {
    inner: LengthDelimitedCodec,
    _phantom: PhantomData<T>,
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .length_field_length(4)
                .max_frame_length(MAX_FRAME_LENGTH)
                .new_codec(),
            _phantom: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Decoder for JsonCodec<T> {
    type Item = T;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(bytes) => {
                let item = serde_json::from_slice(&bytes)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }
}

impl<T: Serialize> Encoder<T> for JsonCodec<T> {
    type Error = io::Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json =
            serde_json::to_vec(&item).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        tracing::trace!(json_size_bytes = json.len(), "Encoding frame");
        self.inner.encode(Bytes::from(json), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::protocol::{Command, WorkerMessage};

    #[test]
    fn codec_roundtrip_execute_app() {
        let mut codec = JsonCodec::<Command>::new();
        let mut buf = BytesMut::new();

        let cmd = Command::ExecuteApp {
            workload: "DemoWorkload".to_string(),
            thread_label: "worker-thread-1".to_string(),
        };
        codec.encode(cmd.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded, cmd);
        assert!(buf.is_empty());
    }

    #[test]
    fn codec_decodes_back_to_back_frames() {
        let mut codec = JsonCodec::<WorkerMessage>::new();
        let mut buf = BytesMut::new();

        codec.encode(WorkerMessage::Heartbeat, &mut buf).unwrap();
        codec
            .encode(WorkerMessage::Port { port: 4000 }, &mut buf)
            .unwrap();

        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(WorkerMessage::Heartbeat)
        );
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(WorkerMessage::Port { port: 4000 })
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn codec_waits_for_complete_frame() {
        let mut codec = JsonCodec::<WorkerMessage>::new();
        let mut full = BytesMut::new();
        codec.encode(WorkerMessage::Ack, &mut full).unwrap();

        let mut partial = BytesMut::from(&full[..full.len() - 1]);
        assert_eq!(codec.decode(&mut partial).unwrap(), None);
    }

    #[test]
    fn codec_rejects_non_json_payload() {
        let mut raw = LengthDelimitedCodec::builder()
            .length_field_length(4)
            .new_codec();
        let mut buf = BytesMut::new();
        raw.encode(Bytes::from_static(b"\xac\xed\x00\x05"), &mut buf)
            .unwrap();

        let mut codec = JsonCodec::<WorkerMessage>::new();
        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
