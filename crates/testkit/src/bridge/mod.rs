//! Wire layer between the driver and the worker.
//!
//! - **protocol**: Command and WorkerMessage types, session identifiers
//! - **codec**: length-prefixed JSON framing for AsyncRead/AsyncWrite
//! - **channel**: typed send/receive with a write side shared between writers
//! - **transport**: TCP listen/connect producing a [`transport::Connection`]

pub mod channel;
pub mod codec;
pub mod protocol;
pub mod transport;
