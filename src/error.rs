//! Error kinds surfaced by connections, clients and server dispatch.

use std::io;

use thiserror::Error;

/// Failures of the RPC transport and framing layers.
///
/// Deadline expiries are carried as [`io::ErrorKind::TimedOut`] inside the
/// operation that was cut short, so a rendered reason reads e.g.
/// `"send failed: timeout"`.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    /// The peer closed the stream. A server treats this as a normal shutdown;
    /// a client with a call in flight reports it as a receive failure.
    #[error("receive failed: connection closed by peer")]
    PeerClosed,

    #[error("parse failed: bad envelope header")]
    BadEnvelope,

    #[error("parse failed: {0}")]
    Parse(#[source] io::Error),

    #[error("method {0:#018x} is not registered")]
    UnknownMethod(u64),

    #[error("connection is closed")]
    Closed,
}

impl RpcError {
    /// True when the failure was a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        match self {
            RpcError::Connect(e) | RpcError::Send(e) | RpcError::Receive(e) => {
                e.kind() == io::ErrorKind::TimedOut
            }
            _ => false,
        }
    }
}

/// The `io::Error` used for deadline expiries.
pub(crate) fn timeout_error() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "timeout")
}
