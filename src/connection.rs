//! The per-connection I/O state machine.
//!
//! A [`TcpConnection`] owns one stream socket and one input buffer and moves
//! through `Idle -> Connecting -> Ready -> Closed`; `Closed` is terminal.
//! Connections accepted by a listener skip `Connecting` and start `Ready`.
//!
//! Each operation is bounded by its entry in [`Timeouts`]. The inline
//! operations ([`connect`](TcpConnection::connect),
//! [`send`](TcpConnection::send), [`receive`](TcpConnection::receive)) race
//! the socket against an armed [`DeadlineTimer`] and complete the caller in
//! place. The deferred pairs ([`begin_send`](TcpConnection::begin_send) /
//! [`wait_for_send`](TcpConnection::wait_for_send) and
//! [`begin_receive`](TcpConnection::begin_receive) /
//! [`wait_for_receive`](TcpConnection::wait_for_receive)) measure the
//! deadline from the moment the operation was submitted, so a caller may do
//! other work between the two halves without stretching the deadline.
//!
//! Callback-style usage is built on top: a driver task owns the connection
//! and runs the inline operations, delivering results through channels (see
//! the server dispatch loop and the async client).

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, trace};

use crate::codec::RpcBuffer;
use crate::error::{timeout_error, RpcError};
use crate::timer::DeadlineTimer;

/// Per-operation deadlines. A zero duration disables that deadline.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timeouts {
    pub connect: Duration,
    pub send: Duration,
    pub receive: Duration,
}

impl Timeouts {
    /// The same deadline for connect, send and receive.
    pub fn uniform(duration: Duration) -> Self {
        Timeouts { connect: duration, send: duration, receive: duration }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Ready,
    Closed,
}

/// Tail space guaranteed ahead of every socket read.
const READ_CHUNK: usize = 4096;

/// One stream socket plus the buffering and deadline state around it.
#[derive(Debug)]
pub struct TcpConnection {
    stream: Option<TcpStream>,
    state: ConnectionState,
    input: RpcBuffer,
    local: Option<SocketAddr>,
    remote: Option<SocketAddr>,
    timeouts: Timeouts,
    timer: DeadlineTimer,
    submitted: Option<Instant>,
}

impl TcpConnection {
    pub fn new(timeouts: Timeouts) -> Self {
        TcpConnection {
            stream: None,
            state: ConnectionState::Idle,
            input: RpcBuffer::new(),
            local: None,
            remote: None,
            timeouts,
            timer: DeadlineTimer::new(),
            submitted: None,
        }
    }

    /// Wraps a socket accepted by a listener; the connection starts `Ready`.
    pub fn accepted(stream: TcpStream) -> Self {
        let _ = stream.set_nodelay(true);
        let local = stream.local_addr().ok();
        let remote = stream.peer_addr().ok();
        TcpConnection {
            stream: Some(stream),
            state: ConnectionState::Ready,
            input: RpcBuffer::new(),
            local,
            remote,
            timeouts: Timeouts::default(),
            timer: DeadlineTimer::new(),
            submitted: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub fn set_timeouts(&mut self, timeouts: Timeouts) {
        self.timeouts = timeouts;
    }

    /// The buffer receive operations append into; decode envelopes from here.
    pub fn input(&self) -> &RpcBuffer {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut RpcBuffer {
        &mut self.input
    }

    /// Establishes the connection, bounded by the connect deadline.
    pub async fn connect(&mut self, remote: SocketAddr) -> Result<(), RpcError> {
        if self.state != ConnectionState::Idle {
            return Err(RpcError::Closed);
        }
        self.state = ConnectionState::Connecting;
        self.remote = Some(remote);
        let expiry = self.timer.arm(self.timeouts.connect);
        tokio::pin!(expiry);
        let connected = tokio::select! {
            result = TcpStream::connect(remote) => result.map_err(RpcError::Connect),
            _ = &mut expiry => Err(RpcError::Connect(timeout_error())),
        };
        match connected {
            Ok(stream) => {
                self.timer.cancel();
                let _ = stream.set_nodelay(true);
                self.local = stream.local_addr().ok();
                self.stream = Some(stream);
                self.state = ConnectionState::Ready;
                debug!("connected, local({:?}), remote({})", self.local, remote);
                Ok(())
            }
            Err(e) => {
                debug!("connect failed, remote({}): {}", remote, e);
                self.close();
                Err(e)
            }
        }
    }

    /// Writes until `output` is drained, all under one send deadline. Any
    /// failure closes the connection.
    pub async fn send(&mut self, output: &mut RpcBuffer) -> Result<(), RpcError> {
        let expiry = self.timer.arm(self.timeouts.send);
        tokio::pin!(expiry);
        while output.readable_bytes() > 0 {
            let Some(stream) = self.stream.as_mut() else {
                return Err(RpcError::Closed);
            };
            let written = tokio::select! {
                result = stream.write(output.readable()) => result,
                _ = &mut expiry => {
                    self.close();
                    return Err(RpcError::Send(timeout_error()));
                }
            };
            match written {
                Ok(0) => {
                    self.close();
                    return Err(RpcError::Send(io::ErrorKind::WriteZero.into()));
                }
                Ok(n) => {
                    trace!("{} byte(s) sent", n);
                    output.retrieve(n);
                }
                Err(e) => {
                    self.close();
                    return Err(RpcError::Send(e));
                }
            }
        }
        self.timer.cancel();
        Ok(())
    }

    /// Appends one socket read to the input buffer, bounded by the receive
    /// deadline. An end of stream closes the connection and reports
    /// [`RpcError::PeerClosed`].
    pub async fn receive(&mut self) -> Result<usize, RpcError> {
        if self.input.writable_bytes() < READ_CHUNK {
            self.input.ensure_writable(READ_CHUNK);
        }
        let expiry = self.timer.arm(self.timeouts.receive);
        tokio::pin!(expiry);
        let Some(stream) = self.stream.as_mut() else {
            return Err(RpcError::Closed);
        };
        let received = tokio::select! {
            result = stream.read(self.input.writable_mut()) => result,
            _ = &mut expiry => {
                self.close();
                return Err(RpcError::Receive(timeout_error()));
            }
        };
        match received {
            Ok(0) => {
                debug!("peer closed, remote({:?})", self.remote);
                self.close();
                Err(RpcError::PeerClosed)
            }
            Ok(n) => {
                self.timer.cancel();
                trace!("{} byte(s) received", n);
                self.input.advance_write(n);
                Ok(n)
            }
            Err(e) => {
                self.close();
                Err(RpcError::Receive(e))
            }
        }
    }

    /// Marks a deferred send as submitted; the send deadline for
    /// [`wait_for_send`](TcpConnection::wait_for_send) runs from this moment.
    pub fn begin_send(&mut self) {
        self.submitted = Some(Instant::now());
    }

    /// Performs one bounded write and advances `output` by the transferred
    /// count. Resubmitting until the buffer drains is the caller's job.
    pub async fn wait_for_send(&mut self, output: &mut RpcBuffer) -> Result<usize, RpcError> {
        let deadline = self.remaining(self.timeouts.send);
        let Some(stream) = self.stream.as_mut() else {
            return Err(RpcError::Closed);
        };
        let write = stream.write(output.readable());
        let result = match deadline {
            Some(remaining) => {
                time::timeout(remaining, write).await.unwrap_or_else(|_| Err(timeout_error()))
            }
            None => write.await,
        };
        match result {
            Ok(0) => {
                self.close();
                Err(RpcError::Send(io::ErrorKind::WriteZero.into()))
            }
            Ok(n) => {
                trace!("{} byte(s) sent", n);
                output.retrieve(n);
                Ok(n)
            }
            Err(e) => {
                self.close();
                Err(RpcError::Send(e))
            }
        }
    }

    /// Marks a deferred receive as submitted; the receive deadline for
    /// [`wait_for_receive`](TcpConnection::wait_for_receive) runs from this
    /// moment.
    pub fn begin_receive(&mut self) {
        self.submitted = Some(Instant::now());
    }

    /// Performs one bounded read, appending whatever arrived to the input
    /// buffer.
    pub async fn wait_for_receive(&mut self) -> Result<usize, RpcError> {
        if self.input.writable_bytes() < READ_CHUNK {
            self.input.ensure_writable(READ_CHUNK);
        }
        let deadline = self.remaining(self.timeouts.receive);
        let Some(stream) = self.stream.as_mut() else {
            return Err(RpcError::Closed);
        };
        let read = stream.read(self.input.writable_mut());
        let result = match deadline {
            Some(remaining) => {
                time::timeout(remaining, read).await.unwrap_or_else(|_| Err(timeout_error()))
            }
            None => read.await,
        };
        match result {
            Ok(0) => {
                debug!("peer closed, remote({:?})", self.remote);
                self.close();
                Err(RpcError::PeerClosed)
            }
            Ok(n) => {
                trace!("{} byte(s) received", n);
                self.input.advance_write(n);
                Ok(n)
            }
            Err(e) => {
                self.close();
                Err(RpcError::Receive(e))
            }
        }
    }

    /// Closes the socket and cancels any armed deadline. Idempotent;
    /// in-flight operations racing this observe a closed connection.
    pub fn close(&mut self) {
        self.timer.cancel();
        if let Some(stream) = self.stream.take() {
            debug!("close socket, local({:?}), remote({:?})", self.local, self.remote);
            drop(stream);
        }
        self.state = ConnectionState::Closed;
    }

    /// Time left of `limit` since the last `begin_*` submission. `None` when
    /// the deadline is disabled.
    fn remaining(&self, limit: Duration) -> Option<Duration> {
        if limit.is_zero() {
            return None;
        }
        let elapsed = self.submitted.map(|since| since.elapsed()).unwrap_or_default();
        Some(limit.saturating_sub(elapsed))
    }
}
