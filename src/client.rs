//! Client channels: the three ways to issue a call.
//!
//! All three flavors speak the same wire format through the same connection
//! state machine; they differ only in how completion reaches the caller:
//!
//! - [`SyncRpcClient`] completes the call in place: the calling task is held
//!   until the reply parsed or the call failed.
//! - [`FutureRpcClient`] splits the call in two: `call_method` sends the
//!   request and submits the receive, the returned [`PendingCall`] is waited
//!   on later. The receive deadline runs from submission, not from the wait.
//! - [`AsyncRpcClient`] hands the call to a driver task running on an
//!   [`Executor`]; a completion callback fires with the parsed response and
//!   [`wait`](AsyncRpcClient::wait) blocks until the call resolved.
//!
//! Whatever the flavor, each call resolves to exactly one of: the completion
//! callback runs, or the controller is marked failed with a reason.
//!
//! A channel carries one call at a time. Issuing the next call before the
//! previous reply was collected leaves that reply in the input buffer, where
//! it will be mistaken for the next one; the borrow rules of `call_method`
//! and [`PendingCall`] make that hard to do by accident.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::codec::{HeaderParse, Parse, RpcBuffer, WORD_SIZE};
use crate::connection::{TcpConnection, Timeouts};
use crate::controller::RpcController;
use crate::error::RpcError;
use crate::executor::Executor;
use crate::registry::method_id;
use crate::service::{Message, MethodDescriptor};

/// Completion callback for the blocking and future flavors.
pub type Callback = Box<dyn FnOnce() + Send>;

fn encode_call(method: &MethodDescriptor, request: &dyn Message) -> RpcBuffer {
    let mut output = RpcBuffer::new();
    output.serialize(method_id(method.full_name()), request);
    output
}

/// The blocking flavor: one call, start to finish, on the calling task.
#[derive(Debug)]
pub struct SyncRpcClient {
    conn: TcpConnection,
}

impl SyncRpcClient {
    pub async fn connect(remote: SocketAddr, timeouts: Timeouts) -> Result<Self, RpcError> {
        let mut conn = TcpConnection::new(timeouts);
        conn.connect(remote).await?;
        Ok(SyncRpcClient { conn })
    }

    /// Sends the request and holds the caller until the reply has been parsed
    /// into `response` or the call failed. On success `done` runs once; on
    /// failure the controller carries the reason.
    pub async fn call_method<Req, Resp>(
        &mut self,
        method: &MethodDescriptor,
        controller: &RpcController,
        request: &Req,
        response: &mut Resp,
        done: Option<Callback>,
    ) where
        Req: Message,
        Resp: Message,
    {
        let mut output = encode_call(method, request);
        if let Err(e) = self.conn.send(&mut output).await {
            controller.set_failed(e.to_string());
            return;
        }
        loop {
            if let Err(e) = self.conn.receive().await {
                controller.set_failed(e.to_string());
                return;
            }
            match self.conn.input_mut().parse(response) {
                Parse::Incomplete => continue,
                Parse::Bad => {
                    controller.set_failed("parse failed");
                    self.conn.close();
                    return;
                }
                Parse::Ok(_) => break,
            }
        }
        if let Some(done) = done {
            done();
        }
    }

    pub fn close(&mut self) {
        self.conn.close();
    }
}

/// The prepare-then-wait flavor.
pub struct FutureRpcClient {
    conn: TcpConnection,
}

impl FutureRpcClient {
    pub async fn connect(remote: SocketAddr, timeouts: Timeouts) -> Result<Self, RpcError> {
        let mut conn = TcpConnection::new(timeouts);
        conn.connect(remote).await?;
        Ok(FutureRpcClient { conn })
    }

    /// Sends the request and submits the receive. Collect the reply through
    /// [`PendingCall::wait`]; until then the channel is borrowed by the
    /// pending call.
    pub async fn call_method<'a, Req>(
        &'a mut self,
        method: &MethodDescriptor,
        controller: &'a RpcController,
        request: &Req,
        done: Option<Callback>,
    ) -> PendingCall<'a>
    where
        Req: Message,
    {
        let mut output = encode_call(method, request);
        if let Err(e) = self.conn.send(&mut output).await {
            controller.set_failed(e.to_string());
            return PendingCall { client: self, controller, done: None, dead: true };
        }
        self.conn.begin_receive();
        PendingCall { client: self, controller, done, dead: false }
    }

    pub fn close(&mut self) {
        self.conn.close();
    }
}

/// An in-flight future-flavor call.
pub struct PendingCall<'a> {
    client: &'a mut FutureRpcClient,
    controller: &'a RpcController,
    done: Option<Callback>,
    dead: bool,
}

impl PendingCall<'_> {
    /// Blocks until the reply parses into `response` or the call fails,
    /// looping over partial envelopes and resubmitting the receive each time.
    pub async fn wait<Resp: Message>(mut self, response: &mut Resp) {
        if self.dead {
            // The send already failed and the controller carries the reason.
            return;
        }
        loop {
            if let Err(e) = self.client.conn.wait_for_receive().await {
                self.controller.set_failed(e.to_string());
                return;
            }
            match self.client.conn.input_mut().parse(response) {
                Parse::Incomplete => {
                    self.client.conn.begin_receive();
                    continue;
                }
                Parse::Bad => {
                    self.controller.set_failed("parse failed");
                    self.client.conn.close();
                    return;
                }
                Parse::Ok(_) => break,
            }
        }
        if let Some(done) = self.done.take() {
            done();
        }
    }
}

type Complete = Box<dyn FnOnce(Result<Vec<u8>, RpcError>) + Send>;

struct Call {
    output: RpcBuffer,
    complete: Complete,
    finished: oneshot::Sender<()>,
}

/// The callback flavor: calls are driven by a task on the client's executor.
pub struct AsyncRpcClient {
    calls: mpsc::UnboundedSender<Call>,
    pending: Option<oneshot::Receiver<()>>,
}

impl AsyncRpcClient {
    /// Connects, then parks a driver task on `executor`. The driver owns the
    /// connection for the life of the client and serializes its calls.
    pub async fn connect(
        executor: &Executor,
        remote: SocketAddr,
        timeouts: Timeouts,
    ) -> Result<Self, RpcError> {
        let mut conn = TcpConnection::new(timeouts);
        conn.connect(remote).await?;
        let (calls, mut queue) = mpsc::unbounded_channel::<Call>();
        executor.execute(async move {
            while let Some(call) = queue.recv().await {
                let Call { mut output, complete, finished } = call;
                let outcome = drive_call(&mut conn, &mut output).await;
                complete(outcome);
                let _ = finished.send(());
            }
            debug!("rpc client driver finished");
        });
        Ok(AsyncRpcClient { calls, pending: None })
    }

    /// Submits a call. On success `on_done` runs with the parsed response;
    /// on any failure the controller is marked instead. Either way the
    /// submission is resolved before [`wait`](AsyncRpcClient::wait) returns.
    pub fn call_method<Req, Resp>(
        &mut self,
        method: &MethodDescriptor,
        controller: Arc<RpcController>,
        request: &Req,
        on_done: impl FnOnce(Resp) + Send + 'static,
    ) where
        Req: Message,
        Resp: Message + Default,
    {
        let output = encode_call(method, request);
        let (finished, pending) = oneshot::channel();
        self.pending = Some(pending);
        let complete: Complete = Box::new(move |outcome| match outcome {
            Ok(payload) => {
                let mut response = Resp::default();
                match response.merge(&payload) {
                    Ok(()) => on_done(response),
                    Err(e) => controller.set_failed(format!("parse failed: {e}")),
                }
            }
            Err(e) => controller.set_failed(e.to_string()),
        });
        if let Err(rejected) = self.calls.send(Call { output, complete, finished }) {
            // Driver is gone; resolve the call here so the caller still
            // observes exactly one outcome.
            (rejected.0.complete)(Err(RpcError::Closed));
        }
    }

    /// Blocks until the in-flight call has resolved, successfully or not.
    pub async fn wait(&mut self) {
        if let Some(pending) = self.pending.take() {
            let _ = pending.await;
        }
    }
}

/// Runs one call on the driver: send, then read until a whole reply envelope
/// is buffered, and extract its payload.
async fn drive_call(conn: &mut TcpConnection, output: &mut RpcBuffer) -> Result<Vec<u8>, RpcError> {
    conn.send(output).await?;
    loop {
        conn.receive().await?;
        match conn.input_mut().try_parse_header() {
            HeaderParse::Incomplete => continue,
            HeaderParse::Bad => {
                conn.close();
                return Err(RpcError::BadEnvelope);
            }
            HeaderParse::Ok(total_length) => {
                let _reply_method_id = conn.input_mut().parse_method_id();
                let payload_len = total_length as usize - WORD_SIZE;
                return Ok(conn.input_mut().read(payload_len).to_vec());
            }
        }
    }
}
