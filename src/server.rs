//! The RPC server: listening acceptor, per-connection loops and dispatch.
//!
//! A started server runs three executor roles:
//!
//! - the listen executor (one worker) runs only the accept loop;
//! - the connection executor owns one spawned task per accepted socket,
//!   reading envelopes and writing replies; connections run concurrently no
//!   matter how many are open, and stopping the server aborts them together;
//! - the working pool runs user service handlers, placed by peer address so
//!   all calls from one connection share an executor.
//!
//! Per connection, envelopes are handled strictly in arrival order: the next
//! envelope is not parsed until the previous handler job has finished.
//! Replies do not have to be produced in line, though. A handler hands its
//! response to a single-shot [`Done`] which serializes the envelope and
//! queues it on the connection's outbound channel; the connection loop writes
//! queued replies while it waits for more input. The cloned channel sender
//! inside each `Done` is what keeps the reply path alive until the service
//! has answered, however late that is.
//!
//! Errors inside a connection loop are contained to that connection; the
//! acceptor and the executors keep running.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::thread;

use anyhow::anyhow;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use crate::codec::{HeaderParse, RpcBuffer, WORD_SIZE};
use crate::connection::TcpConnection;
use crate::error::RpcError;
use crate::executor::{Executor, ExecutorPool};
use crate::registry::MethodRegistry;
use crate::service::{Done, Message, Service};

/// Largest envelope (`total_length`) the server accepts. A peer advertising
/// more is disconnected before the server buffers it.
pub const MAX_ENVELOPE_LENGTH: u64 = 128 * 1024 * 1024;

/// A TCP server dispatching envelopes to registered services.
pub struct RpcServer {
    name: String,
    bind: SocketAddr,
    registry: MethodRegistry,
    pool_size: usize,
    pool_workers: usize,
    runtime: Option<ServerRuntime>,
}

struct ServerRuntime {
    local_addr: SocketAddr,
    listen_executor: Executor,
    connection_executor: Arc<Executor>,
    working_pool: Arc<ExecutorPool>,
    shutdown: watch::Sender<bool>,
}

impl RpcServer {
    /// A server that will bind `host:port` once started. Port 0 asks the OS
    /// for a free port; see [`local_addr`](RpcServer::local_addr).
    pub fn new(host: IpAddr, port: u16, name: impl Into<String>) -> Self {
        let parallelism = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        RpcServer {
            name: name.into(),
            bind: SocketAddr::new(host, port),
            registry: MethodRegistry::new(),
            pool_size: 4,
            pool_workers: std::cmp::max(parallelism / 4, 1),
            runtime: None,
        }
    }

    /// A server on the default bind host, `127.0.0.1`.
    pub fn loopback(port: u16, name: impl Into<String>) -> Self {
        RpcServer::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port, name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_working_pool(mut self, pool_size: usize, workers_per_executor: usize) -> Self {
        self.pool_size = pool_size;
        self.pool_workers = workers_per_executor;
        self
    }

    /// Registers a service. Only allowed before [`start`](RpcServer::start);
    /// the dispatch table is frozen while the server runs.
    pub fn register_service(&mut self, service: Arc<dyn Service>) {
        if self.runtime.is_some() {
            warn!("{}: cannot register services on a started server", self.name);
            return;
        }
        self.registry.register(service);
    }

    /// Binds the listener and starts the executors and the accept loop.
    pub async fn start(&mut self) -> std::io::Result<()> {
        if self.runtime.is_some() {
            return Ok(());
        }
        let listener = TcpListener::bind(self.bind).await?;
        let local_addr = listener.local_addr()?;
        info!("{} listening on {}", self.name, local_addr);

        let listen_executor = Executor::start(1);
        // Connection loops are spawned on this executor, one task per live
        // connection; nothing goes through its queue.
        let connection_executor = Arc::new(Executor::start(0));
        let working_pool = Arc::new(ExecutorPool::start(self.pool_size, self.pool_workers));
        let registry = Arc::new(self.registry.clone());
        let (shutdown, shutdown_rx) = watch::channel(false);

        listen_executor.execute(accept_loop(
            listener,
            registry,
            Arc::clone(&connection_executor),
            Arc::clone(&working_pool),
            shutdown_rx,
        ));
        self.runtime = Some(ServerRuntime {
            local_addr,
            listen_executor,
            connection_executor,
            working_pool,
            shutdown,
        });
        Ok(())
    }

    /// Stops accepting and shuts the executors down. Connections whose loops
    /// are parked on the connection executor go away with it; the acceptor
    /// itself never force-closes them.
    pub async fn stop(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        let _ = runtime.shutdown.send(true);
        runtime.working_pool.stop().await;
        runtime.connection_executor.stop().await;
        runtime.listen_executor.stop().await;
        info!("{} stopped", self.name);
    }

    /// The bound address while the server is running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.runtime.as_ref().map(|runtime| runtime.local_addr)
    }
}

async fn accept_loop(
    listener: TcpListener,
    registry: Arc<MethodRegistry>,
    connection_executor: Arc<Executor>,
    working_pool: Arc<ExecutorPool>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("accept loop stopped");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    info!("accepting connection from {}", peer);
                    let registry = Arc::clone(&registry);
                    let working_pool = Arc::clone(&working_pool);
                    connection_executor.spawn(async move {
                        if let Err(e) = process_socket(socket, peer, registry, working_pool).await {
                            debug!("connection from {} closed: {:?}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    error!("accept failed: {:?}", e);
                    return;
                }
            }
        }
    }
}

/// Runs one accepted connection until the peer goes away, an envelope is
/// malformed or a handler fails.
async fn process_socket(
    socket: TcpStream,
    peer: SocketAddr,
    registry: Arc<MethodRegistry>,
    working_pool: Arc<ExecutorPool>,
) -> anyhow::Result<()> {
    let mut conn = TcpConnection::accepted(socket);
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<RpcBuffer>();
    loop {
        tokio::select! {
            reply = reply_rx.recv() => {
                // The loop keeps its own sender, so recv cannot yield None.
                let Some(mut reply) = reply else { return Ok(()) };
                conn.send(&mut reply).await?;
            }
            received = conn.receive() => {
                match received {
                    Err(RpcError::PeerClosed) => return Ok(()),
                    Err(e) => return Err(e.into()),
                    Ok(_) => {
                        if let Err(e) = dispatch(&mut conn, peer, &registry, &working_pool, &reply_tx).await {
                            conn.close();
                            return Err(e);
                        }
                    }
                }
            }
        }
    }
}

/// Parses every complete envelope buffered on the connection and runs its
/// handler. An error means the connection must terminate without replying.
async fn dispatch(
    conn: &mut TcpConnection,
    peer: SocketAddr,
    registry: &Arc<MethodRegistry>,
    working_pool: &Arc<ExecutorPool>,
    reply_tx: &mpsc::UnboundedSender<RpcBuffer>,
) -> anyhow::Result<()> {
    loop {
        if let Some(advertised) = conn.input().peek_total_length() {
            if advertised > MAX_ENVELOPE_LENGTH {
                return Err(anyhow!(
                    "envelope length {} from {} exceeds max {}",
                    advertised,
                    peer,
                    MAX_ENVELOPE_LENGTH
                ));
            }
        }
        let total_length = match conn.input_mut().try_parse_header() {
            HeaderParse::Incomplete => return Ok(()),
            HeaderParse::Bad => {
                warn!("bad envelope header from {}", peer);
                return Err(RpcError::BadEnvelope.into());
            }
            HeaderParse::Ok(total_length) => total_length as usize,
        };
        let method_id = conn.input_mut().parse_method_id();
        let Some(entry) = registry.lookup(method_id) else {
            warn!("method id {:#018x} from {} is not registered", method_id, peer);
            return Err(RpcError::UnknownMethod(method_id).into());
        };
        let payload_len = total_length - WORD_SIZE;
        let mut request = entry.method.new_request();
        if let Err(e) = conn.input_mut().parse_message(request.as_mut(), payload_len) {
            warn!("parse request for {} from {} failed: {:?}", entry.method.full_name(), peer, e);
            return Err(RpcError::Parse(e).into());
        }
        let response = entry.method.new_response();
        let done = {
            let reply_tx = reply_tx.clone();
            Done::new(move |response: Box<dyn Message>| {
                let mut out = RpcBuffer::new();
                out.serialize(method_id, response.as_ref());
                let _ = reply_tx.send(out);
            })
        };
        let service = Arc::clone(&entry.service);
        let method = entry.method.clone();
        let method_name = method.full_name().to_string();
        trace!("dispatching {} for {}", method_name, peer);
        let finished = working_pool.for_key(&peer).execute_with_future(async move {
            service.call_method(&method, None, request, response, done).await;
        });
        if finished.await.is_err() {
            return Err(anyhow!("service handler for {} failed", method_name));
        }
    }
}
