//! minirpc - a minimal RPC runtime over reliable byte streams.
//!
//! A client invokes named service methods on a remote peer using a typed
//! request/response model; a server registers service implementations and
//! dispatches inbound calls to them. Three client interaction styles share
//! one wire format and one connection state machine: callback-driven,
//! prepare-then-wait, and blocking.
//!
//! ## Wire format
//!
//! Every message is one envelope, `[total_length: u64][method_id: u64]
//! [payload]`, integers little-endian. The method id is the 64-bit FNV-1a
//! hash of the fully qualified method name, so both peers derive it from the
//! shared service declaration. Payload bytes are opaque to the runtime; the
//! [`service::Message`] trait is the seam to whichever serialization the
//! embedding program uses.
//!
//! ## Main components
//!
//! - `buffer` / `codec`: the elastic byte buffer and the envelope codec over
//!   it, built to tolerate short reads and writes.
//! - `connection`: the per-connection state machine coordinating connect,
//!   send, receive, deadlines and teardown.
//! - `executor`: worker-backed task queues and the keyed placement pool the
//!   server schedules on.
//! - `server` / `registry`: the listening acceptor and the method-id
//!   dispatch table.
//! - `client` / `controller`: the three call flavors and the per-call status
//!   object.
//!
//! ## Usage
//!
//! Implement [`service::Service`] (and [`service::Message`] for the payload
//! types), register the service on an [`server::RpcServer`], and call it
//! through one of the clients in [`client`]. The `demos/` programs show an
//! echo service exercised by all three flavors.

pub mod buffer;
pub mod client;
pub mod codec;
pub mod connection;
pub mod controller;
pub mod error;
pub mod executor;
pub mod registry;
pub mod server;
pub mod service;
pub mod timer;

pub use buffer::Buffer;
pub use client::{AsyncRpcClient, FutureRpcClient, PendingCall, SyncRpcClient};
pub use codec::{HeaderParse, Parse, RpcBuffer};
pub use connection::{ConnectionState, TcpConnection, Timeouts};
pub use controller::RpcController;
pub use error::RpcError;
pub use executor::{Executor, ExecutorPool};
pub use registry::{method_id, MethodRegistry, RegisteredMethod};
pub use server::RpcServer;
pub use service::{Done, Message, MethodDescriptor, Prototype, Service, ServiceDescriptor};
pub use timer::DeadlineTimer;
