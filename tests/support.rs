#![allow(dead_code)]
//! Shared fixtures: text-payload message types and the echo services used by
//! the end-to-end tests.

use std::any::Any;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use minirpc::{
    Done, Message, MethodDescriptor, RpcController, RpcServer, Service, ServiceDescriptor,
};

/// Declares a message whose payload is the UTF-8 bytes of one string field.
macro_rules! text_message {
    ($t:ident, $field:ident) => {
        #[derive(Clone, Debug, Default, PartialEq, Eq)]
        pub struct $t {
            pub $field: String,
        }

        impl Message for $t {
            fn encode(&self, dest: &mut Vec<u8>) {
                dest.extend_from_slice(self.$field.as_bytes());
            }

            fn merge(&mut self, src: &[u8]) -> io::Result<()> {
                self.$field = String::from_utf8(src.to_vec()).map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        concat!(stringify!($t), " payload is not valid utf-8"),
                    )
                })?;
                Ok(())
            }

            fn as_any(&self) -> &dyn Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }
        }
    };
}

text_message!(EchoRequest, message);
text_message!(EchoResponse, response);
text_message!(DiscardRequest, message);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiscardResponse;

impl Message for DiscardResponse {
    fn encode(&self, _dest: &mut Vec<u8>) {}

    fn merge(&mut self, _src: &[u8]) -> io::Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub fn one_service_descriptor() -> ServiceDescriptor {
    let mut descriptor = ServiceDescriptor::new("OneService");
    descriptor.add_method(
        "Echo",
        || Box::new(EchoRequest::default()),
        || Box::new(EchoResponse::default()),
    );
    descriptor.add_method(
        "Discard",
        || Box::new(DiscardRequest::default()),
        || Box::new(DiscardResponse),
    );
    descriptor
}

pub fn another_service_descriptor() -> ServiceDescriptor {
    let mut descriptor = ServiceDescriptor::new("AnotherService");
    descriptor.add_method(
        "Echo",
        || Box::new(EchoRequest::default()),
        || Box::new(EchoResponse::default()),
    );
    descriptor
}

pub fn one_echo() -> MethodDescriptor {
    one_service_descriptor().find_method("Echo").expect("declared").clone()
}

pub fn one_discard() -> MethodDescriptor {
    one_service_descriptor().find_method("Discard").expect("declared").clone()
}

pub fn another_echo() -> MethodDescriptor {
    another_service_descriptor().find_method("Echo").expect("declared").clone()
}

/// Echoes the request message back; counts how often it was dispatched.
pub struct OneServiceImpl {
    descriptor: ServiceDescriptor,
    pub calls: AtomicUsize,
}

impl OneServiceImpl {
    pub fn new() -> Self {
        OneServiceImpl { descriptor: one_service_descriptor(), calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl Service for OneServiceImpl {
    fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    async fn call_method(
        &self,
        method: &MethodDescriptor,
        _controller: Option<Arc<RpcController>>,
        request: Box<dyn Message>,
        mut response: Box<dyn Message>,
        done: Done,
    ) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match method.full_name() {
            "OneService.Echo" => {
                let message = request
                    .downcast_ref::<EchoRequest>()
                    .expect("echo request type")
                    .message
                    .clone();
                response.downcast_mut::<EchoResponse>().expect("echo response type").response =
                    message;
                done.run(response);
            }
            "OneService.Discard" => {
                // The response stays default-constructed.
                done.run(response);
            }
            other => panic!("unexpected method {other}"),
        }
    }
}

pub struct AnotherServiceImpl {
    descriptor: ServiceDescriptor,
}

impl AnotherServiceImpl {
    pub fn new() -> Self {
        AnotherServiceImpl { descriptor: another_service_descriptor() }
    }
}

#[async_trait]
impl Service for AnotherServiceImpl {
    fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    async fn call_method(
        &self,
        _method: &MethodDescriptor,
        _controller: Option<Arc<RpcController>>,
        request: Box<dyn Message>,
        mut response: Box<dyn Message>,
        done: Done,
    ) {
        let message =
            request.downcast_ref::<EchoRequest>().expect("echo request type").message.clone();
        response.downcast_mut::<EchoResponse>().expect("echo response type").response = message;
        done.run(response);
    }
}

/// Starts a server with both echo services on an OS-assigned port.
pub async fn start_echo_server() -> (RpcServer, SocketAddr) {
    let mut server = RpcServer::loopback(0, "test-server");
    server.register_service(Arc::new(OneServiceImpl::new()));
    server.register_service(Arc::new(AnotherServiceImpl::new()));
    server.start().await.expect("server start");
    let addr = server.local_addr().expect("server address");
    (server, addr)
}
