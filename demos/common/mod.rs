#![allow(dead_code)]
//! Message types and echo services shared by the demo programs.

use std::any::Any;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;

use minirpc::{
    Done, Message, MethodDescriptor, RpcController, Service, ServiceDescriptor,
};

/// Port the demo server binds and the demo clients dial.
pub const SERVER_PORT: u16 = 6666;

pub fn server_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), SERVER_PORT)
}

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

pub struct OneServiceImpl {
    descriptor: ServiceDescriptor,
}

impl OneServiceImpl {
    pub fn new() -> Self {
        OneServiceImpl { descriptor: one_service_descriptor() }
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
        match method.full_name() {
            "OneService.Echo" => {
                let message = request
                    .downcast_ref::<EchoRequest>()
                    .expect("echo request type")
                    .message
                    .clone();
                println!("one service received echo message: {message}");
                response.downcast_mut::<EchoResponse>().expect("echo response type").response =
                    message;
                done.run(response);
            }
            "OneService.Discard" => {
                let message = &request
                    .downcast_ref::<DiscardRequest>()
                    .expect("discard request type")
                    .message;
                println!("one service received discard message: {message}");
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
        println!("another service received echo message: {message}");
        response.downcast_mut::<EchoResponse>().expect("echo response type").response = message;
        done.run(response);
    }
}
