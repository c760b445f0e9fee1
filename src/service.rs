//! Message and service contracts.
//!
//! The runtime never interprets payload bytes itself. A [`Message`] knows how
//! to serialize into bytes and how to repopulate itself from bytes; which
//! serialization library sits behind that is the embedding program's choice.
//! A [`Service`] describes its callable methods through a
//! [`ServiceDescriptor`], and each [`MethodDescriptor`] carries factories for
//! fresh request and response instances so the server can allocate them
//! without knowing the concrete types.

use std::any::Any;
use std::fmt;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;

use crate::controller::RpcController;

/// A serializable unit of payload.
///
/// `encode` must be the inverse of `merge`: merging the encoded bytes into a
/// default instance reproduces the original value.
pub trait Message: Send + 'static {
    /// Appends the serialized form of `self` to `dest`.
    fn encode(&self, dest: &mut Vec<u8>);

    /// Replaces the contents of `self` from serialized bytes.
    fn merge(&mut self, src: &[u8]) -> io::Result<()>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn Message {
    pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    pub fn downcast_mut<T: Message>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }
}

/// Factory producing a fresh, default message instance.
pub type Prototype = fn() -> Box<dyn Message>;

/// Reflective description of one callable method.
#[derive(Clone)]
pub struct MethodDescriptor {
    full_name: String,
    request_prototype: Prototype,
    response_prototype: Prototype,
}

impl MethodDescriptor {
    pub fn new(
        full_name: impl Into<String>,
        request_prototype: Prototype,
        response_prototype: Prototype,
    ) -> Self {
        MethodDescriptor {
            full_name: full_name.into(),
            request_prototype,
            response_prototype,
        }
    }

    /// The fully qualified name, e.g. `"OneService.Echo"`. The wire method id
    /// is derived from this string, so it must match on both peers.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn new_request(&self) -> Box<dyn Message> {
        (self.request_prototype)()
    }

    pub fn new_response(&self) -> Box<dyn Message> {
        (self.response_prototype)()
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MethodDescriptor").field("full_name", &self.full_name).finish()
    }
}

/// The set of methods a service declares.
#[derive(Clone, Debug, Default)]
pub struct ServiceDescriptor {
    name: String,
    methods: Vec<MethodDescriptor>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        ServiceDescriptor { name: name.into(), methods: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declares a method; its full name becomes `"<service>.<method>"`.
    pub fn add_method(
        &mut self,
        method_name: &str,
        request_prototype: Prototype,
        response_prototype: Prototype,
    ) {
        let full_name = format!("{}.{}", self.name, method_name);
        self.methods.push(MethodDescriptor::new(full_name, request_prototype, response_prototype));
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    pub fn method(&self, index: usize) -> &MethodDescriptor {
        &self.methods[index]
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    /// Looks a method up by its name within this service.
    pub fn find_method(&self, method_name: &str) -> Option<&MethodDescriptor> {
        let suffix = format!("{}.{}", self.name, method_name);
        self.methods.iter().find(|m| m.full_name == suffix)
    }
}

/// Single-shot completion handed to [`Service::call_method`].
///
/// Running it consumes it, so a service cannot complete the same call twice.
/// The server builds one per inbound call; running it serializes the response
/// and schedules it for transmission on the originating connection.
pub struct Done {
    complete: Box<dyn FnOnce(Box<dyn Message>) + Send>,
}

impl Done {
    pub fn new(complete: impl FnOnce(Box<dyn Message>) + Send + 'static) -> Self {
        Done { complete: Box::new(complete) }
    }

    pub fn run(self, response: Box<dyn Message>) {
        (self.complete)(response)
    }
}

impl fmt::Debug for Done {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Done").finish_non_exhaustive()
    }
}

/// A service implementation the server can dispatch to.
///
/// `call_method` receives a request already parsed from the wire and a fresh
/// response allocated from the method's prototype. It must invoke `done`
/// exactly once with the filled-in response; it may do so before returning or
/// from work it spawned.
#[async_trait]
pub trait Service: Send + Sync {
    fn descriptor(&self) -> &ServiceDescriptor;

    async fn call_method(
        &self,
        method: &MethodDescriptor,
        controller: Option<Arc<RpcController>>,
        request: Box<dyn Message>,
        response: Box<dyn Message>,
        done: Done,
    );
}
