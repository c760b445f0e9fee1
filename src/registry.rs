//! Maps wire method ids to registered service methods.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use const_fnv1a_hash::fnv1a_hash_str_64;
use tracing::{debug, warn};

use crate::service::{MethodDescriptor, Service};

/// Derives the wire identifier for a fully qualified method name.
///
/// FNV-1a (64-bit) over the UTF-8 bytes of the name. The hash is part of the
/// wire contract: client and server compute it independently, so it must be
/// stable across builds, processes and architectures.
pub fn method_id(full_name: &str) -> u64 {
    fnv1a_hash_str_64(full_name)
}

/// A method bound to the service instance that implements it.
#[derive(Clone)]
pub struct RegisteredMethod {
    pub service: Arc<dyn Service>,
    pub method: MethodDescriptor,
}

/// The dispatch table consulted for every inbound envelope.
///
/// Populated before the server starts and read-only afterwards.
#[derive(Clone, Default)]
pub struct MethodRegistry {
    methods: HashMap<u64, RegisteredMethod>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        MethodRegistry::default()
    }

    /// Registers every method the service declares.
    ///
    /// A method whose id is already bound is skipped with a diagnostic; the
    /// first binding wins and registration continues with the remaining
    /// methods.
    pub fn register(&mut self, service: Arc<dyn Service>) {
        for method in service.descriptor().methods() {
            let id = method_id(method.full_name());
            match self.methods.entry(id) {
                Entry::Occupied(existing) => {
                    warn!(
                        "duplicate method id {:#018x} for {}, keeping {}",
                        id,
                        method.full_name(),
                        existing.get().method.full_name()
                    );
                }
                Entry::Vacant(slot) => {
                    debug!("registered {} as {:#018x}", method.full_name(), id);
                    slot.insert(RegisteredMethod {
                        service: Arc::clone(&service),
                        method: method.clone(),
                    });
                }
            }
        }
    }

    pub fn lookup(&self, id: u64) -> Option<&RegisteredMethod> {
        self.methods.get(&id)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
