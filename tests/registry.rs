//! Method-id derivation and registry routing.

mod support;

use std::sync::Arc;

use minirpc::{method_id, MethodRegistry};

use support::{AnotherServiceImpl, OneServiceImpl};

#[test]
fn method_id_is_fnv1a_of_the_full_name() {
    // Published FNV-1a 64-bit vectors.
    assert_eq!(method_id(""), 0xcbf2_9ce4_8422_2325);
    assert_eq!(method_id("a"), 0xaf63_dc4c_8601_ec8c);
}

#[test]
fn method_id_is_deterministic_and_discriminating() {
    assert_eq!(method_id("OneService.Echo"), method_id("OneService.Echo"));
    assert_ne!(method_id("OneService.Echo"), method_id("AnotherService.Echo"));
    assert_ne!(method_id("OneService.Echo"), method_id("OneService.Discard"));
}

#[test]
fn registers_every_declared_method() {
    let mut registry = MethodRegistry::new();
    registry.register(Arc::new(OneServiceImpl::new()));
    registry.register(Arc::new(AnotherServiceImpl::new()));
    assert_eq!(registry.len(), 3);

    let entry = registry.lookup(method_id("OneService.Echo")).expect("echo registered");
    assert_eq!(entry.method.full_name(), "OneService.Echo");
    let entry = registry.lookup(method_id("OneService.Discard")).expect("discard registered");
    assert_eq!(entry.method.full_name(), "OneService.Discard");
    assert!(registry.lookup(method_id("OneService.Missing")).is_none());
}

#[test]
fn duplicate_registration_keeps_the_first_binding() {
    let mut registry = MethodRegistry::new();
    registry.register(Arc::new(OneServiceImpl::new()));
    let routed_once = registry.len();

    registry.register(Arc::new(OneServiceImpl::new()));
    assert_eq!(registry.len(), routed_once, "duplicates must not change the routing");
    let entry = registry.lookup(method_id("OneService.Echo")).expect("echo registered");
    assert_eq!(entry.method.full_name(), "OneService.Echo");
}
