//! Per-call status container.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Carries the outcome of a single call.
///
/// The caller creates one before issuing a call and inspects it afterwards;
/// [`reset`](RpcController::reset) makes it reusable for the next call. On
/// any failure the channel records a textual reason here, and for every call
/// exactly one of `{completion callback, set_failed}` is observed.
#[derive(Debug, Default)]
pub struct RpcController {
    failed: AtomicBool,
    reason: Mutex<String>,
    cancel_requested: AtomicBool,
    cancel_notified: AtomicBool,
}

impl RpcController {
    pub fn new() -> Self {
        RpcController::default()
    }

    /// Clears all state so the controller can be reused for another call.
    pub fn reset(&self) {
        self.reason.lock().expect("controller reason lock poisoned").clear();
        self.failed.store(false, Ordering::Relaxed);
        self.cancel_requested.store(false, Ordering::Relaxed);
        self.cancel_notified.store(false, Ordering::Relaxed);
    }

    pub fn failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// The failure reason; empty unless [`failed`](RpcController::failed).
    pub fn error_text(&self) -> String {
        self.reason.lock().expect("controller reason lock poisoned").clone()
    }

    pub fn set_failed(&self, reason: impl Into<String>) {
        *self.reason.lock().expect("controller reason lock poisoned") = reason.into();
        self.failed.store(true, Ordering::Release);
    }

    /// Requests cancellation of the in-flight call. Advisory only; transports
    /// surface cancellation through their deadline machinery.
    pub fn start_cancel(&self) {
        self.cancel_requested.store(true, Ordering::Release);
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel_notified.load(Ordering::Acquire)
    }

    /// Runs `callback` and marks the cancellation as delivered.
    pub fn notify_on_cancel(&self, callback: Option<Box<dyn FnOnce() + Send>>) {
        let Some(callback) = callback else {
            return;
        };
        callback();
        self.cancel_notified.store(true, Ordering::Release);
    }
}
