//! Host environment - exclusion lock and error channel of the calling runtime

use crate::errors::{self, BridgeError};
use parking_lot::ReentrantMutex;
use tracing::error;

/// What the host runtime requires around a foreign-call reentry
pub trait HostEnvironment: Send + Sync {
    /// Run `f` holding the host's exclusion lock. The lock is released on
    /// every exit path.
    fn with_exclusive<R>(&self, f: impl FnOnce() -> R) -> R;

    /// Surface an error through the host's error channel
    fn report(&self, err: &BridgeError) {
        record_error(err);
    }
}

/// Log `err` and park it in the calling thread's last-error slot
pub fn record_error(err: &BridgeError) {
    error!(event = "dispatch_error", kind = err.kind(), error = %err);
    errors::set_last_error(err);
}

/// Host without an interpreter lock of its own
///
/// Serializes callbacks behind a reentrant mutex, so a callback may dispatch
/// again on the same thread.
#[derive(Default)]
pub struct NativeHost {
    lock: ReentrantMutex<()>,
}

impl NativeHost {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HostEnvironment for NativeHost {
    fn with_exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.lock.lock();
        f()
    }
}
