//! Registration handles and the handle liveness table
//!
//! A handle is what the native library stores as `void*` user-data. It is an
//! identifier, not a pointer, so a stale or forged value can be detected
//! instead of dereferenced.

use super::bundle::ContextBundle;
use core::ffi::c_void;
use core::num::NonZeroUsize;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Process-wide table shared by the C and Python bindings
static GLOBAL_TABLE: Lazy<Arc<HandleTable>> = Lazy::new(|| Arc::new(HandleTable::new()));

static NEXT_HANDLE: AtomicUsize = AtomicUsize::new(1);

/// Opaque handle returned by registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationHandle(NonZeroUsize);

impl RegistrationHandle {
    /// Allocate a fresh handle. Handles are never reused within a process.
    pub(crate) fn next() -> Self {
        loop {
            let raw = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
            if let Some(id) = NonZeroUsize::new(raw) {
                return Self(id);
            }
        }
    }

    /// Decode native user-data. Null never decodes.
    #[inline]
    pub fn from_user_data(user_data: *mut c_void) -> Option<Self> {
        Self::from_raw(user_data as usize)
    }

    #[inline]
    pub fn from_raw(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }

    /// Encode as native user-data
    #[inline]
    pub fn as_user_data(self) -> *mut c_void {
        self.0.get() as *mut c_void
    }

    #[inline]
    pub fn as_raw(self) -> usize {
        self.0.get()
    }
}

impl core::fmt::Display for RegistrationHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Liveness index from handle to bundle
///
/// Holds weak references only: the registry entry is the single owner of a
/// bundle, and a dispatch upgrades to a strong reference for the duration of
/// one call.
pub struct HandleTable {
    live: DashMap<RegistrationHandle, Weak<ContextBundle>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            live: DashMap::with_capacity(capacity),
        }
    }

    /// Shared process-wide table
    pub fn global() -> Arc<HandleTable> {
        Arc::clone(&GLOBAL_TABLE)
    }

    pub(crate) fn insert(&self, bundle: &Arc<ContextBundle>) {
        self.live.insert(bundle.handle(), Arc::downgrade(bundle));
    }

    /// Remove a handle. Returns false if it was not live.
    pub(crate) fn retire(&self, handle: RegistrationHandle) -> bool {
        self.live.remove(&handle).is_some()
    }

    /// Resolve a handle to its bundle, if it is still registered
    pub fn resolve(&self, handle: RegistrationHandle) -> Option<Arc<ContextBundle>> {
        self.live.get(&handle).and_then(|entry| entry.value().upgrade())
    }

    pub fn is_live(&self, handle: RegistrationHandle) -> bool {
        self.resolve(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
