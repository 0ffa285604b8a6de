//! Callback context registry
//!
//! Design: One live context per control object path.
//! 1. `register` builds a bundle and installs it under its path
//! 2. Re-registering a path releases the previous bundle and retires its handle
//! 3. Handles are published to a [`HandleTable`] so the dispatcher can resolve
//!    native user-data without touching the path map
//!
//! Bundles are released on replacement, `unregister`, `clear`, or when the
//! registry itself is dropped. A dispatch already in flight keeps its bundle
//! alive until the callback returns.

mod bundle;
mod handle;

pub use bundle::{callback_fn, ContextBundle, ControlCallback, FnCallback, OwnerHandle};
pub use handle::{HandleTable, RegistrationHandle};

use crate::control::{ControlHandlerResult, ControlRequest};
use crate::errors::{BridgeError, BridgeResult, CallbackError};
use crate::infrastructure::config::RegistryConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub struct ContextRegistry {
    entries: Mutex<HashMap<String, Arc<ContextBundle>>>,
    table: Arc<HandleTable>,
}

impl ContextRegistry {
    /// Registry publishing to the process-wide handle table
    pub fn new() -> Self {
        Self::with_table(HandleTable::global())
    }

    pub fn with_table(table: Arc<HandleTable>) -> Self {
        Self::with_capacity(0, table)
    }

    pub fn with_capacity(capacity: usize, table: Arc<HandleTable>) -> Self {
        Self {
            entries: Mutex::new(HashMap::with_capacity(capacity)),
            table,
        }
    }

    pub fn from_config(config: &RegistryConfig, table: Arc<HandleTable>) -> Self {
        Self::with_capacity(config.initial_capacity, table)
    }

    pub fn table(&self) -> &Arc<HandleTable> {
        &self.table
    }

    /// Register a context for `path`, replacing any previous one
    pub fn register(
        &self,
        owner: OwnerHandle,
        callback: Arc<dyn ControlCallback>,
        path: impl Into<String>,
    ) -> BridgeResult<RegistrationHandle> {
        let path = path.into();
        validate_path(&path)?;

        let handle = RegistrationHandle::next();
        let bundle = Arc::new(ContextBundle::new(handle, owner, callback, path.clone()));

        let replaced = {
            let mut entries = self.entries.lock();
            self.table.insert(&bundle);
            let previous = entries.insert(path.clone(), bundle);
            if let Some(old) = &previous {
                self.table.retire(old.handle());
            }
            previous
        };

        match replaced {
            Some(old) => info!(
                event = "context_replaced",
                path = %path,
                handle = %handle,
                previous = %old.handle(),
                "Control context re-registered"
            ),
            None => debug!(
                event = "context_registered",
                path = %path,
                handle = %handle,
                "Control context registered"
            ),
        }

        Ok(handle)
    }

    /// Register a closure as the callback for `path`
    pub fn register_fn<F>(
        &self,
        owner: OwnerHandle,
        path: impl Into<String>,
        callback: F,
    ) -> BridgeResult<RegistrationHandle>
    where
        F: Fn(&OwnerHandle, &ControlRequest<'_>) -> Result<ControlHandlerResult, CallbackError>
            + Send
            + Sync
            + 'static,
    {
        self.register(owner, callback_fn(callback), path)
    }

    /// Release the context for `path`. Returns false if none was registered.
    pub fn unregister(&self, path: &str) -> bool {
        let removed = {
            let mut entries = self.entries.lock();
            let removed = entries.remove(path);
            if let Some(bundle) = &removed {
                self.table.retire(bundle.handle());
            }
            removed
        };

        match removed {
            Some(bundle) => {
                debug!(
                    event = "context_unregistered",
                    path = %path,
                    handle = %bundle.handle(),
                    "Control context released"
                );
                true
            }
            None => false,
        }
    }

    pub fn get(&self, path: &str) -> Option<Arc<ContextBundle>> {
        self.entries.lock().get(path).cloned()
    }

    pub fn handle_for(&self, path: &str) -> Option<RegistrationHandle> {
        self.entries.lock().get(path).map(|bundle| bundle.handle())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.lock().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn paths(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Release every context
    pub fn clear(&self) {
        let drained: Vec<_> = {
            let mut entries = self.entries.lock();
            let drained: Vec<_> = entries.drain().map(|(_, bundle)| bundle).collect();
            for bundle in &drained {
                self.table.retire(bundle.handle());
            }
            drained
        };

        if !drained.is_empty() {
            debug!(event = "registry_cleared", released = drained.len());
        }
    }
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ContextRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("paths", &self.paths())
            .finish()
    }
}

fn validate_path(path: &str) -> BridgeResult<()> {
    if path.is_empty() {
        return Err(BridgeError::InvalidArgument(
            "control object path must not be empty".into(),
        ));
    }
    if path.contains('\0') {
        return Err(BridgeError::InvalidArgument(format!(
            "control object path contains a NUL byte: {:?}",
            path
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ControlAction, MmsValue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> ContextRegistry {
        ContextRegistry::with_table(Arc::new(HandleTable::new()))
    }

    fn counting(counter: Arc<AtomicUsize>) -> Arc<dyn ControlCallback> {
        callback_fn(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ControlHandlerResult::Ok)
        })
    }

    #[test]
    fn test_register_installs_bundle() {
        let reg = registry();
        let handle = reg
            .register(Arc::new(()), counting(Arc::default()), "XCBR1.Pos")
            .unwrap();

        assert_eq!(reg.len(), 1);
        assert!(reg.contains("XCBR1.Pos"));
        assert_eq!(reg.handle_for("XCBR1.Pos"), Some(handle));
        assert!(reg.table().is_live(handle));
    }

    #[test]
    fn test_empty_path_is_rejected() {
        let reg = registry();
        let err = reg
            .register(Arc::new(()), counting(Arc::default()), "")
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_nul_in_path_is_rejected() {
        let reg = registry();
        let err = reg
            .register(Arc::new(()), counting(Arc::default()), "XCBR1\0.Pos")
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)));
    }

    #[test]
    fn test_reregister_releases_previous_bundle() {
        let reg = registry();
        let first_owner: OwnerHandle = Arc::new(String::from("first"));
        let probe = Arc::downgrade(&first_owner);

        let first = reg
            .register(first_owner, counting(Arc::default()), "CSWI1.Pos")
            .unwrap();
        let second = reg
            .register(Arc::new(()), counting(Arc::default()), "CSWI1.Pos")
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(reg.len(), 1);
        assert!(probe.upgrade().is_none(), "previous owner still retained");
        assert!(!reg.table().is_live(first));
        assert!(reg.table().is_live(second));
        assert_eq!(reg.table().len(), 1);
    }

    #[test]
    fn test_unregister_releases_bundle() {
        let reg = registry();
        let owner: OwnerHandle = Arc::new(7u32);
        let probe = Arc::downgrade(&owner);
        let handle = reg
            .register(owner, counting(Arc::default()), "GGIO1.SPCSO1")
            .unwrap();

        assert!(reg.unregister("GGIO1.SPCSO1"));
        assert!(!reg.unregister("GGIO1.SPCSO1"));
        assert!(probe.upgrade().is_none());
        assert!(!reg.table().is_live(handle));
    }

    #[test]
    fn test_drop_retires_all_handles() {
        let table = Arc::new(HandleTable::new());
        let handles: Vec<_> = {
            let reg = ContextRegistry::with_table(Arc::clone(&table));
            ["A.Pos", "B.Pos", "C.Pos"]
                .iter()
                .map(|path| {
                    reg.register(Arc::new(()), counting(Arc::default()), *path)
                        .unwrap()
                })
                .collect()
        };

        assert!(table.is_empty());
        assert!(handles.iter().all(|h| !table.is_live(*h)));
    }

    #[test]
    fn test_bundle_invokes_with_its_path() {
        let reg = registry();
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let sink = Arc::clone(&seen);
        reg.register_fn(Arc::new(()), "XSWI2.Pos", move |_, req| {
            *sink.lock() = Some((req.path.to_string(), req.test));
            Ok(ControlHandlerResult::Ok)
        })
        .unwrap();

        let bundle = reg.get("XSWI2.Pos").unwrap();
        let result = bundle
            .invoke(ControlAction::from_addr(1), MmsValue::from_addr(2), true)
            .unwrap();

        assert_eq!(result, ControlHandlerResult::Ok);
        assert_eq!(*seen.lock(), Some(("XSWI2.Pos".to_string(), true)));
    }
}
