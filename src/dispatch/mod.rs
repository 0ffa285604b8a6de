//! Control handler dispatch
//!
//! Design: The native library calls back with the user-data it was given at
//! registration. The dispatcher:
//! 1. Decodes the user-data and resolves it through the [`HandleTable`]
//! 2. Holds a strong reference to the bundle for the length of the call
//! 3. Invokes the callback once, under the host exclusion lock, inside a
//!    panic guard
//! 4. Returns a status; failures go to the host error channel, never up the
//!    native stack

mod guard;
mod host;
mod stats;

pub use guard::{catch_callback, guard_with_default, panic_message};
pub use host::{record_error, HostEnvironment, NativeHost};
pub use stats::{DispatchStats, DispatchStatsSnapshot};

use crate::control::{ControlAction, ControlHandlerResult, MmsValue};
use crate::errors::{BridgeError, BridgeResult};
use crate::infrastructure::config::DispatchConfig;
use crate::registry::{ContextBundle, HandleTable, RegistrationHandle};
use core::ffi::c_void;
use stats::CallbackTimer;
use std::sync::Arc;
use tracing::{debug, trace};

pub struct Dispatcher<H: HostEnvironment = NativeHost> {
    table: Arc<HandleTable>,
    host: H,
    stats: DispatchStats,
    config: DispatchConfig,
}

impl Dispatcher<NativeHost> {
    pub fn new(table: Arc<HandleTable>) -> Self {
        Self::with_host(table, NativeHost::new(), DispatchConfig::default())
    }
}

impl<H: HostEnvironment> Dispatcher<H> {
    pub fn with_host(table: Arc<HandleTable>, host: H, config: DispatchConfig) -> Self {
        Self {
            table,
            host,
            stats: DispatchStats::default(),
            config,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn table(&self) -> &Arc<HandleTable> {
        &self.table
    }

    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }

    /// Entry point for the native callback
    ///
    /// Never panics and never returns an error: anything that goes wrong is
    /// reported to the host and answered with `Failed`.
    pub fn dispatch(
        &self,
        user_data: *mut c_void,
        action: ControlAction,
        value: MmsValue,
        test: bool,
    ) -> ControlHandlerResult {
        match self.try_dispatch(user_data, action, value, test) {
            Ok(status) => status,
            Err(err) => {
                self.host.report(&err);
                ControlHandlerResult::Failed
            }
        }
    }

    pub fn dispatch_handle(
        &self,
        handle: RegistrationHandle,
        action: ControlAction,
        value: MmsValue,
        test: bool,
    ) -> ControlHandlerResult {
        self.dispatch(handle.as_user_data(), action, value, test)
    }

    /// Like [`Dispatcher::dispatch`], but hands the error back instead of
    /// reporting it
    pub fn try_dispatch(
        &self,
        user_data: *mut c_void,
        action: ControlAction,
        value: MmsValue,
        test: bool,
    ) -> BridgeResult<ControlHandlerResult> {
        self.stats.record_received();

        let bundle = match self.resolve(user_data) {
            Ok(bundle) => bundle,
            Err(err) => {
                self.stats.record_rejected();
                return Err(err);
            }
        };

        trace!(
            event = "dispatch",
            path = %bundle.path(),
            handle = %bundle.handle(),
            action = ?action,
            test
        );

        let outcome = self.host.with_exclusive(|| {
            let _timer = CallbackTimer::start(
                bundle.path(),
                self.config.slow_callback(),
                self.config.track_performance,
            );
            catch_callback(|| bundle.invoke(action, value, test))
        });

        match outcome {
            Ok(Ok(status)) => {
                self.stats.record_completed();
                Ok(status)
            }
            Ok(Err(err)) => {
                self.stats.record_callback_error();
                Err(BridgeError::CallbackFailed {
                    path: bundle.path().to_string(),
                    reason: err.to_string(),
                })
            }
            Err(message) => {
                self.stats.record_panic();
                Err(BridgeError::CallbackPanicked {
                    path: bundle.path().to_string(),
                    message,
                })
            }
        }
    }

    fn resolve(&self, user_data: *mut c_void) -> BridgeResult<Arc<ContextBundle>> {
        let handle = RegistrationHandle::from_user_data(user_data).ok_or_else(|| {
            BridgeError::TypeMismatch("control handler context is null".to_string())
        })?;

        self.table.resolve(handle).ok_or_else(|| {
            debug!(event = "stale_handle", handle = %handle, "Rejected unknown control context");
            BridgeError::TypeMismatch(format!(
                "control handler context {} is not a registered context",
                handle
            ))
        })
    }
}
