//! C API for native embedders
//!
//! Design: The native protocol library is given `ctlbridge_control_handler`
//! as its control handler and the handle from `ctlbridge_register` as the
//! handler parameter. Errors are reported through `ctlbridge_last_error`.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::ptr;
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use tracing_appender::non_blocking::WorkerGuard;

use crate::control::{ControlAction, ControlHandlerResult, ControlRequest, MmsValue};
use crate::dispatch::{guard_with_default, record_error, Dispatcher, NativeHost};
use crate::errors::{self, BridgeError, BridgeResult, CallbackError};
use crate::infrastructure::config::BridgeConfig;
use crate::infrastructure::logging;
use crate::registry::{ContextRegistry, ControlCallback, HandleTable, OwnerHandle};

/// Callback signature: `(owner, action, path, ctl_val, test) -> status`
pub type ControlCallbackFn = unsafe extern "C" fn(
    owner: *mut c_void,
    action: *mut c_void,
    path: *const c_char,
    ctl_val: *mut c_void,
    test: bool,
) -> i32;

static CONFIG: OnceCell<BridgeConfig> = OnceCell::new();
static LOG_GUARD: Mutex<Option<WorkerGuard>> = parking_lot::const_mutex(None);

static DISPATCHER: Lazy<Dispatcher<NativeHost>> = Lazy::new(|| {
    let dispatch = config().dispatch.clone();
    Dispatcher::with_host(HandleTable::global(), NativeHost::new(), dispatch)
});

fn config() -> &'static BridgeConfig {
    CONFIG.get_or_init(BridgeConfig::from_env)
}

/// Owner pointer supplied by the embedder
struct ForeignOwner(*mut c_void);

// Safety: the pointer is never dereferenced here, only handed back to the
// embedder's callback.
unsafe impl Send for ForeignOwner {}
unsafe impl Sync for ForeignOwner {}

struct CCallback {
    func: ControlCallbackFn,
    path: CString,
}

impl ControlCallback for CCallback {
    fn on_control(
        &self,
        owner: &OwnerHandle,
        request: &ControlRequest<'_>,
    ) -> Result<ControlHandlerResult, CallbackError> {
        let owner = owner
            .downcast_ref::<ForeignOwner>()
            .ok_or_else(|| CallbackError::new("owner is not a native pointer"))?;

        let raw = unsafe {
            (self.func)(
                owner.0,
                request.action.as_ptr(),
                self.path.as_ptr(),
                request.value.as_ptr(),
                request.test,
            )
        };
        Ok(ControlHandlerResult::from_raw(raw))
    }
}

/// Initialize logging from environment variables. Returns 0.
#[no_mangle]
pub extern "C" fn ctlbridge_init() -> i32 {
    let guard = logging::init_from_config(&config().logging);
    store_guard(guard);
    0
}

/// Load configuration from a TOML file and initialize logging
///
/// Must be called before the first dispatch for the dispatch settings to
/// apply. Returns 0 on success, -1 on error.
#[no_mangle]
pub extern "C" fn ctlbridge_init_with_config(path: *const c_char) -> i32 {
    let result = unsafe { c_str_arg(path, "config path") }.and_then(|path| {
        let loaded = BridgeConfig::load(path)?;
        CONFIG
            .set(loaded)
            .map_err(|_| BridgeError::Config("configuration already initialized".into()))
    });

    match result {
        Ok(()) => ctlbridge_init(),
        Err(err) => {
            record_error(&err);
            -1
        }
    }
}

/// Flush and release logging resources
#[no_mangle]
pub extern "C" fn ctlbridge_shutdown() {
    LOG_GUARD.lock().take();
}

/// Create a registry. Free with `ctlbridge_registry_free`.
#[no_mangle]
pub extern "C" fn ctlbridge_registry_new() -> *mut ContextRegistry {
    let registry = ContextRegistry::from_config(&config().registry, HandleTable::global());
    Box::into_raw(Box::new(registry))
}

/// Free a registry, releasing every context it holds
///
/// # Safety
/// `registry` must come from `ctlbridge_registry_new` and not be used again.
#[no_mangle]
pub unsafe extern "C" fn ctlbridge_registry_free(registry: *mut ContextRegistry) {
    if !registry.is_null() {
        drop(Box::from_raw(registry));
    }
}

/// Register a callback for a control object path
///
/// Returns the handler parameter to pass to the native library, or null on
/// error (see `ctlbridge_last_error`).
///
/// # Safety
/// `registry` must be a live registry, `path` a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn ctlbridge_register(
    registry: *const ContextRegistry,
    owner: *mut c_void,
    callback: Option<ControlCallbackFn>,
    path: *const c_char,
) -> *mut c_void {
    guard_with_default("ctlbridge_register", ptr::null_mut(), || {
        match register_impl(registry, owner, callback, path) {
            Ok(user_data) => user_data,
            Err(err) => {
                record_error(&err);
                ptr::null_mut()
            }
        }
    })
}

unsafe fn register_impl(
    registry: *const ContextRegistry,
    owner: *mut c_void,
    callback: Option<ControlCallbackFn>,
    path: *const c_char,
) -> BridgeResult<*mut c_void> {
    let registry = registry
        .as_ref()
        .ok_or_else(|| BridgeError::InvalidArgument("registry is null".into()))?;
    let func = callback
        .ok_or_else(|| BridgeError::InvalidArgument("callback is not invocable".into()))?;
    let path = c_str_arg(path, "path")?;

    let callback = Arc::new(CCallback {
        func,
        path: CString::new(path).map_err(|e| BridgeError::InvalidArgument(e.to_string()))?,
    });
    let handle = registry.register(Arc::new(ForeignOwner(owner)), callback, path)?;
    Ok(handle.as_user_data())
}

/// Release the context for `path`. Returns true if one was registered.
///
/// # Safety
/// `registry` must be a live registry, `path` a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn ctlbridge_unregister(
    registry: *const ContextRegistry,
    path: *const c_char,
) -> bool {
    let Some(registry) = registry.as_ref() else {
        return false;
    };
    match c_str_arg(path, "path") {
        Ok(path) => registry.unregister(path),
        Err(err) => {
            record_error(&err);
            false
        }
    }
}

/// Control handler to install in the native library
#[no_mangle]
pub extern "C" fn ctlbridge_control_handler(
    action: *mut c_void,
    user_data: *mut c_void,
    ctl_val: *mut c_void,
    test: bool,
) -> ControlHandlerResult {
    guard_with_default(
        "ctlbridge_control_handler",
        ControlHandlerResult::Failed,
        || {
            DISPATCHER.dispatch(
                user_data,
                ControlAction::from_raw(action),
                MmsValue::from_raw(ctl_val),
                test,
            )
        },
    )
}

/// Take the calling thread's last error
///
/// Returns null if there is none. Free with `ctlbridge_free_string`.
#[no_mangle]
pub extern "C" fn ctlbridge_last_error() -> *mut c_char {
    errors::take_last_error()
        .and_then(|message| CString::new(message).ok())
        .map_or(ptr::null_mut(), CString::into_raw)
}

/// Dispatch counters as a JSON object. Free with `ctlbridge_free_string`.
#[no_mangle]
pub extern "C" fn ctlbridge_stats_json() -> *mut c_char {
    serde_json::to_string(&DISPATCHER.stats())
        .ok()
        .and_then(|json| CString::new(json).ok())
        .map_or(ptr::null_mut(), CString::into_raw)
}

/// Free a string returned by this library
///
/// # Safety
/// `s` must come from this library and not be freed twice.
#[no_mangle]
pub unsafe extern "C" fn ctlbridge_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

fn store_guard(guard: Option<WorkerGuard>) {
    if let Some(guard) = guard {
        *LOG_GUARD.lock() = Some(guard);
    }
}

/// # Safety
/// `ptr` must be null or a NUL-terminated string outliving `'a`.
unsafe fn c_str_arg<'a>(ptr: *const c_char, what: &str) -> BridgeResult<&'a str> {
    if ptr.is_null() {
        return Err(BridgeError::InvalidArgument(format!("{} is null", what)));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| BridgeError::InvalidArgument(format!("{} is not valid UTF-8", what)))
}
