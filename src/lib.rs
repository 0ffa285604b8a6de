//! ctlbridge - control handler bridge for IEC 61850 native callbacks
//!
//! The native protocol library reports control operations through a C
//! callback carrying a `void*` parameter. This crate owns the contexts those
//! parameters refer to and routes each invocation to the callback registered
//! for its control object path.

pub mod bindings;
pub mod control;
pub mod dispatch;
pub mod errors;
pub mod infrastructure;
pub mod registry;

// Re-export commonly used items
pub use control::{ControlAction, ControlHandlerResult, ControlRequest, MmsValue};
pub use dispatch::{DispatchStatsSnapshot, Dispatcher, HostEnvironment, NativeHost};
pub use errors::{BridgeError, BridgeResult, CallbackError};
pub use infrastructure::{BridgeConfig, LogConfig};
pub use registry::{
    callback_fn, ContextBundle, ContextRegistry, ControlCallback, HandleTable, OwnerHandle,
    RegistrationHandle,
};

#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
#[pymodule]
fn ctlbridge(_py: Python, m: &PyModule) -> PyResult<()> {
    bindings::python_ffi::register_module(m)
}
