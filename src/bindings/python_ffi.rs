//! Python binding
//!
//! Python code registers `(owner, callback, path)` tuples and hands the
//! returned integer handle, together with `control_handler_address()`, to the
//! native library's control handler setter. Control actions and MMS values
//! arrive in Python as integer addresses, ready to be wrapped by the native
//! library's own Python bindings.

use std::ffi::c_void;
use std::sync::Arc;

use once_cell::sync::Lazy;
use pyo3::exceptions::{PyIOError, PyRuntimeError, PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyTuple};

use crate::control::{ControlAction, ControlHandlerResult, ControlRequest, MmsValue};
use crate::dispatch::{guard_with_default, record_error, Dispatcher, HostEnvironment};
use crate::errors::{BridgeError, BridgeResult, CallbackError};
use crate::infrastructure::config::DispatchConfig;
use crate::registry::{ContextRegistry, ControlCallback, HandleTable, OwnerHandle};

static DISPATCHER: Lazy<Dispatcher<PythonHost>> = Lazy::new(|| {
    Dispatcher::with_host(HandleTable::global(), PythonHost, DispatchConfig::from_env())
});

/// The interpreter's GIL is the exclusion lock
pub struct PythonHost;

impl HostEnvironment for PythonHost {
    fn with_exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        Python::with_gil(|_py| f())
    }

    fn report(&self, err: &BridgeError) {
        record_error(err);
        // A raising callback has already printed its own traceback
        if !err.raised_by_callback() {
            Python::with_gil(|py| to_py_err(err).print(py));
        }
    }
}

fn to_py_err(err: &BridgeError) -> PyErr {
    let message = err.to_string();
    match err {
        BridgeError::InvalidArgument(_) | BridgeError::TypeMismatch(_) => {
            PyTypeError::new_err(message)
        }
        BridgeError::CallbackFailed { .. } | BridgeError::CallbackPanicked { .. } => {
            PyRuntimeError::new_err(message)
        }
        BridgeError::Config(_) => PyValueError::new_err(message),
        BridgeError::Io(_) => PyIOError::new_err(message),
    }
}

struct PyCallback {
    callable: PyObject,
    /// False for bound methods, which already carry their owner
    pass_owner: bool,
}

impl ControlCallback for PyCallback {
    fn on_control(
        &self,
        owner: &OwnerHandle,
        request: &ControlRequest<'_>,
    ) -> Result<ControlHandlerResult, CallbackError> {
        Python::with_gil(|py| {
            let (action, path, value, test) = request.args();
            let result = if self.pass_owner {
                let owner = owner
                    .downcast_ref::<PyObject>()
                    .ok_or_else(|| CallbackError::new("owner is not a Python object"))?;
                self.callable.call1(
                    py,
                    (owner.clone_ref(py), action.addr(), path, value.addr(), test),
                )
            } else {
                self.callable
                    .call1(py, (action.addr(), path, value.addr(), test))
            };

            match result {
                Ok(ret) => Ok(status_from_py(ret.as_ref(py))),
                Err(err) => {
                    let reason = err.to_string();
                    err.print(py);
                    Err(CallbackError::new(reason))
                }
            }
        })
    }
}

/// None means success; a bool or an int status is honoured
fn status_from_py(ret: &PyAny) -> ControlHandlerResult {
    if ret.is_none() {
        return ControlHandlerResult::Ok;
    }
    if let Ok(flag) = ret.extract::<bool>() {
        return if flag {
            ControlHandlerResult::Ok
        } else {
            ControlHandlerResult::Failed
        };
    }
    match ret.extract::<i32>() {
        Ok(raw) => ControlHandlerResult::from_raw(raw),
        Err(_) => ControlHandlerResult::Ok,
    }
}

/// Split the `(owner, callback, path)` registration tuple
fn unpack_context(context: &PyAny) -> BridgeResult<(PyObject, PyObject, String)> {
    let shape_error =
        || BridgeError::InvalidArgument("expected a tuple (owner, callback, path)".into());

    let tuple: &PyTuple = context.downcast().map_err(|_| shape_error())?;
    if tuple.len() != 3 {
        return Err(shape_error());
    }

    let item = |index: usize| tuple.get_item(index).map_err(|_| shape_error());
    let owner = item(0)?;
    let callback = item(1)?;
    if !callback.is_callable() {
        return Err(BridgeError::InvalidArgument(
            "callback is not callable".into(),
        ));
    }
    let path: String = item(2)?
        .extract()
        .map_err(|_| BridgeError::InvalidArgument("path must be a str".into()))?;

    let py = context.py();
    Ok((owner.to_object(py), callback.to_object(py), path))
}

#[pyclass(name = "ControlContextRegistry", module = "ctlbridge")]
pub struct PyControlRegistry {
    inner: ContextRegistry,
}

#[pymethods]
impl PyControlRegistry {
    #[new]
    fn new() -> Self {
        Self {
            inner: ContextRegistry::new(),
        }
    }

    /// Register `(owner, callback, path)`; returns the handler parameter
    #[pyo3(signature = (context, pass_owner = true))]
    fn register(&self, context: &PyAny, pass_owner: bool) -> PyResult<usize> {
        let (owner, callable, path) = unpack_context(context).map_err(|e| to_py_err(&e))?;
        let callback = Arc::new(PyCallback {
            callable,
            pass_owner,
        });

        self.inner
            .register(Arc::new(owner), callback, path)
            .map(|handle| handle.as_raw())
            .map_err(|e| to_py_err(&e))
    }

    fn unregister(&self, path: &str) -> bool {
        self.inner.unregister(path)
    }

    fn handle_for(&self, path: &str) -> Option<usize> {
        self.inner.handle_for(path).map(|handle| handle.as_raw())
    }

    fn paths(&self) -> Vec<String> {
        self.inner.paths()
    }

    fn clear(&self) {
        self.inner.clear();
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __contains__(&self, path: &str) -> bool {
        self.inner.contains(path)
    }
}

/// Control handler for the native library when the host is Python
pub extern "C" fn python_control_handler(
    action: *mut c_void,
    user_data: *mut c_void,
    ctl_val: *mut c_void,
    test: bool,
) -> ControlHandlerResult {
    guard_with_default(
        "python_control_handler",
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

#[pyfunction]
fn control_handler_address() -> usize {
    python_control_handler as *const () as usize
}

/// Dispatch as the native library would, from outside the GIL
#[pyfunction]
#[pyo3(signature = (handle, action, value, test = false))]
fn dispatch(py: Python<'_>, handle: usize, action: usize, value: usize, test: bool) -> i32 {
    py.allow_threads(|| {
        DISPATCHER
            .dispatch(
                handle as *mut c_void,
                ControlAction::from_addr(action),
                MmsValue::from_addr(value),
                test,
            )
            .as_raw()
    })
}

#[pyfunction]
fn stats(py: Python<'_>) -> PyResult<PyObject> {
    let snapshot = DISPATCHER.stats();
    let dict = PyDict::new(py);
    dict.set_item("received", snapshot.received)?;
    dict.set_item("completed", snapshot.completed)?;
    dict.set_item("rejected", snapshot.rejected)?;
    dict.set_item("callback_errors", snapshot.callback_errors)?;
    dict.set_item("panics", snapshot.panics)?;
    Ok(dict.to_object(py))
}

pub fn register_module(m: &PyModule) -> PyResult<()> {
    m.add_class::<PyControlRegistry>()?;
    m.add_function(wrap_pyfunction!(control_handler_address, m)?)?;
    m.add_function(wrap_pyfunction!(dispatch, m)?)?;
    m.add_function(wrap_pyfunction!(stats, m)?)?;
    m.add("CONTROL_RESULT_FAILED", ControlHandlerResult::Failed.as_raw())?;
    m.add("CONTROL_RESULT_OK", ControlHandlerResult::Ok.as_raw())?;
    m.add("CONTROL_RESULT_WAITING", ControlHandlerResult::Waiting.as_raw())?;
    Ok(())
}
