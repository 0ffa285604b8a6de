// C and Python bindings for the control handler bridge

pub mod c_api;

#[cfg(feature = "python")]
pub mod python_ffi;
