//! Control values - opaque handles owned by the native protocol library
//!
//! Design: The bridge never interprets control actions or MMS values. They are
//! carried as pointer-sized handles and forwarded to the registered callback
//! untouched. Only the result status is understood here.

use core::ffi::c_void;
use core::fmt;

macro_rules! foreign_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(*mut c_void);

        impl $name {
            /// Wrap a pointer handed over by the native library
            #[inline]
            pub const fn from_raw(ptr: *mut c_void) -> Self {
                Self(ptr)
            }

            /// Wrap an address received from a host language
            #[inline]
            pub fn from_addr(addr: usize) -> Self {
                Self(addr as *mut c_void)
            }

            #[inline]
            pub const fn as_ptr(self) -> *mut c_void {
                self.0
            }

            /// Address as an integer, for hosts without pointer types
            #[inline]
            pub fn addr(self) -> usize {
                self.0 as usize
            }

            #[inline]
            pub fn is_null(self) -> bool {
                self.0.is_null()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:p})", stringify!($name), self.0)
            }
        }

        // Safety: the pointee is owned by the native library and never
        // dereferenced on the Rust side, only passed along.
        unsafe impl Send for $name {}
        unsafe impl Sync for $name {}
    };
}

foreign_handle!(
    /// Control action descriptor (`ControlAction` in the native API)
    ControlAction
);

foreign_handle!(
    /// Control value payload (`MmsValue*` in the native API)
    MmsValue
);

/// Result status returned to the native library from a control handler
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlHandlerResult {
    Failed = 0,
    Ok = 1,
    Waiting = 2,
}

impl ControlHandlerResult {
    /// Decode a raw status. Unknown values fail closed.
    pub const fn from_raw(raw: i32) -> Self {
        match raw {
            1 => Self::Ok,
            2 => Self::Waiting,
            _ => Self::Failed,
        }
    }

    #[inline]
    pub const fn as_raw(self) -> i32 {
        self as i32
    }

    #[inline]
    pub const fn is_failed(self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl Default for ControlHandlerResult {
    fn default() -> Self {
        Self::Ok
    }
}

/// Arguments of a single control handler invocation
#[derive(Debug, Clone, Copy)]
pub struct ControlRequest<'a> {
    pub action: ControlAction,
    pub path: &'a str,
    pub value: MmsValue,
    pub test: bool,
}

impl<'a> ControlRequest<'a> {
    pub fn new(action: ControlAction, path: &'a str, value: MmsValue, test: bool) -> Self {
        Self {
            action,
            path,
            value,
            test,
        }
    }

    /// Arguments in callback order: action, path, value, test flag
    pub fn args(&self) -> (ControlAction, &'a str, MmsValue, bool) {
        (self.action, self.path, self.value, self.test)
    }
}
