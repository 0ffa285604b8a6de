//! Error taxonomy and the host-side error channel
//!
//! Errors found while the native library is calling into the bridge cannot be
//! returned through the native frame. They are logged and parked in a
//! thread-local slot the host can drain afterwards.

use std::cell::RefCell;
use thiserror::Error;

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("callback for '{path}' failed: {reason}")]
    CallbackFailed { path: String, reason: String },

    #[error("callback for '{path}' panicked: {message}")]
    CallbackPanicked { path: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Short stable name, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::TypeMismatch(_) => "type_mismatch",
            Self::CallbackFailed { .. } => "callback_failed",
            Self::CallbackPanicked { .. } => "callback_panicked",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }

    /// The callback itself reported this failure
    pub fn raised_by_callback(&self) -> bool {
        matches!(self, Self::CallbackFailed { .. })
    }
}

impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Error returned by a control callback
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CallbackError(pub String);

impl CallbackError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Record an error for the current thread, replacing any previous one
pub fn set_last_error(err: &BridgeError) {
    let message = err.to_string();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
}

/// Take the last error recorded on this thread, clearing the slot
pub fn take_last_error() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow_mut().take())
}

/// Peek at the last error without clearing it
pub fn last_error_message() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

pub fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}
