//! Panic guard for code running under a native caller
//!
//! Unwinding through an `extern "C"` frame is undefined behaviour, so every
//! callback runs inside `catch_unwind`.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Extract a readable message from a panic payload
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

/// Run `f`, turning a panic into `Err(message)`
pub fn catch_callback<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(panic_message)
}

/// Run `f`, returning `default` if it panics
pub fn guard_with_default<T>(op: &'static str, default: T, f: impl FnOnce() -> T) -> T {
    match catch_callback(f) {
        Ok(value) => value,
        Err(msg) => {
            tracing::error!(event = "ffi_panic", op, message = %msg, "panic caught at FFI boundary");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_messages() {
        assert_eq!(catch_callback(|| panic!("static")), Err::<(), _>("static".into()));
        assert_eq!(
            catch_callback(|| panic!("{} owned", 1)),
            Err::<(), _>("1 owned".into())
        );
        assert_eq!(catch_callback(|| 5), Ok(5));
    }

    #[test]
    fn test_guard_default() {
        assert_eq!(guard_with_default("test", -1, || panic!("boom")), -1);
        assert_eq!(guard_with_default("test", -1, || 3), 3);
    }
}
