//! Context bundle - owner, callback and path captured at registration

use super::handle::RegistrationHandle;
use crate::control::{ControlAction, ControlHandlerResult, ControlRequest, MmsValue};
use crate::errors::CallbackError;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque reference to the registering object, handed back to its callback
pub type OwnerHandle = Arc<dyn Any + Send + Sync>;

/// Receiver of control handler invocations
pub trait ControlCallback: Send + Sync {
    fn on_control(
        &self,
        owner: &OwnerHandle,
        request: &ControlRequest<'_>,
    ) -> Result<ControlHandlerResult, CallbackError>;
}

/// Adapter turning a closure into a [`ControlCallback`]
pub struct FnCallback<F>(pub F);

impl<F> ControlCallback for FnCallback<F>
where
    F: Fn(&OwnerHandle, &ControlRequest<'_>) -> Result<ControlHandlerResult, CallbackError>
        + Send
        + Sync,
{
    #[inline]
    fn on_control(
        &self,
        owner: &OwnerHandle,
        request: &ControlRequest<'_>,
    ) -> Result<ControlHandlerResult, CallbackError> {
        (self.0)(owner, request)
    }
}

/// Box a closure as a shareable callback
pub fn callback_fn<F>(callback: F) -> Arc<dyn ControlCallback>
where
    F: Fn(&OwnerHandle, &ControlRequest<'_>) -> Result<ControlHandlerResult, CallbackError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnCallback(callback))
}

/// Immutable once built. Owned by the registry entry for its path.
pub struct ContextBundle {
    handle: RegistrationHandle,
    owner: OwnerHandle,
    callback: Arc<dyn ControlCallback>,
    path: String,
}

impl ContextBundle {
    pub(crate) fn new(
        handle: RegistrationHandle,
        owner: OwnerHandle,
        callback: Arc<dyn ControlCallback>,
        path: String,
    ) -> Self {
        Self {
            handle,
            owner,
            callback,
            path,
        }
    }

    #[inline]
    pub fn handle(&self) -> RegistrationHandle {
        self.handle
    }

    #[inline]
    pub fn owner(&self) -> &OwnerHandle {
        &self.owner
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Call the callback once with `(owner, action, path, value, test)`
    pub fn invoke(
        &self,
        action: ControlAction,
        value: MmsValue,
        test: bool,
    ) -> Result<ControlHandlerResult, CallbackError> {
        let request = ControlRequest::new(action, &self.path, value, test);
        self.callback.on_control(&self.owner, &request)
    }
}

impl fmt::Debug for ContextBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextBundle")
            .field("handle", &self.handle)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
