//! Change notifications for registered extensions.

use crate::error::ExtensionError;
use crate::reference::ExtensionRef;

/// Receives add/update/remove notifications from the extension manager.
///
/// Errors are logged by the manager and never fail the operation that
/// triggered the notification.
pub trait ExtensionListener: Send + Sync {
    fn extension_added(&self, _reference: &ExtensionRef) -> Result<(), ExtensionError> {
        Ok(())
    }

    fn extension_updated(&self, _reference: &ExtensionRef) -> Result<(), ExtensionError> {
        Ok(())
    }

    fn extension_removed(&self, _reference: &ExtensionRef) -> Result<(), ExtensionError> {
        Ok(())
    }
}
