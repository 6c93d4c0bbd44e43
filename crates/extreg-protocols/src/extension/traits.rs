//! Extension trait definition.

use std::any::Any;
use std::path::Path;

use crate::definition::ExtensionDef;
use crate::error::ExtensionError;

/// Core trait for live extension instances.
///
/// A handler constructs the instance, calls [`Extension::init`] once with the
/// definition and the extension's code directory, then shares it behind an
/// `Arc`. Reentrant extensions must tolerate concurrent use of that single
/// instance.
pub trait Extension: Send + Sync + 'static {
    /// Initialize the extension before first use.
    fn init(&mut self, def: &ExtensionDef, code_root: &Path) -> Result<(), ExtensionError>;

    /// Called when the owning handler evicts the instance.
    fn shutdown(&self) {}

    /// Returns a reference to the extension as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}
