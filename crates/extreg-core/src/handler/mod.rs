//! Extension handlers.
//!
//! Every handler shares the [`HandlerBase`] lifecycle. Handlers are
//! extensions themselves: the [`HandlerOfHandlers`] registers, versions and
//! instantiates them the same way handlers do for ordinary extensions.

mod base;
mod hoh;
mod libraries;
mod native;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use extreg_protocols::{Extension, ExtensionDef, ExtensionError, ExtensionRef, ResourceFile};

use crate::pattern::LikePattern;

pub use base::{HandlerBase, InstanceFactory, CONFIG_FILE_PARAM, DEFAULT_CONFIG_FILE};
pub use hoh::{
    HandlerFactories, HandlerLoader, HandlerOfHandlers, HANDLER_CONTEXT, HANDLER_INTERFACE,
    HANDLER_OF_HANDLERS_NAME, SELF_NAME,
};
pub use libraries::{
    constructor_symbol, is_dynamic_library, ExtraLibraries, LibrarySet, LibraryWatcher,
    CONSTRUCTOR_PREFIX, LIBRARY_EXTENSIONS,
};
pub use native::{ExtensionFactories, NativeExtensionHandler, NativeLoader, NATIVE_HANDLER_CLASS};

/// A handler as seen by the manager and the handler of handlers.
///
/// All operations except `init` fail with
/// [`ExtensionError::IllegalState`] unless the handler is initialized.
pub trait ExtensionHandler: Send + Sync {
    fn name(&self) -> Option<String>;

    fn init(&self, def: &ExtensionDef, code_root: &Path) -> Result<(), ExtensionError>;

    fn shutdown(&self);

    fn is_initialized(&self) -> bool;

    /// Register a new extension at version 1 and return the stored
    /// definition.
    fn install(
        &self,
        def: ExtensionDef,
        resources: &[ResourceFile],
    ) -> Result<ExtensionDef, ExtensionError>;

    /// Replace an existing extension with its next version.
    fn update(
        &self,
        def: ExtensionDef,
        resources: &[ResourceFile],
    ) -> Result<ExtensionDef, ExtensionError>;

    fn remove(&self, reference: &ExtensionRef) -> Result<(), ExtensionError>;

    /// Live instance, constructed on first use.
    fn prepare(&self, reference: &ExtensionRef) -> Result<Arc<dyn Extension>, ExtensionError>;

    fn exists(&self, reference: &ExtensionRef) -> Result<bool, ExtensionError>;

    fn get_extension_def(&self, reference: &ExtensionRef) -> Result<ExtensionDef, ExtensionError>;

    fn get_extension_names(
        &self,
        context: Option<&str>,
        interface: Option<&LikePattern>,
        name: Option<&LikePattern>,
    ) -> Result<Vec<ExtensionRef>, ExtensionError>;

    fn get_resources(&self, def: &ExtensionDef) -> Result<Vec<String>, ExtensionError>;

    /// Current version directory of an extension.
    fn code_root(&self, reference: &ExtensionRef) -> Result<PathBuf, ExtensionError>;

    /// Retry deferred deletions; returns how many remain.
    fn purge_pending_removals(&self) -> Result<usize, ExtensionError>;
}

impl ExtensionHandler for HandlerBase<dyn Extension> {
    fn name(&self) -> Option<String> {
        HandlerBase::name(self)
    }

    fn init(&self, def: &ExtensionDef, code_root: &Path) -> Result<(), ExtensionError> {
        HandlerBase::init(self, def, code_root)
    }

    fn shutdown(&self) {
        HandlerBase::shutdown(self)
    }

    fn is_initialized(&self) -> bool {
        HandlerBase::is_initialized(self)
    }

    fn install(
        &self,
        def: ExtensionDef,
        resources: &[ResourceFile],
    ) -> Result<ExtensionDef, ExtensionError> {
        HandlerBase::install(self, def, resources)
    }

    fn update(
        &self,
        def: ExtensionDef,
        resources: &[ResourceFile],
    ) -> Result<ExtensionDef, ExtensionError> {
        HandlerBase::update(self, def, resources)
    }

    fn remove(&self, reference: &ExtensionRef) -> Result<(), ExtensionError> {
        HandlerBase::remove(self, reference)
    }

    fn prepare(&self, reference: &ExtensionRef) -> Result<Arc<dyn Extension>, ExtensionError> {
        HandlerBase::prepare(self, reference)
    }

    fn exists(&self, reference: &ExtensionRef) -> Result<bool, ExtensionError> {
        HandlerBase::exists(self, reference)
    }

    fn get_extension_def(&self, reference: &ExtensionRef) -> Result<ExtensionDef, ExtensionError> {
        HandlerBase::get_extension_def(self, reference)
    }

    fn get_extension_names(
        &self,
        context: Option<&str>,
        interface: Option<&LikePattern>,
        name: Option<&LikePattern>,
    ) -> Result<Vec<ExtensionRef>, ExtensionError> {
        HandlerBase::get_extension_names(self, context, interface, name)
    }

    fn get_resources(&self, def: &ExtensionDef) -> Result<Vec<String>, ExtensionError> {
        HandlerBase::get_resources(self, def)
    }

    fn code_root(&self, reference: &ExtensionRef) -> Result<PathBuf, ExtensionError> {
        HandlerBase::code_root(self, reference)
    }

    fn purge_pending_removals(&self) -> Result<usize, ExtensionError> {
        HandlerBase::purge_pending_removals(self)
    }
}
