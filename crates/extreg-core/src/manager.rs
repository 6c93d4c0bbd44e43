//! Extension manager facade.
//!
//! Resolves the handler owning a reference, delegates to it and fans change
//! notifications out to registered listeners.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use extreg_config::ManagerConfig;
use extreg_protocols::reference::canonicalize_context;
use extreg_protocols::{
    Extension, ExtensionDef, ExtensionError, ExtensionListener, ExtensionRef, ResourceFile,
    CLASS_NAME_PARAM,
};

use crate::handler::{
    ExtensionFactories, ExtensionHandler, ExtraLibraries, HandlerFactories, HandlerOfHandlers,
    LibraryWatcher, CONFIG_FILE_PARAM, HANDLER_INTERFACE, HANDLER_OF_HANDLERS_NAME,
};
use crate::pattern::{matches_opt, LikePattern};

type ListenerMap = HashMap<Option<ExtensionRef>, Vec<Arc<dyn ExtensionListener>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Added,
    Updated,
    Removed,
}

struct ManagerState {
    hoh: Arc<HandlerOfHandlers>,
    code_root: PathBuf,
    _watcher: Option<LibraryWatcher>,
}

/// Handler owning a reference.
enum Target {
    Hoh(Arc<HandlerOfHandlers>),
    Handler(Arc<dyn ExtensionHandler>),
}

/// Entry point for registering, updating, removing and preparing
/// extensions.
pub struct ExtensionManager {
    state: RwLock<Option<ManagerState>>,
    listeners: Mutex<ListenerMap>,
    extension_factories: Arc<ExtensionFactories>,
    handler_factories: Arc<HandlerFactories>,
    extra_libraries: Arc<ExtraLibraries>,
}

impl ExtensionManager {
    /// Create an uninitialized manager with the native handler available.
    pub fn new() -> Self {
        let extension_factories = Arc::new(ExtensionFactories::new());
        let extra_libraries = Arc::new(ExtraLibraries::new());
        let handler_factories = Arc::new(HandlerFactories::with_native(
            Arc::clone(&extension_factories),
            Arc::clone(&extra_libraries),
        ));
        Self {
            state: RwLock::new(None),
            listeners: Mutex::new(HashMap::new()),
            extension_factories,
            handler_factories,
            extra_libraries,
        }
    }

    /// In-process extension constructors used by native handlers.
    pub fn extension_factories(&self) -> &Arc<ExtensionFactories> {
        &self.extension_factories
    }

    /// Handler implementations available to the handler of handlers.
    pub fn handler_factories(&self) -> &Arc<HandlerFactories> {
        &self.handler_factories
    }

    /// Libraries shared by every native extension.
    pub fn extra_libraries(&self) -> &Arc<ExtraLibraries> {
        &self.extra_libraries
    }

    /// Bootstrap over `code_root`. Calling it again is a no-op.
    ///
    /// In server mode the library directory is watched for new libraries.
    pub fn init(
        &self,
        code_root: &Path,
        config: &ManagerConfig,
        is_server: bool,
    ) -> Result<(), ExtensionError> {
        let mut state = self.state.write();
        if state.is_some() {
            debug!("Extension manager already initialized");
            return Ok(());
        }

        fs::create_dir_all(code_root).map_err(|e| {
            ExtensionError::IllegalState(format!(
                "cannot create code root {}: {}",
                code_root.display(),
                e
            ))
        })?;

        let hoh = Arc::new(HandlerOfHandlers::bootstrap(
            Arc::clone(&self.handler_factories),
            code_root,
            &config.handlers_file,
        )?);
        Self::seed_default_handler(&hoh, config)?;

        let watcher = if is_server {
            let dir = if config.library_dir.is_absolute() {
                config.library_dir.clone()
            } else {
                code_root.join(&config.library_dir)
            };
            match LibraryWatcher::start(&dir, Arc::clone(&self.extra_libraries)) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!("Library watcher not started: {}", e);
                    None
                }
            }
        } else {
            None
        };

        info!("Extension manager initialized at {:?}", code_root);
        *state = Some(ManagerState {
            hoh,
            code_root: code_root.to_path_buf(),
            _watcher: watcher,
        });
        Ok(())
    }

    fn seed_default_handler(
        hoh: &HandlerOfHandlers,
        config: &ManagerConfig,
    ) -> Result<(), ExtensionError> {
        let handler = &config.default_handler;
        let reference = HandlerOfHandlers::handler_reference(&handler.name)?;
        if hoh.exists(&reference)? {
            return Ok(());
        }

        let def = ExtensionDef::new(reference, [HANDLER_INTERFACE])?
            .with_init_param(CLASS_NAME_PARAM, &handler.class_name)
            .with_init_param(CONFIG_FILE_PARAM, &handler.config_file);
        hoh.install(def, &[])?;
        info!("Registered default handler {}", handler.name);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().is_some()
    }

    /// Code root the manager was initialized with.
    pub fn root(&self) -> Result<PathBuf, ExtensionError> {
        self.state
            .read()
            .as_ref()
            .map(|s| s.code_root.clone())
            .ok_or_else(not_initialized)
    }

    /// Stop the library watcher and shut every handler down.
    pub fn shutdown(&self) {
        let Some(state) = self.state.write().take() else {
            return;
        };
        state.hoh.shutdown();
        info!("Extension manager shut down");
    }

    fn hoh(&self) -> Result<Arc<HandlerOfHandlers>, ExtensionError> {
        self.state
            .read()
            .as_ref()
            .map(|s| Arc::clone(&s.hoh))
            .ok_or_else(not_initialized)
    }

    fn resolve(&self, reference: &ExtensionRef) -> Result<Target, ExtensionError> {
        let hoh = self.hoh()?;
        if reference.handler_name() == HANDLER_OF_HANDLERS_NAME {
            return Ok(Target::Hoh(hoh));
        }
        Ok(Target::Handler(hoh.handler(reference.handler_name())?))
    }

    /// Names of every registered handler.
    pub fn get_extension_handler_names(&self) -> Result<Vec<String>, ExtensionError> {
        self.hoh()?.handler_names()
    }

    /// Live handler by name, initialized on first use.
    pub fn prepare_extension_handler(
        &self,
        name: &str,
    ) -> Result<Arc<dyn ExtensionHandler>, ExtensionError> {
        self.hoh()?.handler(name)
    }

    /// Shut a live handler down; it is reloaded on next use. Returns false
    /// when it was not running.
    pub fn stop_extension_handler(&self, name: &str) -> Result<bool, ExtensionError> {
        self.hoh()?.stop_handler(name)
    }

    /// References matching four optional `LIKE` patterns, sorted by
    /// extension name. Handlers that cannot be prepared are skipped.
    pub fn get_extension_names(
        &self,
        handler: Option<&str>,
        context: Option<&str>,
        interface: Option<&str>,
        extension: Option<&str>,
    ) -> Result<Vec<ExtensionRef>, ExtensionError> {
        let handler = LikePattern::optional(handler)?;
        let interface = LikePattern::optional(interface)?;
        let extension = LikePattern::optional(extension)?;
        if let Some(context) = context {
            canonicalize_context(context)?;
        }

        let hoh = self.hoh()?;
        let mut names = Vec::new();
        if matches_opt(handler.as_ref(), HANDLER_OF_HANDLERS_NAME) {
            names.extend(hoh.get_extension_names(context, interface.as_ref(), extension.as_ref())?);
        }

        for name in hoh.handler_names()? {
            if !matches_opt(handler.as_ref(), &name) {
                continue;
            }
            let listed = hoh.handler(&name).and_then(|h| {
                h.get_extension_names(context, interface.as_ref(), extension.as_ref())
            });
            match listed {
                Ok(refs) => names.extend(refs),
                Err(e) => warn!("Skipping handler {}: {}", name, e),
            }
        }

        names.sort_by(ExtensionRef::compare_by_name);
        Ok(names)
    }

    pub fn exists(&self, reference: &ExtensionRef) -> Result<bool, ExtensionError> {
        match self.resolve(reference)? {
            Target::Hoh(hoh) => hoh.exists(reference),
            Target::Handler(handler) => handler.exists(reference),
        }
    }

    pub fn get_extension_def(&self, reference: &ExtensionRef) -> Result<ExtensionDef, ExtensionError> {
        match self.resolve(reference)? {
            Target::Hoh(hoh) => hoh.get_extension_def(reference),
            Target::Handler(handler) => handler.get_extension_def(reference),
        }
    }

    pub fn get_resources(&self, def: &ExtensionDef) -> Result<Vec<String>, ExtensionError> {
        match self.resolve(def.reference())? {
            Target::Hoh(hoh) => hoh.get_resources(def),
            Target::Handler(handler) => handler.get_resources(def),
        }
    }

    /// Current version directory of an extension.
    pub fn code_root(&self, reference: &ExtensionRef) -> Result<PathBuf, ExtensionError> {
        match self.resolve(reference)? {
            Target::Hoh(hoh) => hoh.code_root(reference),
            Target::Handler(handler) => handler.code_root(reference),
        }
    }

    pub fn install_extension(
        &self,
        def: ExtensionDef,
        resources: &[ResourceFile],
    ) -> Result<ExtensionDef, ExtensionError> {
        let reference = def.reference().clone();
        let installed = match self.resolve(&reference)? {
            Target::Hoh(hoh) => hoh.install(def, resources)?,
            Target::Handler(handler) => handler.install(def, resources)?,
        };
        self.notify(&reference, Change::Added);
        Ok(installed)
    }

    pub fn update_extension(
        &self,
        def: ExtensionDef,
        resources: &[ResourceFile],
    ) -> Result<ExtensionDef, ExtensionError> {
        let reference = def.reference().clone();
        let updated = match self.resolve(&reference)? {
            Target::Hoh(hoh) => hoh.update(def, resources)?,
            Target::Handler(handler) => handler.update(def, resources)?,
        };
        self.notify(&reference, Change::Updated);
        Ok(updated)
    }

    pub fn remove_extension(&self, reference: &ExtensionRef) -> Result<(), ExtensionError> {
        match self.resolve(reference)? {
            Target::Hoh(hoh) => hoh.remove(reference)?,
            Target::Handler(handler) => handler.remove(reference)?,
        }
        self.notify(reference, Change::Removed);
        Ok(())
    }

    /// Live extension instance. Handlers are prepared through
    /// [`ExtensionManager::prepare_extension_handler`].
    pub fn prepare_extension(
        &self,
        reference: &ExtensionRef,
    ) -> Result<Arc<dyn Extension>, ExtensionError> {
        match self.resolve(reference)? {
            Target::Hoh(_) => Err(ExtensionError::Unsupported(format!(
                "{} is a handler, use prepare_extension_handler",
                reference
            ))),
            Target::Handler(handler) => handler.prepare(reference),
        }
    }

    /// Retry deferred deletions everywhere; returns how many remain.
    pub fn purge_pending_removals(&self) -> Result<usize, ExtensionError> {
        let hoh = self.hoh()?;
        let mut remaining = hoh.purge_pending_removals()?;
        for name in hoh.handler_names()? {
            match hoh.handler(&name).and_then(|h| h.purge_pending_removals()) {
                Ok(left) => remaining += left,
                Err(e) => warn!("Cannot purge pending removals of {}: {}", name, e),
            }
        }
        Ok(remaining)
    }

    /// Register a listener for one reference, or for every change when
    /// `reference` is `None`. Registering twice has no effect.
    pub fn register_listener(
        &self,
        reference: Option<&ExtensionRef>,
        listener: Arc<dyn ExtensionListener>,
    ) {
        let mut listeners = self.listeners.lock();
        let entry = listeners.entry(reference.cloned()).or_default();
        if !entry.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            entry.push(listener);
        }
    }

    /// Remove a listener. Unknown listeners are ignored.
    pub fn unregister_listener(
        &self,
        reference: Option<&ExtensionRef>,
        listener: &Arc<dyn ExtensionListener>,
    ) {
        let mut listeners = self.listeners.lock();
        let key = reference.cloned();
        if let Some(entry) = listeners.get_mut(&key) {
            entry.retain(|l| !Arc::ptr_eq(l, listener));
            if entry.is_empty() {
                listeners.remove(&key);
            }
        }
    }

    fn notify(&self, reference: &ExtensionRef, change: Change) {
        let targets: Vec<Arc<dyn ExtensionListener>> = {
            let listeners = self.listeners.lock();
            let specific = listeners.get(&Some(reference.clone())).into_iter().flatten();
            let global = listeners.get(&None).into_iter().flatten();
            specific.chain(global).cloned().collect()
        };

        for listener in targets {
            let result = match change {
                Change::Added => listener.extension_added(reference),
                Change::Updated => listener.extension_updated(reference),
                Change::Removed => listener.extension_removed(reference),
            };
            if let Err(e) = result {
                warn!("Listener failed on {:?} of {}: {}", change, reference, e);
            }
        }
    }
}

impl Default for ExtensionManager {
    fn default() -> Self {
        Self::new()
    }
}

fn not_initialized() -> ExtensionError {
    ExtensionError::IllegalState("extension manager is not initialized".to_string())
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
