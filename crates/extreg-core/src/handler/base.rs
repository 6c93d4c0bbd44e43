//! Shared handler lifecycle.
//!
//! [`HandlerBase`] owns the persisted configuration, the on-disk code
//! directories and the live instance cache. What an instance is and how it is
//! built is delegated to an [`InstanceFactory`], so the same lifecycle serves
//! both extension handlers and the handler of handlers.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use extreg_protocols::{ExtensionDef, ExtensionError, ExtensionRef, ResourceFile};

use crate::configuration::HandlerConfiguration;
use crate::pattern::{matches_opt, LikePattern};
use crate::storage::{
    canonical_path, catalog_resources, extension_dir, persistence, remove_path, safe_join,
    version_dir, write_resources,
};

/// Init parameter naming the handler's configuration file.
pub const CONFIG_FILE_PARAM: &str = "configFile";

/// Configuration file used when [`CONFIG_FILE_PARAM`] is absent.
pub const DEFAULT_CONFIG_FILE: &str = "Extensions.xml";

/// Builds, migrates and releases the instances a handler hands out.
pub trait InstanceFactory<T: ?Sized>: Send + Sync {
    /// Reject definitions this factory can never instantiate.
    fn validate(&self, def: &ExtensionDef) -> Result<(), ExtensionError>;

    /// Build and initialize an instance. `code_root` is the extension's
    /// current version directory and exists.
    fn instantiate(
        &self,
        handler: &str,
        def: &ExtensionDef,
        code_root: &Path,
    ) -> Result<Arc<T>, ExtensionError>;

    /// Carry state from the old version directory to the new one on update.
    /// `old` is the definition being replaced. Its instance has already been
    /// released.
    fn migrate(
        &self,
        _old: &ExtensionDef,
        _old_dir: &Path,
        _new_dir: &Path,
    ) -> Result<(), ExtensionError> {
        Ok(())
    }

    /// Called when an extension is evicted by update, remove or shutdown.
    /// `instance` is the cached instance, if one was live.
    fn release(&self, reference: &ExtensionRef, instance: Option<Arc<T>>);
}

struct Active {
    name: String,
    code_root: PathBuf,
    config_file: PathBuf,
    configuration: HandlerConfiguration,
}

enum HandlerState {
    Uninitialized,
    Initialized(Box<Active>),
    ShutDown,
}

/// Lifecycle shared by every handler: `Uninitialized -> Initialized ->
/// ShutDown`, re-enterable through `init`.
pub struct HandlerBase<T: ?Sized> {
    factory: Box<dyn InstanceFactory<T>>,
    state: RwLock<HandlerState>,
    live: DashMap<ExtensionRef, Arc<T>>,
    construct_lock: Mutex<()>,
}

impl<T: ?Sized + Send + Sync + 'static> HandlerBase<T> {
    pub fn new(factory: impl InstanceFactory<T> + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            state: RwLock::new(HandlerState::Uninitialized),
            live: DashMap::new(),
            construct_lock: Mutex::new(()),
        }
    }

    /// Handler name, once initialized.
    pub fn name(&self) -> Option<String> {
        match &*self.state.read() {
            HandlerState::Initialized(active) => Some(active.name.clone()),
            _ => None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(*self.state.read(), HandlerState::Initialized(_))
    }

    /// Number of cached live instances.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Initialize from the handler's own definition. An initialized handler
    /// is shut down first.
    pub fn init(&self, def: &ExtensionDef, code_root: &Path) -> Result<(), ExtensionError> {
        let mut state = self.state.write();
        if matches!(*state, HandlerState::Initialized(_)) {
            self.shutdown_locked(&mut state);
        }

        if !code_root.is_dir() || fs::read_dir(code_root).is_err() {
            return Err(ExtensionError::IllegalState(format!(
                "code root {} is not a readable directory",
                code_root.display()
            )));
        }

        let name = def.reference().extension_name().to_string();
        let file_name = def
            .init_param(CONFIG_FILE_PARAM)
            .unwrap_or(DEFAULT_CONFIG_FILE);
        let config_file = safe_join(code_root, file_name).ok_or_else(|| {
            ExtensionError::InvalidDefinition(format!(
                "{} '{}' must be relative to the code root",
                CONFIG_FILE_PARAM, file_name
            ))
        })?;

        let mut configuration = HandlerConfiguration::load(&config_file, true, &name)?;
        let pending = configuration.pending_removals().count();
        let remaining = purge_pending(&mut configuration);
        if remaining > 0 {
            warn!("{} paths still pending removal for {}", remaining, name);
        }
        if remaining != pending || !config_file.exists() {
            if let Err(e) = configuration.store(&config_file) {
                warn!("Failed to store configuration for {}: {}", name, e);
            }
        }

        info!(
            "Handler {} initialized at {:?} with {} extensions",
            name,
            code_root,
            configuration.list_names().len()
        );
        *state = HandlerState::Initialized(Box::new(Active {
            name,
            code_root: code_root.to_path_buf(),
            config_file,
            configuration,
        }));
        Ok(())
    }

    /// Release every live instance, retry pending removals and persist.
    /// A handler that is not initialized is left as is.
    pub fn shutdown(&self) {
        let mut state = self.state.write();
        self.shutdown_locked(&mut state);
    }

    fn shutdown_locked(&self, state: &mut HandlerState) {
        let HandlerState::Initialized(active) = state else {
            return;
        };

        let references: Vec<ExtensionRef> = self.live.iter().map(|e| e.key().clone()).collect();
        for reference in references {
            if let Some((reference, instance)) = self.live.remove(&reference) {
                self.factory.release(&reference, Some(instance));
            }
        }

        let remaining = purge_pending(&mut active.configuration);
        if remaining > 0 {
            warn!("{} paths still pending removal for {}", remaining, active.name);
        }
        if let Err(e) = active.configuration.store(&active.config_file) {
            warn!("Failed to store configuration for {}: {}", active.name, e);
        }

        info!("Handler {} shut down", active.name);
        *state = HandlerState::ShutDown;
    }

    /// Register a new extension at version 1, writing its resources into
    /// the version directory.
    pub fn install(
        &self,
        def: ExtensionDef,
        resources: &[ResourceFile],
    ) -> Result<ExtensionDef, ExtensionError> {
        let mut state = self.state.write();
        let active = active_mut(&mut state)?;
        self.install_locked(active, def, resources, 1)
    }

    fn install_locked(
        &self,
        active: &mut Active,
        mut def: ExtensionDef,
        resources: &[ResourceFile],
        version: u32,
    ) -> Result<ExtensionDef, ExtensionError> {
        let reference = def.reference().clone();
        if active.configuration.is_defined(&reference) {
            return Err(ExtensionError::AlreadyExists(reference.to_string()));
        }
        self.factory.validate(&def)?;
        def.set_version(version);

        let dir = version_dir(&active.code_root, &reference, version);
        reclaim_pending(&mut active.configuration, &dir)?;

        if resources.is_empty() {
            def.set_supplied_resources(None);
        } else {
            let written = write_resources(&dir, resources)?;
            def.set_supplied_resources(Some(written));
        }

        active.configuration.add_definition(def.clone());
        if let Err(e) = active.configuration.store(&active.config_file) {
            active.configuration.remove_definition(&reference);
            return Err(e);
        }

        info!("Installed {} version {}", reference, version);
        Ok(def)
    }

    /// Replace an extension's definition with the next version.
    ///
    /// Not transactional: validation happens before anything changes, but a
    /// failure after the old definition is dropped leaves it removed.
    pub fn update(
        &self,
        def: ExtensionDef,
        resources: &[ResourceFile],
    ) -> Result<ExtensionDef, ExtensionError> {
        let mut state = self.state.write();
        let active = active_mut(&mut state)?;

        self.factory.validate(&def)?;
        let reference = def.reference().clone();
        let old_def = find(active, &reference)?.clone();
        let old_version = old_def.version();
        let new_version = old_version.checked_add(1).ok_or_else(|| {
            ExtensionError::InvalidDefinition(format!(
                "{} is at version {} and cannot be updated further",
                reference, old_version
            ))
        })?;

        let old_dir = version_dir(&active.code_root, &reference, old_version);
        let new_dir = version_dir(&active.code_root, &reference, new_version);

        // The old instance must be gone before its directory is copied.
        self.evict(&reference);
        self.factory.migrate(&old_def, &old_dir, &new_dir)?;

        active.configuration.remove_definition(&reference);
        active.configuration.set_pending_removal(&old_dir);

        debug!("Updating {} from version {} to {}", reference, old_version, new_version);
        self.install_locked(active, def, resources, new_version)
    }

    /// Unregister an extension. Its directory is deleted later.
    pub fn remove(&self, reference: &ExtensionRef) -> Result<(), ExtensionError> {
        let mut state = self.state.write();
        let active = active_mut(&mut state)?;
        if !active.configuration.is_defined(reference) {
            return Err(ExtensionError::NotFound(reference.to_string()));
        }

        let dir = extension_dir(&active.code_root, reference);
        active.configuration.set_pending_removal(&dir);
        self.evict(reference);
        active.configuration.remove_definition(reference);
        active.configuration.store(&active.config_file)?;

        info!("Removed {}", reference);
        Ok(())
    }

    /// Drop the live instance of `reference`, if any. The next `prepare`
    /// builds a fresh one.
    pub fn release_instance(&self, reference: &ExtensionRef) -> Result<bool, ExtensionError> {
        let mut state = self.state.write();
        active_mut(&mut state)?;
        match self.live.remove(reference) {
            Some((reference, instance)) => {
                self.factory.release(&reference, Some(instance));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn evict(&self, reference: &ExtensionRef) {
        let instance = self.live.remove(reference).map(|(_, instance)| instance);
        if instance.is_some() {
            debug!("Evicted live instance of {}", reference);
        }
        self.factory.release(reference, instance);
    }

    /// Live instance for `reference`, constructing it on first use.
    pub fn prepare(&self, reference: &ExtensionRef) -> Result<Arc<T>, ExtensionError> {
        let state = self.state.read();
        let active = active(&state)?;
        let def = active
            .configuration
            .get_definition(reference)
            .ok_or_else(|| ExtensionError::NotFound(reference.to_string()))?;

        if let Some(instance) = self.cached(def)? {
            return Ok(instance);
        }

        let _guard = self.construct_lock.lock();
        if let Some(instance) = self.cached(def)? {
            return Ok(instance);
        }

        self.factory.validate(def)?;
        let dir = version_dir(&active.code_root, reference, def.version());
        fs::create_dir_all(&dir).map_err(|e| persistence(&dir, e))?;

        let instance = self.factory.instantiate(&active.name, def, &dir)?;
        self.live.insert(reference.clone(), Arc::clone(&instance));
        debug!("Prepared {}", reference);
        Ok(instance)
    }

    fn cached(&self, def: &ExtensionDef) -> Result<Option<Arc<T>>, ExtensionError> {
        let Some(instance) = self.live.get(def.reference()).map(|e| Arc::clone(e.value())) else {
            return Ok(None);
        };
        if def.is_reentrant() {
            Ok(Some(instance))
        } else {
            Err(ExtensionError::Unsupported(format!(
                "{} is not reentrant and already has a live instance",
                def.reference()
            )))
        }
    }

    pub fn exists(&self, reference: &ExtensionRef) -> Result<bool, ExtensionError> {
        let state = self.state.read();
        Ok(active(&state)?.configuration.is_defined(reference))
    }

    /// Definition of `reference`. Supplied resources are cataloged on first
    /// access when the install did not record them.
    pub fn get_extension_def(&self, reference: &ExtensionRef) -> Result<ExtensionDef, ExtensionError> {
        {
            let state = self.state.read();
            let def = find(active(&state)?, reference)?;
            if def.supplied_resources().is_some() {
                return Ok(def.clone());
            }
        }

        let mut state = self.state.write();
        let active = active_mut(&mut state)?;
        let mut def = find(active, reference)?.clone();
        if def.supplied_resources().is_some() {
            return Ok(def);
        }

        let dir = version_dir(&active.code_root, reference, def.version());
        match catalog_resources(&dir, def.resources()) {
            Ok(files) => {
                def.set_supplied_resources(Some(files));
                active.configuration.add_definition(def.clone());
                if let Err(e) = active.configuration.store(&active.config_file) {
                    warn!("Failed to store supplied resources of {}: {}", reference, e);
                }
            }
            Err(e) => warn!("Cannot catalog resources of {}: {}", reference, e),
        }
        Ok(def)
    }

    /// References matching the optional context and patterns, sorted by
    /// extension name.
    pub fn get_extension_names(
        &self,
        context: Option<&str>,
        interface: Option<&LikePattern>,
        name: Option<&LikePattern>,
    ) -> Result<Vec<ExtensionRef>, ExtensionError> {
        let state = self.state.read();
        let configuration = &active(&state)?.configuration;
        let candidates = match context {
            Some(context) => configuration.list_names_in(context)?,
            None => configuration.list_names(),
        };

        let mut names: Vec<ExtensionRef> = candidates
            .into_iter()
            .filter(|reference| matches_opt(name, reference.extension_name()))
            .filter(|reference| {
                interface.is_none()
                    || configuration.get_definition(reference).is_some_and(|def| {
                        def.interfaces().iter().any(|i| matches_opt(interface, i))
                    })
            })
            .collect();
        names.sort_by(ExtensionRef::compare_by_name);
        Ok(names)
    }

    /// Every file under the definition's resource locations, relative to its
    /// version directory.
    pub fn get_resources(&self, def: &ExtensionDef) -> Result<Vec<String>, ExtensionError> {
        let state = self.state.read();
        let dir = version_dir(&active(&state)?.code_root, def.reference(), def.version());
        catalog_resources(&dir, def.resources())
    }

    /// Current version directory of `reference`.
    pub fn code_root(&self, reference: &ExtensionRef) -> Result<PathBuf, ExtensionError> {
        let state = self.state.read();
        let active = active(&state)?;
        let def = find(active, reference)?;
        Ok(version_dir(&active.code_root, reference, def.version()))
    }

    /// Handler code root, once initialized.
    pub fn handler_root(&self) -> Result<PathBuf, ExtensionError> {
        let state = self.state.read();
        Ok(active(&state)?.code_root.clone())
    }

    /// Delete what can be deleted now. Returns how many paths remain.
    pub fn purge_pending_removals(&self) -> Result<usize, ExtensionError> {
        let mut state = self.state.write();
        let active = active_mut(&mut state)?;
        let before = active.configuration.pending_removals().count();
        let remaining = purge_pending(&mut active.configuration);
        if remaining != before {
            active.configuration.store(&active.config_file)?;
        }
        Ok(remaining)
    }

    /// Paths awaiting deferred deletion.
    pub fn pending_removals(&self) -> Result<Vec<PathBuf>, ExtensionError> {
        let state = self.state.read();
        Ok(active(&state)?
            .configuration
            .pending_removals()
            .map(Path::to_path_buf)
            .collect())
    }
}

fn active<'a>(state: &'a HandlerState) -> Result<&'a Active, ExtensionError> {
    match state {
        HandlerState::Initialized(active) => Ok(&**active),
        _ => Err(not_initialized(state)),
    }
}

fn active_mut<'a>(state: &'a mut HandlerState) -> Result<&'a mut Active, ExtensionError> {
    match state {
        HandlerState::Initialized(active) => Ok(&mut **active),
        other => Err(not_initialized(other)),
    }
}

fn not_initialized(state: &HandlerState) -> ExtensionError {
    let what = match state {
        HandlerState::ShutDown => "has been shut down",
        _ => "is not initialized",
    };
    ExtensionError::IllegalState(format!("handler {}", what))
}

fn find<'a>(active: &'a Active, reference: &ExtensionRef) -> Result<&'a ExtensionDef, ExtensionError> {
    active
        .configuration
        .get_definition(reference)
        .ok_or_else(|| ExtensionError::NotFound(reference.to_string()))
}

/// Try to delete every pending path. Returns how many remain.
fn purge_pending(configuration: &mut HandlerConfiguration) -> usize {
    let pending: Vec<PathBuf> = configuration.pending_removals().map(Path::to_path_buf).collect();
    for path in pending {
        match remove_path(&path) {
            Ok(()) => {
                debug!("Deleted pending removal {:?}", path);
                configuration.clear_pending_removal(&path);
            }
            Err(e) => warn!("Cannot delete pending removal {:?}: {}", path, e),
        }
    }
    configuration.pending_removals().count()
}

/// Free `dir` from any pending removal of itself or an ancestor, deleting
/// the stale content before it is reused.
fn reclaim_pending(configuration: &mut HandlerConfiguration, dir: &Path) -> Result<(), ExtensionError> {
    let dir = canonical_path(dir);
    let blocking: Vec<PathBuf> = configuration
        .pending_removals()
        .filter(|pending| dir.starts_with(pending))
        .map(Path::to_path_buf)
        .collect();

    for path in blocking {
        remove_path(&path).map_err(|e| persistence(&path, e))?;
        configuration.clear_pending_removal(&path);
        debug!("Reclaimed pending removal {:?}", path);
    }
    Ok(())
}

#[cfg(test)]
#[path = "base_tests.rs"]
mod tests;
