//! The handler of handlers.
//!
//! Handlers are registered as extensions of the reserved handler
//! `ExtensionHandler` in context `global/`. The handler of handlers itself is
//! described by a fixed definition that never appears in its own
//! configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use extreg_protocols::reference::is_valid_dotted_identifier;
use extreg_protocols::{ExtensionDef, ExtensionError, ExtensionRef, ResourceFile, CLASS_NAME_PARAM};

use super::base::{HandlerBase, InstanceFactory, CONFIG_FILE_PARAM, DEFAULT_CONFIG_FILE};
use super::libraries::ExtraLibraries;
use super::native::{ExtensionFactories, NativeExtensionHandler, NATIVE_HANDLER_CLASS};
use super::ExtensionHandler;
use crate::configuration::HandlerConfiguration;
use crate::pattern::LikePattern;
use crate::storage::{canonical_path, copy_missing, safe_join};

/// Handler name under which handlers are registered.
pub const HANDLER_OF_HANDLERS_NAME: &str = "ExtensionHandler";

/// Context every handler lives in.
pub const HANDLER_CONTEXT: &str = "global/";

/// Extension name of the handler of handlers.
pub const SELF_NAME: &str = "HandlerOfHandlers";

/// Interface implemented by every handler.
pub const HANDLER_INTERFACE: &str = "extreg.IExtensionHandler";

const SELF_CLASS: &str = "extreg.HandlerOfHandlers";

type HandlerConstructor = Arc<dyn Fn() -> Arc<dyn ExtensionHandler> + Send + Sync>;

/// Handler implementations keyed by class name.
#[derive(Default)]
pub struct HandlerFactories {
    constructors: DashMap<String, HandlerConstructor>,
}

impl HandlerFactories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factories with [`NATIVE_HANDLER_CLASS`] registered.
    pub fn with_native(
        extension_factories: Arc<ExtensionFactories>,
        extra_libraries: Arc<ExtraLibraries>,
    ) -> Self {
        let factories = Self::new();
        factories.constructors.insert(
            NATIVE_HANDLER_CLASS.to_string(),
            Arc::new(move || {
                Arc::new(NativeExtensionHandler::native(
                    Arc::clone(&extension_factories),
                    Arc::clone(&extra_libraries),
                )) as Arc<dyn ExtensionHandler>
            }),
        );
        factories
    }

    pub fn register<F>(&self, class_name: &str, constructor: F) -> Result<(), ExtensionError>
    where
        F: Fn() -> Arc<dyn ExtensionHandler> + Send + Sync + 'static,
    {
        if !is_valid_dotted_identifier(class_name) {
            return Err(ExtensionError::InvalidDefinition(format!(
                "'{}' is not a valid class name",
                class_name
            )));
        }
        if self.constructors.contains_key(class_name) {
            return Err(ExtensionError::AlreadyExists(class_name.to_string()));
        }
        self.constructors
            .insert(class_name.to_string(), Arc::new(constructor));
        Ok(())
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.constructors.contains_key(class_name)
    }

    fn create(&self, class_name: &str) -> Option<Arc<dyn ExtensionHandler>> {
        let constructor = self
            .constructors
            .get(class_name)
            .map(|e| Arc::clone(e.value()))?;
        Some(constructor())
    }
}

/// Instance factory of the handler of handlers.
pub struct HandlerLoader {
    factories: Arc<HandlerFactories>,
}

impl HandlerLoader {
    pub fn new(factories: Arc<HandlerFactories>) -> Self {
        Self { factories }
    }
}

impl InstanceFactory<dyn ExtensionHandler> for HandlerLoader {
    fn validate(&self, def: &ExtensionDef) -> Result<(), ExtensionError> {
        let reference = def.reference();
        if reference.handler_name() != HANDLER_OF_HANDLERS_NAME {
            return Err(ExtensionError::InvalidDefinition(format!(
                "handler {} must be registered under {}",
                reference, HANDLER_OF_HANDLERS_NAME
            )));
        }
        match def.init_param(CLASS_NAME_PARAM) {
            Some(class_name) if is_valid_dotted_identifier(class_name) => Ok(()),
            _ => Err(ExtensionError::InvalidDefinition(format!(
                "handler {} needs a valid {} init parameter",
                reference, CLASS_NAME_PARAM
            ))),
        }
    }

    fn instantiate(
        &self,
        handler: &str,
        def: &ExtensionDef,
        code_root: &Path,
    ) -> Result<Arc<dyn ExtensionHandler>, ExtensionError> {
        let name = def.reference().extension_name();
        let class_name = def.init_param(CLASS_NAME_PARAM).unwrap_or_default();
        let instance = self.factories.create(class_name).ok_or_else(|| {
            ExtensionError::init_failed(
                handler,
                name,
                format!("no handler implementation registered for {}", class_name),
            )
        })?;

        instance
            .init(def, code_root)
            .map_err(|cause| ExtensionError::init_failed(handler, name, cause))?;
        info!("Loaded handler {}", name);
        Ok(instance)
    }

    /// Copy the old handler's code root into the new one.
    ///
    /// Paths the old handler still has queued for deletion are left behind,
    /// and their queue entries are moved onto the new root. New resources are
    /// written after this runs, so they win over copies.
    fn migrate(&self, old: &ExtensionDef, old_dir: &Path, new_dir: &Path) -> Result<(), ExtensionError> {
        let name = old.reference().extension_name();
        let file_name = old.init_param(CONFIG_FILE_PARAM).unwrap_or(DEFAULT_CONFIG_FILE);
        let (Some(old_file), Some(new_file)) =
            (safe_join(old_dir, file_name), safe_join(new_dir, file_name))
        else {
            return Err(ExtensionError::InvalidDefinition(format!(
                "{} '{}' must be relative to the code root",
                CONFIG_FILE_PARAM, file_name
            )));
        };

        let old_root = canonical_path(old_dir);
        let queued: Vec<PathBuf> = if old_file.exists() {
            HandlerConfiguration::load(&old_file, false, name)?
                .pending_removals()
                .filter_map(|path| path.strip_prefix(&old_root).ok())
                .map(Path::to_path_buf)
                .collect()
        } else {
            Vec::new()
        };

        let copied = copy_missing(old_dir, new_dir, &queued)?;
        debug!(
            "Migrated {} files from {:?} to {:?}, left {} queued paths behind",
            copied,
            old_dir,
            new_dir,
            queued.len()
        );

        if !queued.is_empty() && new_file.exists() {
            let new_root = canonical_path(new_dir);
            let mut configuration = HandlerConfiguration::load(&new_file, false, name)?;
            for relative in &queued {
                configuration.clear_pending_removal(&old_root.join(relative));
                configuration.set_pending_removal(&new_root.join(relative));
            }
            configuration.store(&new_file)?;
        }
        Ok(())
    }

    fn release(&self, reference: &ExtensionRef, instance: Option<Arc<dyn ExtensionHandler>>) {
        if let Some(handler) = instance {
            debug!("Shutting down handler {}", reference);
            handler.shutdown();
        }
    }
}

/// Bootstrap handler whose extensions are handlers.
pub struct HandlerOfHandlers {
    base: HandlerBase<dyn ExtensionHandler>,
    self_def: ExtensionDef,
}

impl HandlerOfHandlers {
    /// Initialize over `code_root`, keeping handler definitions in
    /// `handlers_file`.
    pub fn bootstrap(
        factories: Arc<HandlerFactories>,
        code_root: &Path,
        handlers_file: &str,
    ) -> Result<Self, ExtensionError> {
        let reference = ExtensionRef::new(HANDLER_OF_HANDLERS_NAME, HANDLER_CONTEXT, SELF_NAME)?;
        let self_def = ExtensionDef::new(reference, [HANDLER_INTERFACE])?
            .with_init_param(CLASS_NAME_PARAM, SELF_CLASS)
            .with_init_param(CONFIG_FILE_PARAM, handlers_file);

        let base: HandlerBase<dyn ExtensionHandler> =
            HandlerBase::new(HandlerLoader::new(factories));
        base.init(&self_def, code_root)?;
        Ok(Self { base, self_def })
    }

    /// True for the handler of handlers' own reference.
    pub fn is_self(reference: &ExtensionRef) -> bool {
        reference.handler_name() == HANDLER_OF_HANDLERS_NAME
            && reference.context() == HANDLER_CONTEXT
            && reference.extension_name() == SELF_NAME
    }

    /// Reference of the handler named `name`.
    pub fn handler_reference(name: &str) -> Result<ExtensionRef, ExtensionError> {
        ExtensionRef::new(HANDLER_OF_HANDLERS_NAME, HANDLER_CONTEXT, name)
    }

    fn guard(reference: &ExtensionRef, operation: &str) -> Result<(), ExtensionError> {
        if Self::is_self(reference) {
            return Err(ExtensionError::Unsupported(format!(
                "cannot {} the handler of handlers",
                operation
            )));
        }
        Ok(())
    }

    pub fn self_definition(&self) -> &ExtensionDef {
        &self.self_def
    }

    pub fn is_initialized(&self) -> bool {
        self.base.is_initialized()
    }

    /// Shut down every live handler and persist.
    pub fn shutdown(&self) {
        self.base.shutdown();
    }

    pub fn install(
        &self,
        def: ExtensionDef,
        resources: &[ResourceFile],
    ) -> Result<ExtensionDef, ExtensionError> {
        Self::guard(def.reference(), "install")?;
        self.base.install(def, resources)
    }

    pub fn update(
        &self,
        def: ExtensionDef,
        resources: &[ResourceFile],
    ) -> Result<ExtensionDef, ExtensionError> {
        Self::guard(def.reference(), "update")?;
        self.base.update(def, resources)
    }

    pub fn remove(&self, reference: &ExtensionRef) -> Result<(), ExtensionError> {
        Self::guard(reference, "remove")?;
        self.base.remove(reference)
    }

    /// Live handler for `reference`.
    pub fn prepare(&self, reference: &ExtensionRef) -> Result<Arc<dyn ExtensionHandler>, ExtensionError> {
        Self::guard(reference, "prepare")?;
        self.base.prepare(reference)
    }

    /// Live handler by name.
    pub fn handler(&self, name: &str) -> Result<Arc<dyn ExtensionHandler>, ExtensionError> {
        self.prepare(&Self::handler_reference(name)?)
    }

    /// Shut down a live handler. It is reloaded on next use.
    pub fn stop_handler(&self, name: &str) -> Result<bool, ExtensionError> {
        let reference = Self::handler_reference(name)?;
        Self::guard(&reference, "stop")?;
        self.base.release_instance(&reference)
    }

    pub fn exists(&self, reference: &ExtensionRef) -> Result<bool, ExtensionError> {
        if Self::is_self(reference) {
            return Ok(self.is_initialized());
        }
        self.base.exists(reference)
    }

    pub fn get_extension_def(&self, reference: &ExtensionRef) -> Result<ExtensionDef, ExtensionError> {
        if Self::is_self(reference) {
            return Ok(self.self_def.clone());
        }
        self.base.get_extension_def(reference)
    }

    pub fn get_extension_names(
        &self,
        context: Option<&str>,
        interface: Option<&LikePattern>,
        name: Option<&LikePattern>,
    ) -> Result<Vec<ExtensionRef>, ExtensionError> {
        self.base.get_extension_names(context, interface, name)
    }

    /// Names of every registered handler, sorted.
    pub fn handler_names(&self) -> Result<Vec<String>, ExtensionError> {
        Ok(self
            .base
            .get_extension_names(Some(HANDLER_CONTEXT), None, None)?
            .into_iter()
            .map(|r| r.extension_name().to_string())
            .collect())
    }

    pub fn get_resources(&self, def: &ExtensionDef) -> Result<Vec<String>, ExtensionError> {
        self.base.get_resources(def)
    }

    pub fn code_root(&self, reference: &ExtensionRef) -> Result<PathBuf, ExtensionError> {
        if Self::is_self(reference) {
            return self.base.handler_root();
        }
        self.base.code_root(reference)
    }

    pub fn purge_pending_removals(&self) -> Result<usize, ExtensionError> {
        self.base.purge_pending_removals()
    }
}
