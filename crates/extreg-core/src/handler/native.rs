//! Handler for natively implemented extensions.
//!
//! An extension's `className` init parameter is resolved first against
//! constructors registered in-process, then against the constructor symbols
//! exported by its dynamic library resources and the shared extra
//! libraries.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use extreg_protocols::definition::resource_location_path;
use extreg_protocols::reference::is_valid_dotted_identifier;
use extreg_protocols::{Extension, ExtensionDef, ExtensionError, ExtensionRef, CLASS_NAME_PARAM};

use super::base::{HandlerBase, InstanceFactory};
use super::libraries::{is_dynamic_library, ExtraLibraries, LibrarySet};
use crate::storage::safe_join;

/// Class name the handler of handlers maps to [`NativeExtensionHandler`].
pub const NATIVE_HANDLER_CLASS: &str = "extreg.NativeExtensionHandler";

type Constructor = Arc<dyn Fn() -> Box<dyn Extension> + Send + Sync>;

/// Constructors linked into the running process, keyed by class name.
#[derive(Default)]
pub struct ExtensionFactories {
    constructors: DashMap<String, Constructor>,
}

impl ExtensionFactories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor. Class names are unique.
    pub fn register<F>(&self, class_name: &str, constructor: F) -> Result<(), ExtensionError>
    where
        F: Fn() -> Box<dyn Extension> + Send + Sync + 'static,
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
        debug!("Registered extension class {}", class_name);
        Ok(())
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.constructors.contains_key(class_name)
    }

    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn create(&self, class_name: &str) -> Option<Box<dyn Extension>> {
        let constructor = self
            .constructors
            .get(class_name)
            .map(|e| Arc::clone(e.value()))?;
        Some(constructor())
    }
}

/// A library-backed instance that keeps its libraries loaded while alive.
struct LoadedExtension {
    inner: Box<dyn Extension>,
    _libraries: Arc<LibrarySet>,
}

impl Extension for LoadedExtension {
    fn init(&mut self, def: &ExtensionDef, code_root: &Path) -> Result<(), ExtensionError> {
        self.inner.init(def, code_root)
    }

    fn shutdown(&self) {
        self.inner.shutdown();
    }

    fn as_any(&self) -> &dyn Any {
        self.inner.as_any()
    }
}

/// Instance factory of [`NativeExtensionHandler`].
pub struct NativeLoader {
    factories: Arc<ExtensionFactories>,
    extra_libraries: Arc<ExtraLibraries>,
    libraries: DashMap<ExtensionRef, Arc<LibrarySet>>,
}

impl NativeLoader {
    pub fn new(factories: Arc<ExtensionFactories>, extra_libraries: Arc<ExtraLibraries>) -> Self {
        Self {
            factories,
            extra_libraries,
            libraries: DashMap::new(),
        }
    }

    fn class_name(def: &ExtensionDef) -> Result<&str, ExtensionError> {
        let class_name = def.init_param(CLASS_NAME_PARAM).ok_or_else(|| {
            ExtensionError::InvalidDefinition(format!(
                "{} has no {} init parameter",
                def.reference(),
                CLASS_NAME_PARAM
            ))
        })?;
        if !is_valid_dotted_identifier(class_name) {
            return Err(ExtensionError::InvalidDefinition(format!(
                "{} has an invalid class name '{}'",
                def.reference(),
                class_name
            )));
        }
        Ok(class_name)
    }

    /// Dynamic libraries among the definition's resources, followed by the
    /// extra libraries known right now.
    fn library_paths(&self, def: &ExtensionDef, code_root: &Path) -> Result<Vec<PathBuf>, String> {
        let mut paths = Vec::new();
        for location in def.resources() {
            let relative = resource_location_path(location).map_err(|e| e.to_string())?;
            let path = safe_join(code_root, relative)
                .ok_or_else(|| format!("resource '{}' is not relative", location))?;

            if path.is_dir() {
                let mut found: Vec<PathBuf> = std::fs::read_dir(&path)
                    .map_err(|e| format!("cannot read {}: {}", path.display(), e))?
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|p| p.is_file() && is_dynamic_library(p))
                    .collect();
                found.sort();
                paths.extend(found);
            } else if is_dynamic_library(&path) {
                paths.push(path);
            }
        }
        paths.extend(self.extra_libraries.snapshot());
        Ok(paths)
    }

    fn library_set(
        &self,
        def: &ExtensionDef,
        code_root: &Path,
    ) -> Result<Arc<LibrarySet>, String> {
        if let Some(set) = self.libraries.get(def.reference()) {
            return Ok(Arc::clone(set.value()));
        }
        let paths = self.library_paths(def, code_root)?;
        let set = Arc::new(LibrarySet::open(&paths)?);
        debug!("Opened {} libraries for {}", set.len(), def.reference());
        self.libraries
            .insert(def.reference().clone(), Arc::clone(&set));
        Ok(set)
    }

    fn create(&self, def: &ExtensionDef, code_root: &Path) -> Result<Box<dyn Extension>, String> {
        let class_name = Self::class_name(def).map_err(|e| e.to_string())?;
        if let Some(instance) = self.factories.create(class_name) {
            return Ok(instance);
        }

        let libraries = self.library_set(def, code_root)?;
        let inner = libraries.create(class_name)?;
        Ok(Box::new(LoadedExtension {
            inner,
            _libraries: libraries,
        }))
    }
}

impl InstanceFactory<dyn Extension> for NativeLoader {
    fn validate(&self, def: &ExtensionDef) -> Result<(), ExtensionError> {
        Self::class_name(def).map(|_| ())
    }

    fn instantiate(
        &self,
        handler: &str,
        def: &ExtensionDef,
        code_root: &Path,
    ) -> Result<Arc<dyn Extension>, ExtensionError> {
        let name = def.reference().extension_name();
        let mut instance = self
            .create(def, code_root)
            .map_err(|cause| ExtensionError::init_failed(handler, name, cause))?;
        instance
            .init(def, code_root)
            .map_err(|cause| ExtensionError::init_failed(handler, name, cause))?;

        info!("Loaded extension {}", def.reference());
        Ok(Arc::from(instance))
    }

    fn release(&self, reference: &ExtensionRef, instance: Option<Arc<dyn Extension>>) {
        self.libraries.remove(reference);
        if let Some(instance) = instance {
            instance.shutdown();
        }
    }
}

/// Handler for natively implemented extensions.
pub type NativeExtensionHandler = HandlerBase<dyn Extension>;

impl HandlerBase<dyn Extension> {
    pub fn native(factories: Arc<ExtensionFactories>, extra_libraries: Arc<ExtraLibraries>) -> Self {
        Self::new(NativeLoader::new(factories, extra_libraries))
    }
}
