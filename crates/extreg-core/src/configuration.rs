//! Persisted per-handler state.
//!
//! A handler keeps its definitions and the set of paths awaiting deferred
//! deletion in one XML document:
//! ```text
//! <PSXExtensionHandlerConfiguration handlerName="Native">
//!   <pendingRemoval name="/abs/path"/>
//!   <Extension ...>...</Extension>
//! </PSXExtensionHandlerConfiguration>
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use extreg_protocols::reference::{canonicalize_context, is_valid_identifier};
use extreg_protocols::{ExtensionDef, ExtensionError, ExtensionRef};

use crate::storage::{canonical_path, persistence};
use crate::xml::{DefinitionSerializer, Element};

const ROOT: &str = "PSXExtensionHandlerConfiguration";
const HANDLER_NAME_ATTR: &str = "handlerName";
const PENDING_REMOVAL: &str = "pendingRemoval";

/// Definitions bucketed by context plus the pending-removal set.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerConfiguration {
    handler_name: String,
    // context -> canonical reference string -> definition
    definitions: BTreeMap<String, BTreeMap<String, ExtensionDef>>,
    pending_removals: BTreeSet<PathBuf>,
}

impl HandlerConfiguration {
    pub fn new(handler_name: impl Into<String>) -> Self {
        Self {
            handler_name: handler_name.into(),
            definitions: BTreeMap::new(),
            pending_removals: BTreeSet::new(),
        }
    }

    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    pub fn is_defined(&self, reference: &ExtensionRef) -> bool {
        self.get_definition(reference).is_some()
    }

    pub fn get_definition(&self, reference: &ExtensionRef) -> Option<&ExtensionDef> {
        self.definitions
            .get(reference.context())?
            .get(&reference.canonical_string())
    }

    /// Add a definition, silently replacing one with the same reference.
    pub fn add_definition(&mut self, def: ExtensionDef) {
        let reference = def.reference();
        self.definitions
            .entry(reference.context().to_string())
            .or_default()
            .insert(reference.canonical_string(), def);
    }

    /// Remove a definition. Removing an absent one is a no-op.
    pub fn remove_definition(&mut self, reference: &ExtensionRef) -> Option<ExtensionDef> {
        let bucket = self.definitions.get_mut(reference.context())?;
        let removed = bucket.remove(&reference.canonical_string());
        if bucket.is_empty() {
            self.definitions.remove(reference.context());
        }
        removed
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ExtensionDef> {
        self.definitions.values().flat_map(|bucket| bucket.values())
    }

    pub fn list_names(&self) -> Vec<ExtensionRef> {
        self.definitions()
            .map(|def| def.reference().clone())
            .collect()
    }

    /// References in one context. An unknown but well-formed context yields
    /// an empty list; a malformed one is an error.
    pub fn list_names_in(&self, context: &str) -> Result<Vec<ExtensionRef>, ExtensionError> {
        let context = canonicalize_context(context)?;
        Ok(self
            .definitions
            .get(&context)
            .map(|bucket| bucket.values().map(|d| d.reference().clone()).collect())
            .unwrap_or_default())
    }

    pub fn pending_removals(&self) -> impl Iterator<Item = &Path> {
        self.pending_removals.iter().map(PathBuf::as_path)
    }

    pub fn is_pending_removal(&self, path: &Path) -> bool {
        self.pending_removals.contains(&canonical_path(path))
    }

    /// Queue a path for deferred deletion. Idempotent.
    pub fn set_pending_removal(&mut self, path: &Path) {
        self.pending_removals.insert(canonical_path(path));
    }

    /// Drop a path from the deferred deletion set. Idempotent.
    pub fn clear_pending_removal(&mut self, path: &Path) {
        self.pending_removals.remove(&canonical_path(path));
    }

    pub fn to_element(&self) -> Element {
        let mut root = Element::new(ROOT).with_attr(HANDLER_NAME_ATTR, &self.handler_name);
        for path in &self.pending_removals {
            root.push_child(
                Element::new(PENDING_REMOVAL).with_attr("name", path.to_string_lossy()),
            );
        }
        for def in self.definitions() {
            root.push_child(DefinitionSerializer::to_element(def));
        }
        root
    }

    /// Build from a parsed document. Malformed `Extension` elements are
    /// skipped with a warning.
    pub fn from_element(
        element: &Element,
        default_handler_name: &str,
    ) -> Result<Self, ExtensionError> {
        if element.name != ROOT {
            return Err(ExtensionError::Persistence(format!(
                "expected <{}> root element, found <{}>",
                ROOT, element.name
            )));
        }

        let handler_name = element
            .attr(HANDLER_NAME_ATTR)
            .unwrap_or(default_handler_name);
        if !is_valid_identifier(handler_name) {
            return Err(ExtensionError::Persistence(format!(
                "invalid handlerName '{}'",
                handler_name
            )));
        }
        if handler_name != default_handler_name {
            warn!(
                "Configuration handlerName '{}' differs from expected '{}'",
                handler_name, default_handler_name
            );
        }

        let mut config = Self::new(handler_name);
        for pending in element.children_named(PENDING_REMOVAL) {
            match pending.attr("name") {
                Some(name) if !name.is_empty() => {
                    config.pending_removals.insert(PathBuf::from(name));
                }
                _ => warn!("Ignoring pendingRemoval entry without a name"),
            }
        }
        for child in element.children_named(DefinitionSerializer::ELEMENT) {
            match DefinitionSerializer::from_element(child) {
                Ok(def) => config.add_definition(def),
                Err(e) => warn!(
                    "Skipping malformed extension '{}' in {} configuration: {}",
                    child.attr("name").unwrap_or("?"),
                    handler_name,
                    e
                ),
            }
        }
        Ok(config)
    }

    /// Load from `path`. A missing file yields an empty configuration when
    /// `create_if_missing` is set.
    pub fn load(
        path: &Path,
        create_if_missing: bool,
        default_handler_name: &str,
    ) -> Result<Self, ExtensionError> {
        if !path.exists() {
            if create_if_missing {
                debug!("No configuration at {:?}, starting empty", path);
                return Ok(Self::new(default_handler_name));
            }
            return Err(ExtensionError::Persistence(format!(
                "configuration file {} does not exist",
                path.display()
            )));
        }

        let content = fs::read_to_string(path).map_err(|e| persistence(path, e))?;
        let element = Element::parse(&content).map_err(|e| persistence(path, e))?;
        Self::from_element(&element, default_handler_name)
    }

    /// Persist to `path`.
    ///
    /// The document goes to `<stem>_temp.<ext>` first, the current file is
    /// copied to `<stem>_bak.<ext>`, then the temp file replaces it.
    pub fn store(&self, path: &Path) -> Result<(), ExtensionError> {
        let document = self
            .to_element()
            .to_document()
            .map_err(|e| persistence(path, e))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| persistence(parent, e))?;
        }

        let temp = sibling(path, "_temp");
        fs::write(&temp, document).map_err(|e| persistence(&temp, e))?;

        if path.exists() {
            let backup = sibling(path, "_bak");
            fs::copy(path, &backup).map_err(|e| persistence(&backup, e))?;
        }

        fs::rename(&temp, path).map_err(|e| persistence(path, e))?;
        debug!("Stored {} configuration to {:?}", self.handler_name, path);
        Ok(())
    }
}

/// `dir/stem{suffix}.ext`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    path.with_file_name(name)
}

#[cfg(test)]
#[path = "configuration_tests.rs"]
mod tests;
