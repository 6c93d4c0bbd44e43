//! Extension definitions.
//!
//! An [`ExtensionDef`] describes one extension: the interfaces it implements,
//! its init parameters, the resources it depends on, its runtime parameter
//! schema and, for script-invocable extensions, its callable methods.

use std::collections::BTreeMap;

use crate::error::ExtensionError;
use crate::reference::ExtensionRef;

mod parts;

pub use parts::{ExtensionMethod, MethodParam, ResourceFile, RuntimeParam};

/// Reserved init parameter holding the definition version.
pub const VERSION_PARAM: &str = "extension.version";

/// Reserved init parameter; anything but `false`/`no`/`0` means reentrant.
pub const REENTRANT_PARAM: &str = "extension.reentrant";

/// Init parameter naming the implementation to load.
pub const CLASS_NAME_PARAM: &str = "className";

/// Marker interface for extensions callable from scripts.
pub const SCRIPTABLE_INTERFACE: &str = "extreg.IScriptable";

/// Definition of one extension, keyed by its reference.
#[derive(Debug, Clone)]
pub struct ExtensionDef {
    reference: ExtensionRef,
    interfaces: Vec<String>,
    init_params: BTreeMap<String, String>,
    resources: Vec<String>,
    runtime_params: Vec<RuntimeParam>,
    supplied_resources: Option<Vec<String>>,
    deprecated: bool,
    restore_request_params_on_error: bool,
    required_applications: Vec<String>,
    methods: BTreeMap<String, ExtensionMethod>,
}

impl ExtensionDef {
    /// Create a definition. At least one interface name is required.
    pub fn new<I, S>(reference: ExtensionRef, interfaces: I) -> Result<Self, ExtensionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let interfaces: Vec<String> = interfaces.into_iter().map(Into::into).collect();
        if interfaces.is_empty() {
            return Err(ExtensionError::InvalidDefinition(format!(
                "{} must implement at least one interface",
                reference
            )));
        }
        if let Some(blank) = interfaces.iter().find(|i| i.trim().is_empty()) {
            return Err(ExtensionError::InvalidDefinition(format!(
                "{} declares a blank interface name '{}'",
                reference, blank
            )));
        }

        Ok(Self {
            reference,
            interfaces,
            init_params: BTreeMap::new(),
            resources: Vec::new(),
            runtime_params: Vec::new(),
            supplied_resources: None,
            deprecated: false,
            restore_request_params_on_error: false,
            required_applications: Vec::new(),
            methods: BTreeMap::new(),
        })
    }

    pub fn reference(&self) -> &ExtensionRef {
        &self.reference
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// True if the interface list contains `interface`.
    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i == interface)
    }

    pub fn add_interface(&mut self, interface: impl Into<String>) {
        let interface = interface.into();
        if !self.implements(&interface) {
            self.interfaces.push(interface);
        }
    }

    pub fn is_script_invocable(&self) -> bool {
        self.implements(SCRIPTABLE_INTERFACE)
    }

    pub fn init_params(&self) -> &BTreeMap<String, String> {
        &self.init_params
    }

    pub fn init_param(&self, name: &str) -> Option<&str> {
        self.init_params.get(name).map(String::as_str)
    }

    pub fn set_init_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.init_params.insert(name.into(), value.into());
    }

    pub fn remove_init_param(&mut self, name: &str) -> Option<String> {
        self.init_params.remove(name)
    }

    pub fn with_init_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_init_param(name, value);
        self
    }

    /// Version from the reserved parameter. Never fails: anything missing,
    /// unparsable or below 1 reads as 1.
    pub fn version(&self) -> u32 {
        self.init_param(VERSION_PARAM)
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|v| *v >= 1)
            .unwrap_or(1)
    }

    /// Set the version. Handlers overwrite this on install and update, so a
    /// caller-provided value never reaches the registry.
    pub fn set_version(&mut self, version: u32) {
        self.set_init_param(VERSION_PARAM, version.max(1).to_string());
    }

    pub fn is_reentrant(&self) -> bool {
        match self.init_param(REENTRANT_PARAM) {
            Some(v) => !matches!(v.trim().to_ascii_lowercase().as_str(), "false" | "no" | "0"),
            None => true,
        }
    }

    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    /// Add a declared resource location after validating it.
    pub fn add_resource(&mut self, location: impl Into<String>) -> Result<(), ExtensionError> {
        let location = location.into();
        resource_location_path(&location)?;
        if !self.resources.contains(&location) {
            self.resources.push(location);
        }
        Ok(())
    }

    pub fn with_resource(mut self, location: impl Into<String>) -> Result<Self, ExtensionError> {
        self.add_resource(location)?;
        Ok(self)
    }

    pub fn runtime_params(&self) -> &[RuntimeParam] {
        &self.runtime_params
    }

    pub fn add_runtime_param(&mut self, param: RuntimeParam) {
        self.runtime_params.push(param);
    }

    pub fn with_runtime_param(mut self, param: RuntimeParam) -> Self {
        self.add_runtime_param(param);
        self
    }

    /// Catalogued physical files, `None` until catalogued.
    pub fn supplied_resources(&self) -> Option<&[String]> {
        self.supplied_resources.as_deref()
    }

    pub fn set_supplied_resources(&mut self, resources: Option<Vec<String>>) {
        self.supplied_resources = resources;
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecated
    }

    pub fn set_deprecated(&mut self, deprecated: bool) {
        self.deprecated = deprecated;
    }

    pub fn restore_request_params_on_error(&self) -> bool {
        self.restore_request_params_on_error
    }

    pub fn set_restore_request_params_on_error(&mut self, restore: bool) {
        self.restore_request_params_on_error = restore;
    }

    pub fn required_applications(&self) -> &[String] {
        &self.required_applications
    }

    pub fn add_required_application(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.required_applications.contains(&name) {
            self.required_applications.push(name);
        }
    }

    pub fn methods(&self) -> &BTreeMap<String, ExtensionMethod> {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&ExtensionMethod> {
        self.methods.get(name)
    }

    /// Declare a callable method, replacing any previous one of that name.
    pub fn add_method(&mut self, method: ExtensionMethod) {
        self.methods.insert(method.name.clone(), method);
    }

    pub fn with_method(mut self, method: ExtensionMethod) -> Self {
        self.add_method(method);
        self
    }
}

impl PartialEq for ExtensionDef {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference
            && self.reference.category() == other.reference.category()
            && self.interfaces == other.interfaces
            && self.init_params == other.init_params
            && self.resources == other.resources
            && self.runtime_params == other.runtime_params
            && self.supplied_resources == other.supplied_resources
            && self.deprecated == other.deprecated
            && self.restore_request_params_on_error == other.restore_request_params_on_error
            && self.required_applications == other.required_applications
            && self.methods == other.methods
    }
}

impl Eq for ExtensionDef {}

/// Validate a resource location and return its relative path part.
///
/// Locations are relative paths, optionally with a `file:` scheme. Absolute
/// paths, `..` segments and any other URL scheme are rejected.
pub fn resource_location_path(location: &str) -> Result<&str, ExtensionError> {
    let invalid = |why: &str| {
        ExtensionError::InvalidDefinition(format!("resource '{}' {}", location, why))
    };

    let path = match location.split_once(':') {
        Some((scheme, rest)) if scheme.len() > 1 => {
            if !scheme.eq_ignore_ascii_case("file") {
                return Err(invalid("uses an unsupported URL scheme"));
            }
            rest
        }
        Some(_) => return Err(invalid("must be relative")),
        None => location,
    };

    if path.trim().is_empty() {
        return Err(invalid("is empty"));
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(invalid("must be relative"));
    }
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(invalid("must not contain '..'"));
    }

    Ok(path)
}

#[cfg(test)]
#[path = "definition_tests.rs"]
mod tests;
