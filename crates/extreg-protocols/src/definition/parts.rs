//! Value types embedded in an extension definition.

use serde::{Deserialize, Serialize};

/// Declared runtime parameter, used to check invocation arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeParam {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub description: String,
}

impl RuntimeParam {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Parameter of a declared callable method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodParam {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub description: String,
}

impl MethodParam {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Callable method manifest entry for script-invocable extensions.
///
/// Methods are declared explicitly in the definition; nothing is discovered
/// from the implementation at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionMethod {
    pub name: String,
    pub return_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub params: Vec<MethodParam>,
}

impl ExtensionMethod {
    pub fn new(name: impl Into<String>, return_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            return_type: return_type.into(),
            description: String::new(),
            params: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_param(mut self, param: MethodParam) -> Self {
        self.params.push(param);
        self
    }
}

/// A resource file supplied with an install or update.
///
/// `path` is relative to the extension's version directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFile {
    pub path: String,
    pub content: Vec<u8>,
}

impl ResourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}
