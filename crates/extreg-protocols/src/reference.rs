//! Extension references.
//!
//! An [`ExtensionRef`] names one extension by the handler that owns it, the
//! context it lives in and its own name. The canonical string form is
//! `handler/context/name`, where the context may itself contain slashes.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ExtensionError;

/// Immutable, validated `(handler, context, name)` key.
///
/// Equality and hashing ignore the category.
#[derive(Debug, Clone)]
pub struct ExtensionRef {
    handler_name: String,
    context: String,
    extension_name: String,
    category: String,
}

impl ExtensionRef {
    /// Create a reference, validating every component.
    pub fn new(
        handler_name: impl Into<String>,
        context: impl AsRef<str>,
        extension_name: impl Into<String>,
    ) -> Result<Self, ExtensionError> {
        let handler_name = handler_name.into();
        let extension_name = extension_name.into();

        if !is_valid_identifier(&handler_name) {
            return Err(ExtensionError::InvalidReference(format!(
                "invalid handler name '{}'",
                handler_name
            )));
        }
        if !is_valid_identifier(&extension_name) {
            return Err(ExtensionError::InvalidReference(format!(
                "invalid extension name '{}'",
                extension_name
            )));
        }
        let context = canonicalize_context(context.as_ref())?;

        Ok(Self {
            handler_name,
            context,
            extension_name,
            category: String::new(),
        })
    }

    /// Parse a canonical `handler/context/name` string.
    pub fn parse(full_name: &str) -> Result<Self, ExtensionError> {
        let (first, last) = match (full_name.find('/'), full_name.rfind('/')) {
            (Some(first), Some(last)) if first != last => (first, last),
            _ => {
                return Err(ExtensionError::InvalidReference(format!(
                    "'{}' must have the form handler/context/name",
                    full_name
                )));
            }
        };

        if first == 0 || last == full_name.len() - 1 {
            return Err(ExtensionError::InvalidReference(format!(
                "'{}' has an empty handler or extension name",
                full_name
            )));
        }

        Self::new(
            &full_name[..first],
            &full_name[first + 1..=last],
            &full_name[last + 1..],
        )
    }

    /// Attach a free-form category. Not part of the identity.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    /// Context, always terminated by a slash.
    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn extension_name(&self) -> &str {
        &self.extension_name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// `handler/context/name`.
    pub fn canonical_string(&self) -> String {
        format!("{}/{}{}", self.handler_name, self.context, self.extension_name)
    }

    /// Case-insensitive ordering on the extension name only.
    pub fn compare_by_name(a: &ExtensionRef, b: &ExtensionRef) -> Ordering {
        a.extension_name
            .to_lowercase()
            .cmp(&b.extension_name.to_lowercase())
    }
}

impl PartialEq for ExtensionRef {
    fn eq(&self, other: &Self) -> bool {
        self.handler_name == other.handler_name
            && self.context == other.context
            && self.extension_name == other.extension_name
    }
}

impl Eq for ExtensionRef {}

impl Hash for ExtensionRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handler_name.hash(state);
        self.context.hash(state);
        self.extension_name.hash(state);
    }
}

impl fmt::Display for ExtensionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}{}", self.handler_name, self.context, self.extension_name)
    }
}

impl FromStr for ExtensionRef {
    type Err = ExtensionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ExtensionRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical_string())
    }
}

impl<'de> Deserialize<'de> for ExtensionRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// True if `s` starts with a letter or underscore and contains only
/// identifier characters.
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Dotted identifier such as `com.example.MyExtension`.
pub fn is_valid_dotted_identifier(s: &str) -> bool {
    !s.is_empty() && s.split('.').all(is_valid_identifier)
}

fn is_valid_context_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '-')
}

/// Validate a context and return it in canonical form: no leading slash,
/// exactly one trailing slash.
pub fn canonicalize_context(context: &str) -> Result<String, ExtensionError> {
    let trimmed = context.strip_prefix('/').unwrap_or(context);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);

    if trimmed.is_empty() {
        return Err(ExtensionError::InvalidReference(
            "context must not be empty".to_string(),
        ));
    }

    for segment in trimmed.split('/') {
        if !is_valid_context_segment(segment) {
            return Err(ExtensionError::InvalidReference(format!(
                "invalid context segment '{}' in '{}'",
                segment, context
            )));
        }
    }

    Ok(format!("{}/", trimmed))
}

#[cfg(test)]
#[path = "reference_tests.rs"]
mod tests;
