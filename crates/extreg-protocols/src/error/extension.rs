//! Extension-related errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("Invalid extension reference: {0}")]
    InvalidReference(String),

    #[error("Invalid extension definition: {0}")]
    InvalidDefinition(String),

    #[error("Extension not found: {0}")]
    NotFound(String),

    #[error("Extension already exists: {0}")]
    AlreadyExists(String),

    #[error("Extension {handler}/{extension} failed to initialize: {cause}")]
    InitFailed {
        handler: String,
        extension: String,
        cause: String,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Resource catalog error: {0}")]
    Catalog(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl ExtensionError {
    /// Wrap any load-time failure of an extension.
    pub fn init_failed(
        handler: impl Into<String>,
        extension: impl Into<String>,
        cause: impl ToString,
    ) -> Self {
        Self::InitFailed {
            handler: handler.into(),
            extension: extension.into(),
            cause: cause.to_string(),
        }
    }

    /// Returns true for caller errors that should never be retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidReference(_) | Self::InvalidDefinition(_)
        )
    }
}
