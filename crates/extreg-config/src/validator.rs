//! Configuration validation.

use std::path::Path;

use extreg_protocols::reference::{is_valid_dotted_identifier, is_valid_identifier};

use crate::error::ConfigError;
use crate::schema::ManagerConfig;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Turn the first error into a [`ConfigError`].
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &ManagerConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_paths(config, &mut result);
        Self::validate_default_handler(config, &mut result);
        Self::validate_logging(config, &mut result);

        result
    }

    fn validate_paths(config: &ManagerConfig, result: &mut ValidationResult) {
        if !is_relative_file_name(&config.handlers_file) {
            result.add_error(ValidationError::new(
                "handlers_file",
                "must be a non-empty path relative to code_root without '..'",
            ));
        }

        if config.code_root.exists() && !config.code_root.is_dir() {
            result.add_error(ValidationError::new(
                "code_root",
                format!("{} is not a directory", config.code_root.display()),
            ));
        } else if !config.code_root.exists() {
            result.add_warning(ValidationWarning::new(
                "code_root",
                format!("{} does not exist and will be created", config.code_root.display()),
            ));
        }

        if config.server_mode && !config.resolved_library_dir().exists() {
            result.add_warning(ValidationWarning::new(
                "library_dir",
                "library directory does not exist, it will be created before watching",
            ));
        }
    }

    fn validate_default_handler(config: &ManagerConfig, result: &mut ValidationResult) {
        let handler = &config.default_handler;

        if !is_valid_identifier(&handler.name) {
            result.add_error(ValidationError::new(
                "default_handler.name",
                format!("'{}' is not a valid identifier", handler.name),
            ));
        }

        if !is_valid_dotted_identifier(&handler.class_name) {
            result.add_error(ValidationError::new(
                "default_handler.class_name",
                format!("'{}' is not a valid class name", handler.class_name),
            ));
        }

        if !is_relative_file_name(&handler.config_file) {
            result.add_error(ValidationError::new(
                "default_handler.config_file",
                "must be a non-empty relative path without '..'",
            ));
        }
    }

    fn validate_logging(config: &ManagerConfig, result: &mut ValidationResult) {
        let known = ["trace", "debug", "info", "warn", "error"];
        if !known.contains(&config.logging.level.to_ascii_lowercase().as_str()) {
            result.add_warning(ValidationWarning::new(
                "logging.level",
                format!(
                    "'{}' is not a plain level, it will be parsed as a filter directive",
                    config.logging.level
                ),
            ));
        }
    }
}

fn is_relative_file_name(name: &str) -> bool {
    let path = Path::new(name);
    !name.trim().is_empty()
        && !path.is_absolute()
        && !name.starts_with('/')
        && !name.split(['/', '\\']).any(|segment| segment == "..")
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
