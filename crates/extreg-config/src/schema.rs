//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration of the extension manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Root directory holding handler code directories and their files.
    #[serde(default = "default_code_root")]
    pub code_root: PathBuf,

    /// Server mode watches `library_dir` for newly dropped libraries.
    #[serde(default)]
    pub server_mode: bool,

    /// Handler-of-handlers configuration file, relative to `code_root`.
    #[serde(default = "default_handlers_file")]
    pub handlers_file: String,

    /// Directory of shared libraries visible to every native extension.
    /// Relative paths resolve against `code_root`.
    #[serde(default = "default_library_dir")]
    pub library_dir: PathBuf,

    #[serde(default)]
    pub default_handler: DefaultHandlerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ManagerConfig {
    /// Library directory resolved against the code root.
    pub fn resolved_library_dir(&self) -> PathBuf {
        if self.library_dir.is_absolute() {
            self.library_dir.clone()
        } else {
            self.code_root.join(&self.library_dir)
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            code_root: default_code_root(),
            server_mode: false,
            handlers_file: default_handlers_file(),
            library_dir: default_library_dir(),
            default_handler: DefaultHandlerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_code_root() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".extreg").join("extensions"))
        .unwrap_or_else(|| PathBuf::from("extensions"))
}

fn default_handlers_file() -> String {
    "ExtensionHandlers.xml".to_string()
}

fn default_library_dir() -> PathBuf {
    PathBuf::from("lib")
}

/// The handler registered on first start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultHandlerConfig {
    #[serde(default = "default_handler_name")]
    pub name: String,

    #[serde(default = "default_handler_class")]
    pub class_name: String,

    /// Handler configuration file, relative to the handler's code root.
    #[serde(default = "default_handler_config_file")]
    pub config_file: String,
}

impl Default for DefaultHandlerConfig {
    fn default() -> Self {
        Self {
            name: default_handler_name(),
            class_name: default_handler_class(),
            config_file: default_handler_config_file(),
        }
    }
}

fn default_handler_name() -> String {
    "Native".to_string()
}

fn default_handler_class() -> String {
    "extreg.NativeExtensionHandler".to_string()
}

fn default_handler_config_file() -> String {
    "Extensions.xml".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files; console only when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
