//! Configuration loader.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::ConfigError;
use crate::schema::ManagerConfig;

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<ManagerConfig, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from a file, or defaults when the file is absent.
    pub fn load_or_default(path: &Path) -> Result<ManagerConfig, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(ManagerConfig::default()),
            other => other,
        }
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<ManagerConfig, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let mut config: ManagerConfig = toml::from_str(&expanded)?;
        config.code_root = PathBuf::from(Self::expand_path(&config.code_root.to_string_lossy()));
        if let Some(dir) = config.logging.dir.take() {
            config.logging.dir = Some(PathBuf::from(Self::expand_path(&dir.to_string_lossy())));
        }
        Ok(config)
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let mut result = content.to_string();
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    /// Expand shell-style paths (e.g., `~/.extreg`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_empty_config() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.handlers_file, "ExtensionHandlers.xml");
        assert_eq!(config.default_handler.name, "Native");
        assert!(!config.server_mode);
    }

    #[test]
    fn test_load_basic_config() {
        let content = r#"
            code_root = "/srv/extreg"
            server_mode = true
            library_dir = "shared"

            [default_handler]
            name = "Builtin"
            config_file = "builtin.xml"

            [logging]
            level = "debug"
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.code_root, PathBuf::from("/srv/extreg"));
        assert!(config.server_mode);
        assert_eq!(config.resolved_library_dir(), PathBuf::from("/srv/extreg/shared"));
        assert_eq!(config.default_handler.name, "Builtin");
        assert_eq!(config.default_handler.class_name, "extreg.NativeExtensionHandler");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_absolute_library_dir_kept() {
        let config = ConfigLoader::load_str("library_dir = \"/opt/libs\"").unwrap();
        assert_eq!(config.resolved_library_dir(), PathBuf::from("/opt/libs"));
    }

    #[test]
    fn test_code_root_tilde_expanded() {
        let config = ConfigLoader::load_str("code_root = \"~/ext\"").unwrap();
        assert!(!config.code_root.to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "handlers_file = \"handlers.xml\"").unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.handlers_file, "handlers.xml");
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ConfigLoader::load(Path::new("/nonexistent/path/extreg.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_or_default_missing() {
        let config =
            ConfigLoader::load_or_default(Path::new("/nonexistent/path/extreg.toml")).unwrap();
        assert_eq!(config.default_handler.name, "Native");
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = ConfigLoader::load_str("server_mode = [unclosed");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: This test runs in isolation and sets a unique test-only env var
        unsafe {
            std::env::set_var("EXTREG_TEST_CONFIG_VAR", "test_value");
        }
        let content = "value = \"${EXTREG_TEST_CONFIG_VAR}\"";
        let expanded = ConfigLoader::expand_env_vars(content).unwrap();
        assert!(expanded.contains("test_value"));
        unsafe {
            std::env::remove_var("EXTREG_TEST_CONFIG_VAR");
        }
    }

    #[test]
    fn test_expand_env_vars_not_set() {
        let content = "value = \"${NONEXISTENT_EXTREG_VAR_12345}\"";
        let result = ConfigLoader::expand_env_vars(content);
        assert!(matches!(result, Err(ConfigError::EnvVarNotSet(_))));
    }

    #[test]
    fn test_expand_path_no_tilde() {
        let path = "/usr/local/lib";
        assert_eq!(ConfigLoader::expand_path(path), path);
    }
}
