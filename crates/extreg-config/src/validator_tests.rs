use super::*;
use tempfile::TempDir;

fn config_in(dir: &TempDir) -> ManagerConfig {
    ManagerConfig {
        code_root: dir.path().to_path_buf(),
        ..ManagerConfig::default()
    }
}

#[test]
fn test_validate_default_config() {
    let dir = TempDir::new().unwrap();
    let result = ConfigValidator::validate(&config_in(&dir));
    assert!(result.is_valid());
    assert!(result.warnings.is_empty());
}

#[test]
fn test_missing_code_root_is_warning() {
    let mut config = ManagerConfig::default();
    config.code_root = "/nonexistent/extreg/root".into();

    let result = ConfigValidator::validate(&config);
    assert!(result.is_valid());
    assert!(result.warnings.iter().any(|w| w.path == "code_root"));
}

#[test]
fn test_code_root_must_be_directory() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("file");
    std::fs::write(&file, "x").unwrap();

    let mut config = config_in(&dir);
    config.code_root = file;
    let result = ConfigValidator::validate(&config);
    assert!(!result.is_valid());
}

#[test]
fn test_invalid_handlers_file() {
    let dir = TempDir::new().unwrap();
    for bad in ["", "/abs/handlers.xml", "../handlers.xml"] {
        let mut config = config_in(&dir);
        config.handlers_file = bad.to_string();
        let result = ConfigValidator::validate(&config);
        assert!(result.errors.iter().any(|e| e.path == "handlers_file"), "{:?}", bad);
    }
}

#[test]
fn test_invalid_default_handler() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir);
    config.default_handler.name = "9bad".to_string();
    config.default_handler.class_name = "not a class".to_string();

    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "default_handler.name"));
    assert!(result.errors.iter().any(|e| e.path == "default_handler.class_name"));
}

#[test]
fn test_unknown_log_level_warns() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir);
    config.logging.level = "extreg_core=trace".to_string();

    let result = ConfigValidator::validate(&config);
    assert!(result.is_valid());
    assert!(result.warnings.iter().any(|w| w.path == "logging.level"));
}

#[test]
fn test_server_mode_missing_library_dir_warns() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir);
    config.server_mode = true;

    let result = ConfigValidator::validate(&config);
    assert!(result.warnings.iter().any(|w| w.path == "library_dir"));
}

#[test]
fn test_into_result() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir);
    assert!(ConfigValidator::validate(&config).into_result().is_ok());

    config.default_handler.name = String::new();
    let err = ConfigValidator::validate(&config).into_result().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }));
}
