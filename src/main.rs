//! extreg - versioned extension registry
//!
//! Main entry point for the extreg admin CLI.

mod cli;
mod cmd_extension;

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use extreg_config::{ConfigLoader, ConfigValidator, LoggingConfig, ManagerConfig};
use extreg_core::ExtensionManager;

use crate::cli::{Cli, Commands};

/// Initialize tracing with console output and, when a log directory is
/// configured, a daily rolling file.
fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let file_layer = match &logging.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("extreg")
                .filename_suffix("log")
                .max_log_files(30)
                .build(dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // The guard flushes the writer on drop and must outlive main.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false).boxed())
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(())
}

fn load_config(cli: &Cli) -> Result<ManagerConfig, Box<dyn std::error::Error>> {
    let mut config = ConfigLoader::load_or_default(&cli.config)?;
    if let Some(root) = &cli.code_root {
        config.code_root = PathBuf::from(ConfigLoader::expand_path(&root.to_string_lossy()));
    }
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config.logging)?;

    for warning in ConfigValidator::validate(&config).into_result()? {
        warn!("Config {}: {}", warning.path, warning.message);
    }

    let server = config.server_mode || matches!(cli.command, Commands::Serve);
    let manager = ExtensionManager::new();
    manager.init(&config.code_root, &config, server)?;
    info!("Code root: {}", config.code_root.display());

    let result = cmd_extension::handle_command(&manager, cli.command);
    manager.shutdown();
    result
}
