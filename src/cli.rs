//! CLI definitions for extreg.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// extreg CLI.
#[derive(Parser)]
#[command(name = "extreg")]
#[command(about = "Versioned extension registry and lifecycle manager")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", global = true)]
    pub config: PathBuf,

    /// Code root, overriding the configured one
    #[arg(long, env = "EXTREG_CODE_ROOT", global = true)]
    pub code_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// List registered extensions
    List {
        /// Handler name pattern (SQL LIKE)
        #[arg(long)]
        handler: Option<String>,

        /// Context, such as site/pages/
        #[arg(long)]
        context: Option<String>,

        /// Interface pattern (SQL LIKE)
        #[arg(long)]
        interface: Option<String>,

        /// Extension name pattern (SQL LIKE)
        #[arg(long)]
        name: Option<String>,

        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Show one extension definition
    Show {
        /// Reference as handler/context/name
        reference: String,

        /// Print the definition as XML
        #[arg(long)]
        xml: bool,
    },

    /// Install an extension from a definition file
    Install {
        /// Definition XML file
        definition: PathBuf,

        /// Directory whose files become the extension's resources
        #[arg(short, long)]
        resource: Option<PathBuf>,
    },

    /// Replace an extension with its next version
    Update {
        /// Definition XML file
        definition: PathBuf,

        /// Directory whose files become the extension's resources
        #[arg(short, long)]
        resource: Option<PathBuf>,
    },

    /// Remove an extension
    Remove {
        /// Reference as handler/context/name
        reference: String,
    },

    /// List registered handlers
    Handlers,

    /// Retry deferred directory deletions
    Purge,

    /// Keep the manager running and watch the library directory
    Serve,
}
