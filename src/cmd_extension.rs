//! Extension subcommand handlers for extreg.

use std::fs;
use std::path::Path;
use std::sync::mpsc::{self, Receiver};

use serde_json::json;
use tracing::{debug, info};
use walkdir::WalkDir;

use extreg_core::{DefinitionSerializer, ExtensionManager};
use extreg_protocols::{ExtensionDef, ExtensionRef, ResourceFile};

use crate::cli::Commands;

/// Handle a subcommand against an initialized manager.
pub(crate) fn handle_command(
    manager: &ExtensionManager,
    command: Commands,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::List {
            handler,
            context,
            interface,
            name,
            format,
        } => list(
            manager,
            handler.as_deref(),
            context.as_deref(),
            interface.as_deref(),
            name.as_deref(),
            &format,
        ),
        Commands::Show { reference, xml } => show(manager, &reference, xml),
        Commands::Install {
            definition,
            resource,
        } => {
            let (def, resources) = read_definition(&definition, resource.as_deref())?;
            let installed = manager.install_extension(def, &resources)?;
            println!(
                "Installed {} version {}",
                installed.reference(),
                installed.version()
            );
            Ok(())
        }
        Commands::Update {
            definition,
            resource,
        } => {
            let (def, resources) = read_definition(&definition, resource.as_deref())?;
            let updated = manager.update_extension(def, &resources)?;
            println!("Updated {} to version {}", updated.reference(), updated.version());
            Ok(())
        }
        Commands::Remove { reference } => {
            let reference = ExtensionRef::parse(&reference)?;
            manager.remove_extension(&reference)?;
            println!("Removed {}", reference);
            Ok(())
        }
        Commands::Handlers => {
            for name in manager.get_extension_handler_names()? {
                println!("{}", name);
            }
            Ok(())
        }
        Commands::Purge => {
            let remaining = manager.purge_pending_removals()?;
            println!("{} paths still pending removal", remaining);
            Ok(())
        }
        Commands::Serve => serve(manager),
    }
}

fn list(
    manager: &ExtensionManager,
    handler: Option<&str>,
    context: Option<&str>,
    interface: Option<&str>,
    name: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let references = manager.get_extension_names(handler, context, interface, name)?;
    let mut defs = Vec::with_capacity(references.len());
    for reference in &references {
        defs.push(manager.get_extension_def(reference)?);
    }

    match format {
        "json" => {
            let rows: Vec<_> = defs.iter().map(json_row).collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        _ => {
            if defs.is_empty() {
                println!("No extensions found.");
                return Ok(());
            }
            println!("{:<50} {:<8} {}", "REFERENCE", "VERSION", "INTERFACES");
            println!("{}", "-".repeat(90));
            for def in &defs {
                println!(
                    "{:<50} {:<8} {}",
                    def.reference().to_string(),
                    def.version(),
                    def.interfaces().join(", ")
                );
            }
        }
    }
    Ok(())
}

fn json_row(def: &ExtensionDef) -> serde_json::Value {
    json!({
        "reference": def.reference(),
        "version": def.version(),
        "interfaces": def.interfaces(),
        "deprecated": def.is_deprecated(),
        "runtime_params": def.runtime_params(),
        "methods": def.methods().values().collect::<Vec<_>>(),
    })
}

fn show(
    manager: &ExtensionManager,
    reference: &str,
    xml: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let reference = ExtensionRef::parse(reference)?;
    let def = manager.get_extension_def(&reference)?;
    if xml {
        println!("{}", DefinitionSerializer::to_xml_string(&def)?);
        return Ok(());
    }

    println!("Extension: {}", def.reference());
    println!("{}", "=".repeat(50));
    println!("Version:     {}", def.version());
    println!("Reentrant:   {}", def.is_reentrant());
    println!("Deprecated:  {}", def.is_deprecated());
    println!("Code root:   {}", manager.code_root(&reference)?.display());
    println!("Interfaces:  {}", def.interfaces().join(", "));

    if !def.init_params().is_empty() {
        println!("\nInit parameters:");
        for (name, value) in def.init_params() {
            println!("  {} = {}", name, value);
        }
    }
    if !def.methods().is_empty() {
        println!("\nMethods:");
        for method in def.methods().values() {
            println!("  - {}", method.name);
        }
    }
    if let Some(files) = def.supplied_resources() {
        println!("\nResources:");
        for file in files {
            println!("  - {}", file);
        }
    }
    Ok(())
}

/// Read a definition file and, optionally, every file under a resource
/// directory.
fn read_definition(
    path: &Path,
    resource_dir: Option<&Path>,
) -> Result<(ExtensionDef, Vec<ResourceFile>), Box<dyn std::error::Error>> {
    let xml = fs::read_to_string(path)?;
    let def = DefinitionSerializer::from_xml_str(&xml)?;
    let resources = match resource_dir {
        Some(dir) => collect_resources(dir)?,
        None => Vec::new(),
    };
    debug!("Read {} with {} resource files", def.reference(), resources.len());
    Ok((def, resources))
}

fn collect_resources(dir: &Path) -> Result<Vec<ResourceFile>, Box<dyn std::error::Error>> {
    let mut resources = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(dir)?;
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        resources.push(ResourceFile::new(relative, fs::read(entry.path())?));
    }
    Ok(resources)
}

/// Block while the library watcher runs, until SIGINT or SIGTERM. The caller
/// shuts the manager down afterwards.
fn serve(manager: &ExtensionManager) -> Result<(), Box<dyn std::error::Error>> {
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    info!(
        "Serving extensions from {}; {} shared libraries loaded",
        manager.root()?.display(),
        manager.extra_libraries().len()
    );
    wait_for_stop(&rx);
    info!("Stop requested, shutting down");
    Ok(())
}

/// Wait for the first stop request. A disconnected sender counts as one.
fn wait_for_stop(stop: &Receiver<()>) {
    if stop.recv().is_err() {
        debug!("Stop channel closed");
    }
}
