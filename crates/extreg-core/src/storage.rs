//! Filesystem helpers for extension code directories.
//!
//! Layout under a handler's code root:
//! ```text
//! {code_root}/
//! └── {context segments}/
//!     └── {extension name}/        extension directory
//!         └── {version}/           version directory, resources live here
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use extreg_protocols::definition::resource_location_path;
use extreg_protocols::{ExtensionError, ExtensionRef, ResourceFile};

/// `{code_root}/{context}/{name}`.
pub fn extension_dir(code_root: &Path, reference: &ExtensionRef) -> PathBuf {
    let mut dir = code_root.to_path_buf();
    for segment in reference.context().split('/').filter(|s| !s.is_empty()) {
        dir.push(segment);
    }
    dir.push(reference.extension_name());
    dir
}

/// `{code_root}/{context}/{name}/{version}`.
pub fn version_dir(code_root: &Path, reference: &ExtensionRef, version: u32) -> PathBuf {
    extension_dir(code_root, reference).join(version.to_string())
}

/// Resolve a resource path relative to `base`, refusing anything that could
/// escape it.
pub fn safe_join(base: &Path, relative: &str) -> Option<PathBuf> {
    let relative = relative.replace('\\', "/");
    if relative.is_empty() || relative.starts_with('/') {
        return None;
    }

    let mut path = base.to_path_buf();
    for component in Path::new(&relative).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (path != base).then_some(path)
}

/// Write resource files into `dir`, returning the relative paths written.
///
/// Files with absolute or escaping paths are skipped with a warning.
pub fn write_resources(dir: &Path, resources: &[ResourceFile]) -> Result<Vec<String>, ExtensionError> {
    fs::create_dir_all(dir).map_err(|e| persistence(dir, e))?;

    let mut written = Vec::with_capacity(resources.len());
    for resource in resources {
        let Some(target) = safe_join(dir, &resource.path) else {
            warn!("Skipping resource with unsafe path '{}'", resource.path);
            continue;
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| persistence(parent, e))?;
        }
        fs::write(&target, &resource.content).map_err(|e| persistence(&target, e))?;
        debug!("Wrote resource {:?}", target);
        written.push(resource.path.replace('\\', "/"));
    }
    Ok(written)
}

/// Catalog every file under the definition's resource locations.
///
/// Paths are relative to `dir`, `/`-separated and sorted per location.
pub fn catalog_resources(dir: &Path, locations: &[String]) -> Result<Vec<String>, ExtensionError> {
    let mut files = Vec::new();
    for location in locations {
        let relative = resource_location_path(location)
            .map_err(|e| ExtensionError::Catalog(e.to_string()))?;
        let root = safe_join(dir, relative).ok_or_else(|| {
            ExtensionError::Catalog(format!("resource location '{}' is not relative", location))
        })?;
        if !root.exists() {
            return Err(ExtensionError::Catalog(format!(
                "resource location '{}' does not exist under {}",
                location,
                dir.display()
            )));
        }

        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|e| ExtensionError::Catalog(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(dir) {
                files.push(to_slash_path(rel));
            }
        }
    }
    Ok(files)
}

/// Delete a file or directory tree. A missing target counts as deleted.
pub fn remove_path(path: &Path) -> std::io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Canonical absolute form of `path`.
///
/// The nearest existing ancestor is canonicalized through the filesystem and
/// the missing remainder appended, so paths that no longer exist still map to
/// the same key they had while present.
pub fn canonical_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return missing.iter().rev().fold(canonical, |acc, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

/// Copy the contents of `from` into `to` without overwriting files already
/// present in `to`.
///
/// Entries at or below a path in `skip` (relative to `from`) are not copied.
pub fn copy_missing(from: &Path, to: &Path, skip: &[PathBuf]) -> Result<usize, ExtensionError> {
    if !from.is_dir() {
        return Ok(0);
    }

    let walker = WalkDir::new(from)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match entry.path().strip_prefix(from) {
            Ok(rel) => !skip.iter().any(|skipped| rel.starts_with(skipped)),
            Err(_) => true,
        });

    let mut copied = 0;
    for entry in walker {
        let entry = entry.map_err(|e| ExtensionError::Persistence(e.to_string()))?;
        let Ok(rel) = entry.path().strip_prefix(from) else {
            continue;
        };
        let target = to.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| persistence(&target, e))?;
        } else if entry.file_type().is_file() && !target.exists() {
            fs::copy(entry.path(), &target).map_err(|e| persistence(&target, e))?;
            copied += 1;
        }
    }
    Ok(copied)
}

fn to_slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub(crate) fn persistence(path: &Path, error: impl std::fmt::Display) -> ExtensionError {
    ExtensionError::Persistence(format!("{}: {}", path.display(), error))
}
