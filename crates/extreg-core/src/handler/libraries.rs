//! Dynamic library bookkeeping for native extensions.
//!
//! [`ExtraLibraries`] is the shared, append-only list of libraries dropped
//! into the library directory at runtime. [`LibraryWatcher`] feeds it from
//! filesystem notifications. [`LibrarySet`] is the per-extension set of
//! opened libraries that constructors are resolved from.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::{Library, Symbol};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use extreg_protocols::{Extension, ExtensionError};

/// File extensions treated as loadable libraries.
pub const LIBRARY_EXTENSIONS: &[&str] = &["so", "dylib", "dll"];

/// Prefix of the constructor symbol exported by extension libraries.
pub const CONSTRUCTOR_PREFIX: &str = "extreg_create_";

type CreateFn = unsafe extern "C" fn() -> *mut dyn Extension;

pub fn is_dynamic_library(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            LIBRARY_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Constructor symbol for a dotted class name.
pub fn constructor_symbol(class_name: &str) -> String {
    format!("{}{}", CONSTRUCTOR_PREFIX, class_name.replace('.', "_"))
}

/// Libraries visible to every native extension loaded after they appear.
#[derive(Debug, Default)]
pub struct ExtraLibraries {
    paths: RwLock<Vec<PathBuf>>,
}

impl ExtraLibraries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a library. Returns false if it was already known.
    pub fn add(&self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        let mut paths = self.paths.write();
        if paths.contains(&path) {
            return false;
        }
        info!("Registered extra library {:?}", path);
        paths.push(path);
        true
    }

    pub fn snapshot(&self) -> Vec<PathBuf> {
        self.paths.read().clone()
    }

    pub fn len(&self) -> usize {
        self.paths.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.read().is_empty()
    }

    /// Register every library already present in `dir`.
    pub fn scan_directory(&self, dir: &Path) -> std::io::Result<usize> {
        let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_dynamic_library(path))
            .collect();
        entries.sort();

        Ok(entries.into_iter().filter(|path| self.add(path.clone())).count())
    }
}

/// Watches the library directory and appends new libraries to
/// [`ExtraLibraries`]. Dropping the watcher stops it.
pub struct LibraryWatcher {
    dir: PathBuf,
    _watcher: RecommendedWatcher,
}

impl LibraryWatcher {
    /// Create `dir` if needed, register what is already there and start
    /// watching for new files.
    pub fn start(dir: &Path, libraries: Arc<ExtraLibraries>) -> Result<Self, ExtensionError> {
        fs::create_dir_all(dir).map_err(|e| {
            ExtensionError::IllegalState(format!(
                "cannot create library directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        match libraries.scan_directory(dir) {
            Ok(found) if found > 0 => info!("Found {} libraries in {:?}", found, dir),
            Ok(_) => {}
            Err(e) => warn!("Failed to scan library directory {:?}: {}", dir, e),
        }

        let sink = Arc::clone(&libraries);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for path in Self::added_libraries(&event) {
                        sink.add(path);
                    }
                }
                Err(e) => error!("Library watcher error: {}", e),
            },
            Config::default(),
        )
        .map_err(|e| ExtensionError::IllegalState(format!("failed to create watcher: {}", e)))?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| {
                ExtensionError::IllegalState(format!("failed to watch {}: {}", dir.display(), e))
            })?;

        info!("Watching library directory {:?}", dir);
        Ok(Self {
            dir: dir.to_path_buf(),
            _watcher: watcher,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Libraries created or rewritten by `event`.
    pub fn added_libraries(event: &Event) -> Vec<PathBuf> {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => event
                .paths
                .iter()
                .filter(|path| is_dynamic_library(path))
                .cloned()
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Opened libraries backing one native extension.
pub struct LibrarySet {
    libraries: Vec<(PathBuf, Library)>,
}

impl LibrarySet {
    /// Open every library in `paths`, in order.
    pub fn open(paths: &[PathBuf]) -> Result<Self, String> {
        let mut libraries = Vec::with_capacity(paths.len());
        for path in paths {
            // SAFETY: loading a library runs its initializers; libraries come
            // from the extension's own resources or the configured library
            // directory.
            let library = unsafe { Library::new(path) }
                .map_err(|e| format!("failed to load {}: {}", path.display(), e))?;
            debug!("Opened library {:?}", path);
            libraries.push((path.clone(), library));
        }
        Ok(Self { libraries })
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    /// Construct `class_name` from the first library exporting its
    /// constructor symbol.
    pub fn create(&self, class_name: &str) -> Result<Box<dyn Extension>, String> {
        let symbol = constructor_symbol(class_name);
        for (path, library) in &self.libraries {
            // SAFETY: the symbol type is the documented constructor signature.
            let constructor: Symbol<CreateFn> = match unsafe { library.get(symbol.as_bytes()) } {
                Ok(constructor) => constructor,
                Err(_) => continue,
            };

            // SAFETY: constructors return a pointer obtained from Box::into_raw.
            let raw = unsafe { constructor() };
            if raw.is_null() {
                return Err(format!("{} in {} returned null", symbol, path.display()));
            }
            // SAFETY: non-null and uniquely owned, see above.
            return Ok(unsafe { Box::from_raw(raw) });
        }

        Err(format!(
            "class {} not found (no {} in {} libraries)",
            class_name,
            symbol,
            self.libraries.len()
        ))
    }
}
