use super::*;
use std::any::Any;
use tempfile::TempDir;

use crate::handler::{DEFAULT_CONFIG_FILE, NATIVE_HANDLER_CLASS};

struct Counter;

impl Extension for Counter {
    fn init(&mut self, _def: &ExtensionDef, _code_root: &Path) -> Result<(), ExtensionError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
    fail: bool,
}

impl Recorder {
    fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    fn record(&self, kind: &str, reference: &ExtensionRef) -> Result<(), ExtensionError> {
        self.events.lock().push(format!("{} {}", kind, reference));
        if self.fail {
            return Err(ExtensionError::IllegalState("listener refused".to_string()));
        }
        Ok(())
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl ExtensionListener for Recorder {
    fn extension_added(&self, reference: &ExtensionRef) -> Result<(), ExtensionError> {
        self.record("added", reference)
    }

    fn extension_updated(&self, reference: &ExtensionRef) -> Result<(), ExtensionError> {
        self.record("updated", reference)
    }

    fn extension_removed(&self, reference: &ExtensionRef) -> Result<(), ExtensionError> {
        self.record("removed", reference)
    }
}

fn manager(dir: &TempDir) -> ExtensionManager {
    let manager = ExtensionManager::new();
    manager
        .extension_factories()
        .register("test.Counter", || Box::new(Counter))
        .unwrap();
    manager
        .init(dir.path(), &ManagerConfig::default(), false)
        .unwrap();
    manager
}

fn ext_ref(context: &str, name: &str) -> ExtensionRef {
    ExtensionRef::new("Native", context, name).unwrap()
}

fn def(context: &str, name: &str, interface: &str) -> ExtensionDef {
    ExtensionDef::new(ext_ref(context, name), [interface])
        .unwrap()
        .with_init_param(CLASS_NAME_PARAM, "test.Counter")
}

#[test]
fn test_operations_require_init() {
    let manager = ExtensionManager::new();
    assert!(!manager.is_initialized());
    assert!(matches!(
        manager.get_extension_handler_names(),
        Err(ExtensionError::IllegalState(_))
    ));
    assert!(matches!(
        manager.exists(&ext_ref("global/", "A")),
        Err(ExtensionError::IllegalState(_))
    ));
    assert!(matches!(
        manager.install_extension(def("global/", "A", "a.I"), &[]),
        Err(ExtensionError::IllegalState(_))
    ));
}

#[test]
fn test_init_seeds_default_handler() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    assert!(manager.is_initialized());
    assert_eq!(manager.root().unwrap(), dir.path());
    assert_eq!(manager.get_extension_handler_names().unwrap(), vec!["Native"]);

    let handler_ref = HandlerOfHandlers::handler_reference("Native").unwrap();
    let handler_def = manager.get_extension_def(&handler_ref).unwrap();
    assert_eq!(handler_def.init_param(CLASS_NAME_PARAM), Some(NATIVE_HANDLER_CLASS));

    // Second init is a no-op.
    manager
        .init(dir.path(), &ManagerConfig::default(), false)
        .unwrap();
    assert_eq!(manager.get_extension_handler_names().unwrap(), vec!["Native"]);

    let native = manager.prepare_extension_handler("Native").unwrap();
    assert!(native.is_initialized());
    assert!(dir
        .path()
        .join("global/Native/1")
        .join(DEFAULT_CONFIG_FILE)
        .exists());
}

#[test]
fn test_extension_lifecycle_through_manager() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let reference = ext_ref("site/", "Clock");

    let installed = manager
        .install_extension(def("site/", "Clock", "a.IClock"), &[])
        .unwrap();
    assert_eq!(installed.version(), 1);
    assert!(manager.exists(&reference).unwrap());
    assert!(manager.prepare_extension(&reference).is_ok());

    let updated = manager
        .update_extension(def("site/", "Clock", "a.IClock"), &[])
        .unwrap();
    assert_eq!(updated.version(), 2);
    assert!(manager.code_root(&reference).unwrap().ends_with("site/Clock/2"));

    manager.remove_extension(&reference).unwrap();
    assert!(!manager.exists(&reference).unwrap());
    assert!(matches!(
        manager.prepare_extension(&reference),
        Err(ExtensionError::NotFound(_))
    ));
}

#[test]
fn test_unknown_handler_is_not_found() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let reference = ExtensionRef::new("Missing", "global/", "A").unwrap();
    assert!(matches!(
        manager.exists(&reference),
        Err(ExtensionError::NotFound(_))
    ));
}

#[test]
fn test_handler_refs_dispatch_to_handler_of_handlers() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);

    let second = ExtensionDef::new(
        HandlerOfHandlers::handler_reference("Second").unwrap(),
        [HANDLER_INTERFACE],
    )
    .unwrap()
    .with_init_param(CLASS_NAME_PARAM, NATIVE_HANDLER_CLASS);
    manager.install_extension(second, &[]).unwrap();
    assert_eq!(
        manager.get_extension_handler_names().unwrap(),
        vec!["Native", "Second"]
    );

    let reference = ExtensionRef::new("Second", "global/", "Tick").unwrap();
    let tick = ExtensionDef::new(reference.clone(), ["a.ITick"])
        .unwrap()
        .with_init_param(CLASS_NAME_PARAM, "test.Counter");
    manager.install_extension(tick, &[]).unwrap();
    assert!(manager.prepare_extension(&reference).is_ok());

    let handler_ref = HandlerOfHandlers::handler_reference("Second").unwrap();
    assert!(matches!(
        manager.prepare_extension(&handler_ref),
        Err(ExtensionError::Unsupported(_))
    ));

    assert!(manager.stop_extension_handler("Second").unwrap());
    assert!(!manager.stop_extension_handler("Second").unwrap());
    assert!(manager.exists(&reference).unwrap());
}

#[test]
fn test_get_extension_names_filters() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    manager
        .install_extension(def("global/", "Beta", "a.IText"), &[])
        .unwrap();
    manager
        .install_extension(def("site/", "Alpha", "a.IText"), &[])
        .unwrap();
    manager
        .install_extension(def("site/", "Gamma", "a.INumber"), &[])
        .unwrap();

    let names = |h, c, i, e| -> Vec<String> {
        manager
            .get_extension_names(h, c, i, e)
            .unwrap()
            .iter()
            .map(|r| r.extension_name().to_string())
            .collect()
    };

    assert_eq!(
        names(Some("Native"), None, None, None),
        vec!["Alpha", "Beta", "Gamma"]
    );
    assert_eq!(names(None, Some("site/"), None, None), vec!["Alpha", "Gamma"]);
    assert_eq!(names(None, None, Some("%text"), None), vec!["Alpha", "Beta"]);
    assert_eq!(names(Some("Native"), None, None, Some("g%")), vec!["Gamma"]);
    assert_eq!(
        names(Some("ExtensionHandler"), None, None, None),
        vec!["Native"]
    );

    assert!(matches!(
        manager.get_extension_names(None, Some("bad context"), None, None),
        Err(ExtensionError::InvalidReference(_))
    ));
}

#[test]
fn test_listeners_notified_after_changes() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let reference = ext_ref("global/", "Watched");

    let specific = Arc::new(Recorder::default());
    let global = Arc::new(Recorder::default());
    let as_listener = |r: &Arc<Recorder>| -> Arc<dyn ExtensionListener> { Arc::clone(r) as _ };

    manager.register_listener(Some(&reference), as_listener(&specific));
    manager.register_listener(Some(&reference), as_listener(&specific));
    manager.register_listener(None, as_listener(&global));

    manager
        .install_extension(def("global/", "Watched", "a.I"), &[])
        .unwrap();
    manager
        .install_extension(def("global/", "Other", "a.I"), &[])
        .unwrap();
    manager
        .update_extension(def("global/", "Watched", "a.I"), &[])
        .unwrap();
    manager.remove_extension(&reference).unwrap();

    assert_eq!(
        specific.events(),
        vec![
            "added Native/global/Watched",
            "updated Native/global/Watched",
            "removed Native/global/Watched",
        ]
    );
    assert_eq!(global.events().len(), 4);
    assert_eq!(global.events()[1], "added Native/global/Other");
}

#[test]
fn test_failed_change_notifies_nobody() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let global = Arc::new(Recorder::default());
    manager.register_listener(None, global.clone());

    assert!(manager
        .update_extension(def("global/", "Absent", "a.I"), &[])
        .is_err());
    assert!(manager.remove_extension(&ext_ref("global/", "Absent")).is_err());
    assert!(global.events().is_empty());
}

#[test]
fn test_listener_error_does_not_stop_delivery() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let failing = Arc::new(Recorder::failing());
    let healthy = Arc::new(Recorder::default());
    manager.register_listener(None, failing.clone());
    manager.register_listener(None, healthy.clone());

    manager
        .install_extension(def("global/", "A", "a.I"), &[])
        .unwrap();
    assert_eq!(failing.events().len(), 1);
    assert_eq!(healthy.events().len(), 1);
}

#[test]
fn test_unregister_listener() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let recorder = Arc::new(Recorder::default());
    let listener: Arc<dyn ExtensionListener> = recorder.clone();

    manager.register_listener(None, Arc::clone(&listener));
    manager.unregister_listener(None, &listener);
    manager.unregister_listener(Some(&ext_ref("global/", "A")), &listener);

    manager
        .install_extension(def("global/", "A", "a.I"), &[])
        .unwrap();
    assert!(recorder.events().is_empty());
}

#[test]
fn test_server_mode_scans_library_dir() {
    let dir = TempDir::new().unwrap();
    let lib_dir = dir.path().join("lib");
    fs::create_dir_all(&lib_dir).unwrap();
    fs::write(lib_dir.join("libshared.so"), b"").unwrap();
    fs::write(lib_dir.join("notes.txt"), b"").unwrap();

    let manager = ExtensionManager::new();
    manager
        .init(dir.path(), &ManagerConfig::default(), true)
        .unwrap();
    assert_eq!(manager.extra_libraries().len(), 1);
    manager.shutdown();
}

#[test]
fn test_shutdown_and_reinit_keeps_registry() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    manager
        .install_extension(def("global/", "Kept", "a.I"), &[])
        .unwrap();
    let native = manager.prepare_extension_handler("Native").unwrap();

    manager.shutdown();
    assert!(!manager.is_initialized());
    assert!(!native.is_initialized());
    manager.shutdown();

    manager
        .init(dir.path(), &ManagerConfig::default(), false)
        .unwrap();
    assert!(manager.exists(&ext_ref("global/", "Kept")).unwrap());
    assert_eq!(manager.purge_pending_removals().unwrap(), 0);
}
