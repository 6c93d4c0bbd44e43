use super::*;
use tempfile::TempDir;

fn def(context: &str, name: &str) -> ExtensionDef {
    let reference = ExtensionRef::new("Native", context, name).unwrap();
    ExtensionDef::new(reference, ["a.IThing"]).unwrap()
}

#[test]
fn test_add_get_remove() {
    let mut config = HandlerConfiguration::new("Native");
    let first = def("global/", "One");
    let reference = first.reference().clone();

    assert!(!config.is_defined(&reference));
    config.add_definition(first.clone());
    assert!(config.is_defined(&reference));
    assert_eq!(config.get_definition(&reference), Some(&first));

    let replacement = first.clone().with_init_param("k", "v");
    config.add_definition(replacement.clone());
    assert_eq!(config.list_names().len(), 1);
    assert_eq!(config.get_definition(&reference), Some(&replacement));

    assert!(config.remove_definition(&reference).is_some());
    assert!(config.remove_definition(&reference).is_none());
    assert!(config.list_names().is_empty());
}

#[test]
fn test_list_names_in_context() {
    let mut config = HandlerConfiguration::new("Native");
    config.add_definition(def("global/", "One"));
    config.add_definition(def("site/blog/", "Two"));
    config.add_definition(def("site/blog/", "Three"));

    let blog = config.list_names_in("site/blog").unwrap();
    assert_eq!(blog.len(), 2);
    assert!(blog.iter().all(|r| r.context() == "site/blog/"));

    assert!(config.list_names_in("site/other/").unwrap().is_empty());
    assert!(matches!(
        config.list_names_in(""),
        Err(ExtensionError::InvalidReference(_))
    ));
}

#[test]
fn test_pending_removal_idempotent() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("gone");
    let mut config = HandlerConfiguration::new("Native");

    config.set_pending_removal(&target);
    config.set_pending_removal(&target);
    assert_eq!(config.pending_removals().count(), 1);
    assert!(config.is_pending_removal(&target));

    config.clear_pending_removal(&target);
    config.clear_pending_removal(&target);
    assert_eq!(config.pending_removals().count(), 0);
}

#[test]
fn test_store_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("Extensions.xml");

    let mut config = HandlerConfiguration::new("Native");
    config.add_definition(def("global/", "One").with_init_param("className", "x.One"));
    config.add_definition(def("site/", "Two"));
    config.set_pending_removal(&dir.path().join("old"));
    config.store(&path).unwrap();

    assert!(path.exists());
    assert!(!dir.path().join("Extensions_temp.xml").exists());

    let loaded = HandlerConfiguration::load(&path, false, "Native").unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_store_keeps_backup() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("Extensions.xml");

    let mut config = HandlerConfiguration::new("Native");
    config.store(&path).unwrap();
    let first = fs::read_to_string(&path).unwrap();

    config.add_definition(def("global/", "One"));
    config.store(&path).unwrap();

    let backup = fs::read_to_string(dir.path().join("Extensions_bak.xml")).unwrap();
    assert_eq!(backup, first);
    assert_ne!(fs::read_to_string(&path).unwrap(), first);
}

#[test]
fn test_load_missing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("none.xml");

    let config = HandlerConfiguration::load(&path, true, "Native").unwrap();
    assert_eq!(config.handler_name(), "Native");
    assert!(config.list_names().is_empty());

    assert!(matches!(
        HandlerConfiguration::load(&path, false, "Native"),
        Err(ExtensionError::Persistence(_))
    ));
}

#[test]
fn test_load_skips_malformed_extension() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("Extensions.xml");
    fs::write(
        &path,
        r#"<?xml version="1.0"?>
        <PSXExtensionHandlerConfiguration handlerName="Native">
          <pendingRemoval name="/tmp/extreg-old"/>
          <Extension name="Good" context="global/" handler="Native">
            <interface name="a.I"/>
          </Extension>
          <Extension name="NoInterface" context="global/" handler="Native"/>
        </PSXExtensionHandlerConfiguration>"#,
    )
    .unwrap();

    let config = HandlerConfiguration::load(&path, false, "Native").unwrap();
    let names = config.list_names();
    assert_eq!(names.len(), 1);
    assert_eq!(names[0].extension_name(), "Good");
    assert_eq!(config.pending_removals().count(), 1);
}

#[test]
fn test_load_rejects_bad_documents() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("Extensions.xml");

    fs::write(&path, "<Wrong/>").unwrap();
    assert!(HandlerConfiguration::load(&path, false, "Native").is_err());

    fs::write(&path, r#"<PSXExtensionHandlerConfiguration handlerName="1bad"/>"#).unwrap();
    assert!(HandlerConfiguration::load(&path, false, "Native").is_err());

    fs::write(&path, "<PSXExtensionHandlerConfiguration").unwrap();
    assert!(HandlerConfiguration::load(&path, false, "Native").is_err());
}

#[test]
fn test_sibling_names() {
    assert_eq!(
        sibling(Path::new("/a/Extensions.xml"), "_bak"),
        PathBuf::from("/a/Extensions_bak.xml")
    );
    assert_eq!(sibling(Path::new("/a/plain"), "_temp"), PathBuf::from("/a/plain_temp"));
}
