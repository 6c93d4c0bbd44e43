use super::*;
use extreg_protocols::CLASS_NAME_PARAM;

fn full_definition() -> ExtensionDef {
    let reference = ExtensionRef::new("Native", "site/blog/", "Comments")
        .unwrap()
        .with_category("social");

    let mut def = ExtensionDef::new(reference, ["blog.IComments", "extreg.IScriptable"])
        .unwrap()
        .with_init_param(CLASS_NAME_PARAM, "blog.CommentsImpl")
        .with_init_param("greeting", "  hello & <welcome>  ")
        .with_resource("lib/comments.so")
        .unwrap()
        .with_resource("templates")
        .unwrap()
        .with_runtime_param(RuntimeParam::new("limit", "int").with_description("page size"))
        .with_method(
            ExtensionMethod::new("list", "array")
                .with_description("List comments")
                .with_param(MethodParam::new("post", "string").with_description("post id"))
                .with_param(MethodParam::new("limit", "int")),
        );
    def.set_version(3);
    def.set_deprecated(true);
    def.set_restore_request_params_on_error(true);
    def.add_required_application("blog");
    def.set_supplied_resources(Some(vec![
        "lib/comments.so".to_string(),
        "templates/list.html".to_string(),
    ]));
    def
}

#[test]
fn test_round_trip_every_field() {
    let def = full_definition();
    let xml = DefinitionSerializer::to_xml_string(&def).unwrap();
    let parsed = DefinitionSerializer::from_xml_str(&xml).unwrap();

    assert_eq!(parsed, def);
    assert_eq!(parsed.reference().category(), "social");
    assert_eq!(parsed.version(), 3);
    assert_eq!(parsed.init_param("greeting"), Some("  hello & <welcome>  "));
    assert_eq!(parsed.method("list").unwrap().params.len(), 2);
}

#[test]
fn test_minimal_definition_omits_optional_sections() {
    let reference = ExtensionRef::new("Native", "global/", "Plain").unwrap();
    let def = ExtensionDef::new(reference, ["a.IPlain"]).unwrap();

    let element = DefinitionSerializer::to_element(&def);
    assert!(element.child("suppliedResources").is_none());
    assert!(element.child("requiredApplications").is_none());
    assert!(element.child("Methods").is_none());
    assert_eq!(element.attr("deprecated"), Some("no"));

    let parsed = DefinitionSerializer::from_element(&element).unwrap();
    assert_eq!(parsed.supplied_resources(), None);
    assert_eq!(parsed, def);
}

#[test]
fn test_empty_supplied_resources_distinct_from_absent() {
    let reference = ExtensionRef::new("Native", "global/", "Empty").unwrap();
    let mut def = ExtensionDef::new(reference, ["a.IEmpty"]).unwrap();
    def.set_supplied_resources(Some(Vec::new()));

    let parsed = DefinitionSerializer::from_element(&DefinitionSerializer::to_element(&def)).unwrap();
    assert_eq!(parsed.supplied_resources(), Some(&[][..]));
}

#[test]
fn test_boolean_attribute_spellings() {
    for (value, expected) in [("yes", true), ("TRUE", true), ("1", true), ("no", false), ("x", false)] {
        let xml = format!(
            r#"<Extension name="E" context="global/" handler="Native" deprecated="{}">
                 <interface name="a.I"/>
               </Extension>"#,
            value
        );
        let def = DefinitionSerializer::from_xml_str(&xml).unwrap();
        assert_eq!(def.is_deprecated(), expected, "{}", value);
    }
}

#[test]
fn test_missing_interface_rejected() {
    let xml = r#"<Extension name="E" context="global/" handler="Native"/>"#;
    let err = DefinitionSerializer::from_xml_str(xml).unwrap_err();
    assert!(matches!(err, ExtensionError::InvalidDefinition(_)));
}

#[test]
fn test_missing_attribute_rejected() {
    let xml = r#"<Extension name="E" context="global/"><interface name="a.I"/></Extension>"#;
    let err = DefinitionSerializer::from_xml_str(xml).unwrap_err();
    assert!(matches!(err, ExtensionError::InvalidDefinition(_)));
    assert!(err.to_string().contains("handler"));
}

#[test]
fn test_invalid_reference_rejected() {
    let xml = r#"<Extension name="9bad" context="global/" handler="Native">
                   <interface name="a.I"/>
                 </Extension>"#;
    let err = DefinitionSerializer::from_xml_str(xml).unwrap_err();
    assert!(matches!(err, ExtensionError::InvalidReference(_)));
}

#[test]
fn test_wrong_root_and_bad_xml() {
    assert!(matches!(
        DefinitionSerializer::from_xml_str("<Other/>"),
        Err(ExtensionError::InvalidDefinition(_))
    ));
    assert!(matches!(
        DefinitionSerializer::from_xml_str("<Extension"),
        Err(ExtensionError::InvalidDefinition(_))
    ));
}

#[test]
fn test_unsafe_resource_rejected_on_parse() {
    let xml = r#"<Extension name="E" context="global/" handler="Native">
                   <interface name="a.I"/>
                   <resource href="../escape"/>
                 </Extension>"#;
    assert!(DefinitionSerializer::from_xml_str(xml).is_err());
}
