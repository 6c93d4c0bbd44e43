//! XML form of extension definitions.

use extreg_protocols::{
    ExtensionDef, ExtensionError, ExtensionMethod, ExtensionRef, MethodParam, RuntimeParam,
};

use super::Element;

const EXTENSION: &str = "Extension";
const INIT_PARAM: &str = "initParam";
const INTERFACE: &str = "interface";
const RESOURCE: &str = "resource";
const RUNTIME_PARAM: &str = "runtimeParam";
const SUPPLIED_RESOURCES: &str = "suppliedResources";
const SUPPLIED_RESOURCE: &str = "suppliedResource";
const REQUIRED_APPLICATIONS: &str = "requiredApplications";
const REQUIRED_APPLICATION: &str = "requiredApplication";
const METHODS: &str = "Methods";
const METHOD: &str = "PSExtensionMethod";
const METHOD_PARAM: &str = "PSExtensionMethodParam";

/// Converts [`ExtensionDef`] values to and from `Extension` elements.
///
/// The conversion is lossless: every field of a definition, including its
/// declared methods, survives a round trip.
pub struct DefinitionSerializer;

impl DefinitionSerializer {
    /// Name of the element produced by [`DefinitionSerializer::to_element`].
    pub const ELEMENT: &'static str = EXTENSION;

    pub fn to_element(def: &ExtensionDef) -> Element {
        let reference = def.reference();
        let mut root = Element::new(EXTENSION)
            .with_attr("name", reference.extension_name())
            .with_attr("context", reference.context())
            .with_attr("handler", reference.handler_name())
            .with_attr("categorystring", reference.category())
            .with_attr("deprecated", yes_no(def.is_deprecated()))
            .with_attr(
                "restoreRequestParamsOnError",
                yes_no(def.restore_request_params_on_error()),
            );

        for (name, value) in def.init_params() {
            root.push_child(
                Element::new(INIT_PARAM)
                    .with_attr("name", name)
                    .with_text(value),
            );
        }

        for interface in def.interfaces() {
            root.push_child(Element::new(INTERFACE).with_attr("name", interface));
        }

        for resource in def.resources() {
            root.push_child(Element::new(RESOURCE).with_attr("href", resource));
        }

        for param in def.runtime_params() {
            root.push_child(
                Element::new(RUNTIME_PARAM)
                    .with_attr("name", &param.name)
                    .with_attr("type", &param.data_type)
                    .with_attr("description", &param.description),
            );
        }

        if let Some(supplied) = def.supplied_resources() {
            let mut list = Element::new(SUPPLIED_RESOURCES);
            for href in supplied {
                list.push_child(Element::new(SUPPLIED_RESOURCE).with_attr("href", href));
            }
            root.push_child(list);
        }

        if !def.required_applications().is_empty() {
            let mut list = Element::new(REQUIRED_APPLICATIONS);
            for app in def.required_applications() {
                list.push_child(Element::new(REQUIRED_APPLICATION).with_attr("name", app));
            }
            root.push_child(list);
        }

        if !def.methods().is_empty() {
            let mut methods = Element::new(METHODS);
            for method in def.methods().values() {
                let mut element = Element::new(METHOD)
                    .with_attr("name", &method.name)
                    .with_attr("returnType", &method.return_type)
                    .with_attr("description", &method.description);
                for param in &method.params {
                    element.push_child(
                        Element::new(METHOD_PARAM)
                            .with_attr("name", &param.name)
                            .with_attr("type", &param.data_type)
                            .with_attr("description", &param.description),
                    );
                }
                methods.push_child(element);
            }
            root.push_child(methods);
        }

        root
    }

    pub fn from_element(element: &Element) -> Result<ExtensionDef, ExtensionError> {
        if element.name != EXTENSION {
            return Err(invalid(format!(
                "expected <{}> element, found <{}>",
                EXTENSION, element.name
            )));
        }

        let reference = ExtensionRef::new(
            required_attr(element, "handler")?,
            required_attr(element, "context")?,
            required_attr(element, "name")?,
        )?
        .with_category(element.attr("categorystring").unwrap_or_default());

        let interfaces = element
            .children_named(INTERFACE)
            .map(|i| required_attr(i, "name").map(str::to_string))
            .collect::<Result<Vec<_>, _>>()?;
        let mut def = ExtensionDef::new(reference, interfaces)?;

        def.set_deprecated(parse_bool(element.attr("deprecated")));
        def.set_restore_request_params_on_error(parse_bool(
            element.attr("restoreRequestParamsOnError"),
        ));

        for param in element.children_named(INIT_PARAM) {
            def.set_init_param(required_attr(param, "name")?, param.text.as_str());
        }

        for resource in element.children_named(RESOURCE) {
            def.add_resource(required_attr(resource, "href")?)?;
        }

        for param in element.children_named(RUNTIME_PARAM) {
            def.add_runtime_param(
                RuntimeParam::new(required_attr(param, "name")?, required_attr(param, "type")?)
                    .with_description(param.attr("description").unwrap_or_default()),
            );
        }

        if let Some(list) = element.child(SUPPLIED_RESOURCES) {
            let supplied = list
                .children_named(SUPPLIED_RESOURCE)
                .map(|r| required_attr(r, "href").map(str::to_string))
                .collect::<Result<Vec<_>, _>>()?;
            def.set_supplied_resources(Some(supplied));
        }

        if let Some(list) = element.child(REQUIRED_APPLICATIONS) {
            for app in list.children_named(REQUIRED_APPLICATION) {
                def.add_required_application(required_attr(app, "name")?);
            }
        }

        if let Some(methods) = element.child(METHODS) {
            for method in methods.children_named(METHOD) {
                let mut parsed = ExtensionMethod::new(
                    required_attr(method, "name")?,
                    required_attr(method, "returnType")?,
                )
                .with_description(method.attr("description").unwrap_or_default());
                for param in method.children_named(METHOD_PARAM) {
                    parsed = parsed.with_param(
                        MethodParam::new(
                            required_attr(param, "name")?,
                            required_attr(param, "type")?,
                        )
                        .with_description(param.attr("description").unwrap_or_default()),
                    );
                }
                def.add_method(parsed);
            }
        }

        Ok(def)
    }

    pub fn to_xml_string(def: &ExtensionDef) -> Result<String, ExtensionError> {
        Self::to_element(def)
            .to_document()
            .map_err(|e| invalid(e.to_string()))
    }

    pub fn from_xml_str(xml: &str) -> Result<ExtensionDef, ExtensionError> {
        let element = Element::parse(xml).map_err(|e| invalid(e.to_string()))?;
        Self::from_element(&element)
    }
}

fn invalid(message: String) -> ExtensionError {
    ExtensionError::InvalidDefinition(message)
}

fn required_attr<'a>(element: &'a Element, name: &str) -> Result<&'a str, ExtensionError> {
    element.attr(name).ok_or_else(|| {
        invalid(format!(
            "<{}> is missing required attribute '{}'",
            element.name, name
        ))
    })
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn parse_bool(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("yes" | "true" | "1")
    )
}

#[cfg(test)]
#[path = "definition_tests.rs"]
mod tests;
