//! Minimal XML element tree used for persisted definitions and handler
//! configuration files.
//!
//! Whitespace-only text between child elements is dropped; text of leaf
//! elements is kept exactly as written.

use quick_xml::events::{BytesDecl, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

mod definition;

pub use definition::DefinitionSerializer;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML syntax error: {0}")]
    Syntax(String),

    #[error("XML document has no root element")]
    NoRoot,

    #[error("XML write error: {0}")]
    Write(String),
}

/// One XML element with its attributes, children and text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Set an attribute, replacing an existing one of the same name.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(child);
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// First child with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Parse a document and return its root element.
    pub fn parse(xml: &str) -> Result<Element, XmlError> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => stack.push(Self::from_start(&start)?),
                Ok(Event::Empty(start)) => {
                    let element = Self::from_start(&start)?;
                    Self::attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::End(_)) => {
                    let mut element = stack
                        .pop()
                        .ok_or_else(|| XmlError::Syntax("unbalanced end tag".to_string()))?;
                    if !element.children.is_empty() && element.text.trim().is_empty() {
                        element.text.clear();
                    }
                    Self::attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(text)) => {
                    if let Some(top) = stack.last_mut() {
                        let text = text
                            .unescape()
                            .map_err(|e| XmlError::Syntax(e.to_string()))?;
                        top.text.push_str(&text);
                    }
                }
                Ok(Event::CData(data)) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(XmlError::Syntax(format!(
                        "at position {}: {}",
                        reader.error_position(),
                        e
                    )));
                }
            }
        }

        if !stack.is_empty() {
            return Err(XmlError::Syntax("unclosed element".to_string()));
        }
        root.ok_or(XmlError::NoRoot)
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Element, XmlError> {
        let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()));
        for attr in start.attributes() {
            let attr = attr.map_err(|e| XmlError::Syntax(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| XmlError::Syntax(e.to_string()))?
                .into_owned();
            element.attributes.push((key, value));
        }
        Ok(element)
    }

    fn attach(
        stack: &mut [Element],
        root: &mut Option<Element>,
        element: Element,
    ) -> Result<(), XmlError> {
        match stack.last_mut() {
            Some(parent) => parent.children.push(element),
            None if root.is_none() => *root = Some(element),
            None => {
                return Err(XmlError::Syntax(
                    "document has more than one root element".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Serialize as an indented document with an XML declaration.
    pub fn to_document(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(write_err)?;
        self.write_to(&mut writer)?;

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        String::from_utf8(bytes).map_err(write_err)
    }

    fn write_to(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), XmlError> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() && self.text.is_empty() {
            return writer.write_event(Event::Empty(start)).map_err(write_err);
        }

        writer
            .write_event(Event::Start(start.borrow()))
            .map_err(write_err)?;
        if !self.text.is_empty() {
            writer
                .write_event(Event::Text(BytesText::new(&self.text)))
                .map_err(write_err)?;
        }
        for child in &self.children {
            child.write_to(writer)?;
        }
        writer
            .write_event(Event::End(start.to_end()))
            .map_err(write_err)
    }
}

fn write_err(e: impl std::fmt::Display) -> XmlError {
    XmlError::Write(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested() {
        let xml = r#"<?xml version="1.0"?>
            <root a="1">
              <child name="x">value</child>
              <child name="y"/>
              <!-- comment -->
            </root>"#;
        let root = Element::parse(xml).unwrap();
        assert_eq!(root.name, "root");
        assert_eq!(root.attr("a"), Some("1"));
        assert!(root.text.is_empty());

        let children: Vec<_> = root.children_named("child").collect();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].text, "value");
        assert_eq!(children[1].attr("name"), Some("y"));
    }

    #[test]
    fn test_leaf_text_whitespace_preserved() {
        let root = Element::parse("<p>  spaced  </p>").unwrap();
        assert_eq!(root.text, "  spaced  ");
    }

    #[test]
    fn test_escaping_round_trip() {
        let original = Element::new("root")
            .with_attr("q", "a \"quoted\" <value> & more")
            .with_child(Element::new("leaf").with_text("1 < 2 && 3 > 2"));

        let doc = original.to_document().unwrap();
        assert!(doc.starts_with("<?xml"));
        let parsed = Element::parse(&doc).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_set_attr_replaces() {
        let mut element = Element::new("e").with_attr("k", "1");
        element.set_attr("k", "2");
        assert_eq!(element.attributes.len(), 1);
        assert_eq!(element.attr("k"), Some("2"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(Element::parse(""), Err(XmlError::NoRoot)));
        assert!(Element::parse("<a><b></a>").is_err());
        assert!(Element::parse("<a>").is_err());
        assert!(Element::parse("<a/><b/>").is_err());
    }

    #[test]
    fn test_cdata_text() {
        let root = Element::parse("<a><![CDATA[<raw>]]></a>").unwrap();
        assert_eq!(root.text, "<raw>");
    }
}
