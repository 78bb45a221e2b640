pub mod builder;

use crate::error::{Result, WanoError};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::escape::unescape;
use quick_xml::reader::Reader;
use quick_xml::Writer;
use std::fs;
use std::io::Cursor;
use std::path::Path;

/// One XML element of a WaNo template.
///
/// Blank text and comments are dropped while parsing, so `text` is either
/// non-blank content (kept verbatim) or `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Like [`Element::attr`] but a missing attribute is a template error.
    pub fn required_attr(&self, key: &str) -> Result<&str> {
        self.attr(key).ok_or_else(|| WanoError::MissingAttribute {
            tag: self.tag.clone(),
            attribute: key.to_string(),
        })
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, key: &str) {
        self.attributes.retain(|(k, _)| k != key);
    }

    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn child(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.tag == tag)
    }

    pub fn child_mut(&mut self, tag: &str) -> Option<&mut Element> {
        self.children.iter_mut().find(|c| c.tag == tag)
    }

    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// Depth-first search for the first element with `tag`, including `self`.
    pub fn find(&self, tag: &str) -> Option<&Element> {
        if self.tag == tag {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(tag))
    }

    pub fn find_mut(&mut self, tag: &str) -> Option<&mut Element> {
        if self.tag == tag {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(tag))
    }

    pub fn parse_file(path: &Path) -> Result<Element> {
        let xml = fs::read_to_string(path).map_err(|e| WanoError::io(path, e))?;
        Self::parse_str(&xml)
    }

    /// Parses a document and returns its root element.
    pub fn parse_str(xml: &str) -> Result<Element> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    return Err(WanoError::Xml(format!(
                        "at position {}: {}",
                        reader.buffer_position(),
                        e
                    )));
                }
            };

            match event {
                Event::Start(e) => stack.push(element_from_start(&e)?),
                Event::Empty(e) => {
                    let element = element_from_start(&e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let mut element = stack
                        .pop()
                        .ok_or_else(|| WanoError::Xml("unbalanced closing tag".to_string()))?;
                    element.text = element.text.take().filter(|t| !t.trim().is_empty());
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(t) => {
                    let raw = String::from_utf8_lossy(&t);
                    let text = unescape(&raw).map_err(WanoError::xml)?;
                    push_text(&mut stack, &text);
                }
                Event::CData(c) => {
                    push_text(&mut stack, &String::from_utf8_lossy(&c));
                }
                Event::GeneralRef(r) => {
                    let entity = format!("&{};", String::from_utf8_lossy(&r));
                    let text = unescape(&entity).map_err(WanoError::xml)?;
                    push_text(&mut stack, &text);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(WanoError::Xml(format!(
                "unclosed element <{}>",
                stack.last().map(|e| e.tag.as_str()).unwrap_or_default()
            )));
        }
        root.ok_or_else(|| WanoError::Xml("document has no root element".to_string()))
    }

    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(WanoError::xml)?;
        self.write_into(&mut writer)?;
        let bytes = writer.into_inner().into_inner();
        String::from_utf8(bytes).map_err(WanoError::xml)
    }

    fn write_into<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new(self.tag.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.text.is_none() && self.children.is_empty() {
            return writer
                .write_event(Event::Empty(start))
                .map(|_| ())
                .map_err(WanoError::xml);
        }

        writer.write_event(Event::Start(start)).map_err(WanoError::xml)?;
        if let Some(text) = &self.text {
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(WanoError::xml)?;
        }
        for child in &self.children {
            child.write_into(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.tag.as_str())))
            .map(|_| ())
            .map_err(WanoError::xml)
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element> {
    let mut element = Element::new(&String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(WanoError::xml)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let raw = String::from_utf8_lossy(&attr.value);
        let value = unescape(&raw).map_err(WanoError::xml)?;
        element.attributes.push((key, value.into_owned()));
    }
    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(WanoError::Xml("multiple root elements".to_string())),
    }
    Ok(())
}

fn push_text(stack: &mut [Element], text: &str) {
    if let Some(top) = stack.last_mut() {
        top.text.get_or_insert_with(String::new).push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strips_blank_text_and_comments() {
        let xml = r#"
            <WaNoTemplate>
                <!-- comment -->
                <WaNoRoot name="root">
                    <WaNoFloat name="Lx">  25.0 </WaNoFloat>
                </WaNoRoot>
            </WaNoTemplate>
        "#;
        let doc = Element::parse_str(xml).expect("parse failed");
        assert_eq!(doc.tag, "WaNoTemplate");
        assert_eq!(doc.text, None);
        assert_eq!(doc.children.len(), 1);

        let root = doc.child("WaNoRoot").unwrap();
        assert_eq!(root.attr("name"), Some("root"));
        // Content is kept verbatim; leaves decide how to trim it.
        assert_eq!(root.children[0].text.as_deref(), Some("  25.0 "));
    }

    #[test]
    fn test_entities_are_resolved() {
        let doc = Element::parse_str(r#"<a t="x &amp; y">1 &lt; 2</a>"#).unwrap();
        assert_eq!(doc.attr("t"), Some("x & y"));
        assert_eq!(doc.text.as_deref(), Some("1 < 2"));
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        assert!(matches!(
            Element::parse_str("<a><b></a>"),
            Err(WanoError::Xml(_))
        ));
    }

    #[test]
    fn test_write_and_reparse() {
        let doc = Element::new("WaNoTemplate").with_child(
            Element::new("WaNoRoot")
                .with_attr("name", "root")
                .with_child(Element::new("WaNoString").with_attr("name", "s").with_text("a < b")),
        );
        let xml = doc.to_xml_string().unwrap();
        assert_eq!(Element::parse_str(&xml).unwrap(), doc);
    }
}
