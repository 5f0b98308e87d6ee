//! Owned XML document model.
//!
//! Configuration documents are small, so they are parsed eagerly into an
//! [`Element`] tree with `quick-xml` and written back out the same way. Only
//! elements, attributes and text survive a round trip; comments and
//! processing instructions are dropped.
//!
//! Every document has a fixed root element, [`ROOT_ELEMENT`]. Sections live
//! directly under it, one element per section name. An optional
//! [`SECTIONS_DECLARATION`] block may also appear there; it is kept as-is and
//! never interpreted.

use std::borrow::Cow;
use std::fmt;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::XmlfigError;

/// Name of the root element of every configuration document.
pub const ROOT_ELEMENT: &str = "configuration";

/// Name of the optional section declaration block under the root.
pub const SECTIONS_DECLARATION: &str = "configSections";

/// One XML element: name, attributes in document order, child elements and
/// concatenated text content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: Option<String>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// First child element called `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// All child elements called `name`, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(child);
    }

    /// Replace the first child with the same name as `child`, or append it.
    pub fn replace_child(&mut self, child: Element) {
        match self.children.iter().position(|c| c.name == child.name) {
            Some(idx) => self.children[idx] = child,
            None => self.children.push(child),
        }
    }

    /// Remove every child called `name`. Returns whether anything was removed.
    pub fn remove_child(&mut self, name: &str) -> bool {
        let before = self.children.len();
        self.children.retain(|c| c.name != name);
        before != self.children.len()
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Parse a standalone element (no XML declaration required).
    pub fn parse(xml: &str) -> Result<Element, XmlfigError> {
        parse_root(xml)
    }

    /// Serialize this element without an XML declaration.
    pub fn to_xml_string(&self) -> Result<String, XmlfigError> {
        let mut writer = Writer::new(Vec::new());
        write_element(&mut writer, self)?;
        into_string(writer.into_inner())
    }
}

/// A configuration document: the root element and everything below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub root: Element,
}

impl Default for Document {
    /// The empty default document, `<configuration></configuration>`.
    fn default() -> Self {
        Self {
            root: Element::new(ROOT_ELEMENT),
        }
    }
}

impl Document {
    pub fn parse(xml: &str) -> Result<Document, XmlfigError> {
        Ok(Document {
            root: parse_root(xml)?,
        })
    }

    /// Whether the root element carries the fixed root name.
    pub fn has_valid_root(&self) -> bool {
        self.root.name == ROOT_ELEMENT
    }

    /// Top-level section element called `name`.
    pub fn section(&self, name: &str) -> Option<&Element> {
        self.root.child(name)
    }

    /// Insert a section element, replacing a previous section of the same name.
    pub fn set_section(&mut self, element: Element) {
        self.root.replace_child(element);
    }

    pub fn remove_section(&mut self, name: &str) -> bool {
        self.root.remove_child(name)
    }

    /// Names of the sections present, excluding the declaration block.
    pub fn section_names(&self) -> Vec<&str> {
        self.root
            .children
            .iter()
            .filter(|c| c.name != SECTIONS_DECLARATION)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Serialize with an XML declaration and two-space indentation.
    pub fn to_xml_string(&self) -> Result<String, XmlfigError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(xml_error)?;
        write_element(&mut writer, &self.root)?;
        into_string(writer.into_inner())
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_xml_string() {
            Ok(s) => f.write_str(&s),
            Err(_) => Err(fmt::Error),
        }
    }
}

fn xml_error(e: impl fmt::Display) -> XmlfigError {
    XmlfigError::Xml {
        reason: e.to_string(),
    }
}

fn into_string(bytes: Vec<u8>) -> Result<String, XmlfigError> {
    String::from_utf8(bytes).map_err(xml_error)
}

fn decode_name(raw: &[u8]) -> Result<String, XmlfigError> {
    std::str::from_utf8(raw).map(str::to_string).map_err(xml_error)
}

fn start_element(start: &BytesStart<'_>) -> Result<Element, XmlfigError> {
    let mut element = Element::new(decode_name(start.name().as_ref())?);
    for attr in start.attributes() {
        let attr = attr.map_err(xml_error)?;
        let key = decode_name(attr.key.as_ref())?;
        let value = attr.unescape_value().map_err(xml_error)?;
        element.attributes.push((key, value.into_owned()));
    }
    Ok(element)
}

fn append_text(element: &mut Element, text: Cow<'_, str>) {
    match &mut element.text {
        Some(existing) => existing.push_str(&text),
        None => element.text = Some(text.into_owned()),
    }
}

/// Whitespace between child elements is indentation, not content.
fn drop_layout_text(element: &mut Element) {
    if !element.children.is_empty()
        && element.text.as_deref().is_some_and(|t| t.trim().is_empty())
    {
        element.text = None;
    }
}

fn parse_root(xml: &str) -> Result<Element, XmlfigError> {
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) => {
                if root.is_some() {
                    return Err(xml_error("content after the root element"));
                }
                stack.push(start_element(&start)?);
            }
            Event::Empty(start) => {
                let element = start_element(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None if root.is_none() => root = Some(element),
                    None => return Err(xml_error("content after the root element")),
                }
            }
            Event::End(_) => {
                let Some(mut done) = stack.pop() else {
                    return Err(xml_error("unbalanced closing tag"));
                };
                drop_layout_text(&mut done);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(done),
                    None => root = Some(done),
                }
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    append_text(current, text.unescape().map_err(xml_error)?);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    let raw = String::from_utf8_lossy(data.as_ref()).into_owned();
                    append_text(current, Cow::Owned(raw));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(xml_error("unexpected end of document"));
    }
    root.ok_or_else(|| xml_error("document has no root element"))
}

fn write_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    element: &Element,
) -> Result<(), XmlfigError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    writer.write_event(Event::Start(start)).map_err(xml_error)?;
    // A text event, even an empty one, keeps the closing tag on the same line.
    let text = element.text.as_deref().unwrap_or("");
    if !text.is_empty() || element.children.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_error)?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(xml_error)?;
    Ok(())
}
