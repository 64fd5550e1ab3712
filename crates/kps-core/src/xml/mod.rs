//! XML plumbing shared by the negotiator, the envelope builder and the response parser.
//!
//! - [`c14n`]: exclusive canonicalization of signed fragments.
//! - [`XmlDocument`]: an owned element tree with local-name queries, used to read
//!   STS and service responses regardless of the prefixes the server picked.
//! - [`escape`]: text escaping for values interpolated into request templates.

pub mod c14n;

use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;
use thiserror::Error;

pub use c14n::canonicalize;

/// Parse failure in an XML document or fragment.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct XmlError(String);

impl XmlError {
    pub(crate) fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<quick_xml::Error> for XmlError {
    fn from(err: quick_xml::Error) -> Self {
        Self(err.to_string())
    }
}

impl From<AttrError> for XmlError {
    fn from(err: AttrError) -> Self {
        Self(err.to_string())
    }
}

impl From<quick_xml::escape::EscapeError> for XmlError {
    fn from(err: quick_xml::escape::EscapeError) -> Self {
        Self(err.to_string())
    }
}

impl From<std::str::Utf8Error> for XmlError {
    fn from(err: std::str::Utf8Error) -> Self {
        Self(err.to_string())
    }
}

/// Escape a value for use as element text or a quoted attribute value.
pub fn escape(value: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(value)
}

/// Part of a qualified name after the prefix (`wsse:KeyIdentifier` → `KeyIdentifier`).
pub fn local_part(qname: &str) -> &str {
    qname.rsplit_once(':').map_or(qname, |(_, local)| local)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// One element with its attributes (qualified name, unescaped value) and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlNode>,
}

impl XmlElement {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, XmlError> {
        let name = std::str::from_utf8(start.name().as_ref())?.to_string();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    /// Value of the first attribute with this local name, whatever its prefix.
    pub fn attribute(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| local_part(k) == local)
            .map(|(_, v)| v.as_str())
    }

    /// True when the element carries an `xsi:nil="true"` style marker.
    pub fn is_nil(&self) -> bool {
        self.attributes
            .iter()
            .any(|(k, v)| local_part(k) == "nil" && v == "true")
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// All descendant elements in document order, not including `self`.
    pub fn descendants(&self) -> Descendants<'_> {
        let mut stack: Vec<&XmlElement> = self.child_elements().collect();
        stack.reverse();
        Descendants { stack }
    }

    /// Concatenated text of every descendant text node.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                XmlNode::Text(t) => out.push_str(t),
                XmlNode::Element(e) => e.collect_text(out),
            }
        }
    }

    /// Elements matching `path` below this element: the first step may be any
    /// descendant, every further step is a direct child. Steps are local names.
    pub fn find<'a>(&'a self, path: &'a [&'a str]) -> impl Iterator<Item = &'a XmlElement> + 'a {
        select(self.descendants(), path)
    }

    /// Trimmed text of the first non-nil match of `path`, if any.
    pub fn value_at(&self, path: &[&str]) -> Option<String> {
        self.find(path)
            .find(|e| !e.is_nil())
            .map(|e| e.text().trim().to_string())
    }
}

/// Pre-order iterator over descendant elements.
pub struct Descendants<'a> {
    stack: Vec<&'a XmlElement>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a XmlElement;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        let before = self.stack.len();
        self.stack.extend(next.child_elements());
        self.stack[before..].reverse();
        Some(next)
    }
}

fn select<'a, I>(start: I, path: &'a [&'a str]) -> Box<dyn Iterator<Item = &'a XmlElement> + 'a>
where
    I: Iterator<Item = &'a XmlElement> + 'a,
{
    let Some((first, rest)) = path.split_first() else {
        return Box::new(std::iter::empty());
    };
    let mut current: Box<dyn Iterator<Item = &'a XmlElement> + 'a> =
        Box::new(start.filter(move |e| e.local_name() == *first));
    for step in rest {
        current = Box::new(
            current.flat_map(move |e| e.child_elements().filter(move |c| c.local_name() == *step)),
        );
    }
    current
}

/// A parsed response document.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    root: XmlElement,
}

impl XmlDocument {
    pub fn parse(xml: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => stack.push(XmlElement::from_start(&start)?),
                Event::Empty(start) => {
                    let element = XmlElement::from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| XmlError::new("unexpected closing tag"))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    if let Some(parent) = stack.last_mut() {
                        let value = text.unescape()?.into_owned();
                        parent.children.push(XmlNode::Text(value));
                    } else if !text.iter().all(u8::is_ascii_whitespace) {
                        return Err(XmlError::new("text outside the root element"));
                    }
                }
                Event::CData(data) => {
                    let parent = stack
                        .last_mut()
                        .ok_or_else(|| XmlError::new("CDATA outside the root element"))?;
                    let value = std::str::from_utf8(&data.into_inner())?.to_string();
                    parent.children.push(XmlNode::Text(value));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(XmlError::new("unclosed element at end of input"));
        }
        root.map(|root| Self { root })
            .ok_or_else(|| XmlError::new("document has no root element"))
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    /// Like [`XmlElement::find`], but the first step may also match the root itself.
    pub fn find<'a>(&'a self, path: &'a [&'a str]) -> impl Iterator<Item = &'a XmlElement> + 'a {
        select(std::iter::once(&self.root).chain(self.root.descendants()), path)
    }

    /// All elements with this local name anywhere in the document.
    pub fn elements_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        std::iter::once(&self.root)
            .chain(self.root.descendants())
            .filter(move |e| e.local_name() == local)
    }
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), XmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlNode::Element(element));
        Ok(())
    } else if root.is_some() {
        Err(XmlError::new("more than one root element"))
    } else {
        *root = Some(element);
        Ok(())
    }
}
