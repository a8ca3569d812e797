//! Entity-safe XML parsing for untrusted documents.
//!
//! Documents are read with quick-xml's streaming reader and folded into a
//! small element tree. The reader never fetches a DTD and never resolves an
//! entity: a `<!DOCTYPE>` block is recorded and skipped, and any reference
//! other than the five predefined XML entities or a character reference is
//! kept as literal text.

pub mod query;

pub use query::{PathQuery, QueryMatch};

use crate::error::{JanusError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::borrow::Cow;
use std::fmt;
use tracing::debug;

/// Parser features that resolve or expand entities. All of them must stay
/// disabled; asking for one fails [`XmlParserBuilder::build`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    ExternalGeneralEntities,
    ExternalParameterEntities,
    LoadExternalDtd,
    ExpandEntityReferences,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::ExternalGeneralEntities => write!(f, "external-general-entities"),
            Feature::ExternalParameterEntities => write!(f, "external-parameter-entities"),
            Feature::LoadExternalDtd => write!(f, "load-external-dtd"),
            Feature::ExpandEntityReferences => write!(f, "expand-entity-references"),
        }
    }
}

const DEFAULT_MAX_DEPTH: usize = 64;
const DEFAULT_MAX_ELEMENTS: usize = 10_000;

/// Builder for [`SafeXmlParser`]
#[derive(Debug, Clone)]
pub struct XmlParserBuilder {
    features: Vec<(Feature, bool)>,
    max_depth: usize,
    max_elements: usize,
}

impl XmlParserBuilder {
    pub fn new() -> Self {
        Self {
            features: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            max_elements: DEFAULT_MAX_ELEMENTS,
        }
    }

    pub fn feature(mut self, feature: Feature, enabled: bool) -> Self {
        self.features.push((feature, enabled));
        self
    }

    /// Maximum element nesting depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Maximum number of elements in one document
    pub fn max_elements(mut self, count: usize) -> Self {
        self.max_elements = count;
        self
    }

    pub fn build(self) -> Result<SafeXmlParser> {
        if let Some((feature, _)) = self.features.iter().find(|(_, enabled)| *enabled) {
            return Err(JanusError::Initialization(format!(
                "feature '{feature}' cannot be enabled: entity resolution is not supported"
            )));
        }
        if self.max_depth == 0 || self.max_elements == 0 {
            return Err(JanusError::Initialization(
                "document limits must be non-zero".to_string(),
            ));
        }
        Ok(SafeXmlParser {
            max_depth: self.max_depth,
            max_elements: self.max_elements,
        })
    }
}

impl Default for XmlParserBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An XML parser that cannot be talked into resolving entities.
///
/// Holds only immutable limits and builds a fresh reader per call, so one
/// instance can be shared between tasks.
#[derive(Debug, Clone)]
pub struct SafeXmlParser {
    max_depth: usize,
    max_elements: usize,
}

impl SafeXmlParser {
    /// Parser with every entity feature explicitly switched off
    pub fn new() -> Result<Self> {
        XmlParserBuilder::new()
            .feature(Feature::ExternalGeneralEntities, false)
            .feature(Feature::ExternalParameterEntities, false)
            .feature(Feature::LoadExternalDtd, false)
            .feature(Feature::ExpandEntityReferences, false)
            .build()
    }

    pub fn builder() -> XmlParserBuilder {
        XmlParserBuilder::new()
    }

    /// Parses `text` into a [`Document`]. Malformed input is a
    /// [`JanusError::Parse`].
    pub fn parse(&self, text: &str) -> Result<Document> {
        let mut reader = Reader::from_str(text);
        let config = reader.config_mut();
        config.trim_text(true);
        config.check_end_names = true;
        config.expand_empty_elements = false;

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        let mut doctype: Option<String> = None;
        let mut elements = 0usize;

        loop {
            let event = reader.read_event().map_err(|e| {
                JanusError::Parse(format!(
                    "malformed XML at byte {}: {e}",
                    reader.buffer_position()
                ))
            })?;

            match event {
                Event::Start(ref start) | Event::Empty(ref start) => {
                    if root.is_some() {
                        return Err(parse_error("content after the root element"));
                    }
                    elements += 1;
                    if elements > self.max_elements {
                        return Err(parse_error("element limit exceeded"));
                    }
                    if stack.len() >= self.max_depth {
                        return Err(parse_error("nesting depth limit exceeded"));
                    }
                    let element = element_from(start)?;
                    if matches!(event, Event::Empty(_)) {
                        attach(&mut stack, &mut root, element);
                    } else {
                        stack.push(element);
                    }
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| parse_error("unbalanced end tag"))?;
                    attach(&mut stack, &mut root, element);
                }
                Event::Text(text) => {
                    let raw = std::str::from_utf8(&text)
                        .map_err(|_| parse_error("text is not valid UTF-8"))?;
                    match stack.last_mut() {
                        Some(parent) => parent.text.push_str(&unescape_predefined(raw)),
                        None if raw.trim().is_empty() => {}
                        None => return Err(parse_error("text outside the root element")),
                    }
                }
                Event::CData(cdata) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.text.push_str(&String::from_utf8_lossy(&cdata));
                    }
                }
                Event::DocType(decl) => {
                    let decl = String::from_utf8_lossy(&decl).into_owned();
                    debug!(
                        "Skipping DOCTYPE ({} bytes, entity declarations: {})",
                        decl.len(),
                        decl.contains("<!ENTITY")
                    );
                    doctype = Some(decl);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(parse_error("unexpected end of document"));
        }
        let root = root.ok_or_else(|| parse_error("document has no root element"))?;
        Ok(Document { root, doctype })
    }
}

fn parse_error(msg: &str) -> JanusError {
    JanusError::Parse(msg.to_string())
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

fn element_from(start: &BytesStart<'_>) -> Result<Element> {
    let name = std::str::from_utf8(start.local_name().as_ref())
        .map_err(|_| parse_error("element name is not valid UTF-8"))?
        .to_string();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| JanusError::Parse(format!("bad attribute in <{name}>: {e}")))?;
        let key = std::str::from_utf8(attr.key.local_name().as_ref())
            .map_err(|_| parse_error("attribute name is not valid UTF-8"))?
            .to_string();
        let raw = std::str::from_utf8(&attr.value)
            .map_err(|_| parse_error("attribute value is not valid UTF-8"))?;
        attributes.push((key, unescape_predefined(raw).into_owned()));
    }

    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

/// Decodes `&amp;`-style predefined entities and character references.
/// Anything else (a declared or unknown entity) is returned untouched.
fn unescape_predefined(raw: &str) -> Cow<'_, str> {
    quick_xml::escape::unescape(raw).unwrap_or(Cow::Borrowed(raw))
}

/// A parsed document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub root: Element,
    /// Raw DOCTYPE declaration, if the document carried one. Never processed.
    pub doctype: Option<String>,
}

impl Document {
    /// Evaluates `query` against this document
    pub fn select<'a>(&'a self, query: &PathQuery) -> Vec<QueryMatch<'a>> {
        query.evaluate(self)
    }
}

/// An element with its attributes and children. Names are local names
/// (namespace prefixes dropped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// Attributes in document order
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    /// Concatenated character data directly inside this element
    pub text: String,
}

impl Element {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First child with the given local name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }
}

impl fmt::Display for Element {
    /// Serializes back to XML, self-closing when empty
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.name)?;
        for (key, value) in &self.attributes {
            write!(f, " {key}=\"{}\"", quick_xml::escape::escape(value.as_str()))?;
        }
        if self.children.is_empty() && self.text.is_empty() {
            return write!(f, "/>");
        }
        write!(f, ">")?;
        write!(f, "{}", quick_xml::escape::escape(self.text.as_str()))?;
        for child in &self.children {
            write!(f, "{child}")?;
        }
        write!(f, "</{}>", self.name)
    }
}
