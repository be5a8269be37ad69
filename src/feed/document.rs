use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;
use thiserror::Error;

/// Errors that can occur while parsing or serializing a feed document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// XML parsing failed.
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// An attribute could not be decoded.
    #[error("attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    /// Tag or attribute name is not valid UTF-8.
    #[error("utf8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// The document is structurally invalid (no root, multiple roots,
    /// unbalanced tags, text outside the root).
    #[error("unexpected structure: {0}")]
    Structure(String),

    /// I/O failure while writing serialized output.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single XML element: name, ordered attributes, optional text content,
/// ordered children. Attribute order and sibling order are preserved from
/// the parsed input through serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut element = Self::new(name);
        element.text = Some(text.into());
        element
    }

    /// Value of the named attribute, if present.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Sets an attribute, replacing an existing value or appending a new
    /// attribute while keeping the original attribute order.
    pub fn set_attr(&mut self, key: &str, value: &str) {
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attributes.push((key.to_string(), value.to_string())),
        }
    }

    /// First direct child with the given tag name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Text content of the first direct child with the given tag name.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(|child| child.text.as_deref())
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(child);
    }

    /// Keeps only the direct children for which the predicate holds,
    /// preserving sibling order.
    pub fn retain_children<F>(&mut self, f: F)
    where
        F: FnMut(&Element) -> bool,
    {
        self.children.retain(f);
    }

    /// Visits every descendant with the given tag name, depth-first in
    /// document order, and returns the number of elements visited.
    /// Matching elements are not descended into.
    pub fn for_each_descendant_mut<F>(&mut self, name: &str, f: &mut F) -> usize
    where
        F: FnMut(&mut Element),
    {
        let mut count = 0;
        for child in &mut self.children {
            if child.name == name {
                f(child);
                count += 1;
            } else {
                count += child.for_each_descendant_mut(name, f);
            }
        }
        count
    }

    /// First descendant with the given tag name, depth-first in document
    /// order.
    pub fn descendant_mut(&mut self, name: &str) -> Option<&mut Element> {
        for child in &mut self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.descendant_mut(name) {
                return Some(found);
            }
        }
        None
    }

    /// All descendants with the given tag name, depth-first in document
    /// order. Matching elements are not descended into.
    pub fn descendants(&self, name: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        self.collect_descendants(name, &mut found);
        found
    }

    fn collect_descendants<'a>(&'a self, name: &str, found: &mut Vec<&'a Element>) {
        for child in &self.children {
            if child.name == name {
                found.push(child);
            } else {
                child.collect_descendants(name, found);
            }
        }
    }
}

/// A parsed feed document: a single root element and everything under it.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub root: Element,
}

impl Document {
    /// Parses an XML string into an element tree.
    ///
    /// Whitespace-only text and CDATA nodes are indentation noise and are
    /// dropped; non-whitespace text is attached (trimmed) to the enclosing
    /// element. Comments, processing instructions, and the XML declaration
    /// are not preserved.
    ///
    /// Entity declarations are never expanded: the pinned quick-xml version
    /// resolves only the five XML builtins, so crafted feeds cannot smuggle
    /// external content in through a DOCTYPE.
    pub fn parse(xml: &str) -> Result<Self, DocumentError> {
        let mut reader = Reader::from_str(xml);
        let mut buf = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    let element = element_from_start(&e, &reader)?;
                    stack.push(element);
                }
                Event::Empty(e) => {
                    let element = element_from_start(&e, &reader)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(|| {
                        DocumentError::Structure("end tag without matching start".into())
                    })?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(t) => {
                    let text = t.unescape()?;
                    append_text(&mut stack, text.trim())?;
                }
                Event::CData(t) => {
                    let bytes = t.into_inner();
                    let text = std::str::from_utf8(&bytes)?.to_string();
                    append_text(&mut stack, text.trim())?;
                }
                Event::Eof => break,
                // Declaration, comments, PIs, DOCTYPE: not part of the tree
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(DocumentError::Structure(format!(
                "unclosed element <{}>",
                stack[stack.len() - 1].name
            )));
        }
        let root =
            root.ok_or_else(|| DocumentError::Structure("document has no root element".into()))?;
        Ok(Self { root })
    }

    /// Serializes the tree back to XML with a declaration and 2-space
    /// indentation. Childless, textless elements become self-closing tags;
    /// escaping is handled by the writer. Output round-trips through
    /// [`Document::parse`].
    pub fn to_xml(&self) -> Result<String, DocumentError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        write_element(&mut writer, &self.root)?;
        let bytes = writer.into_inner().into_inner();
        String::from_utf8(bytes).map_err(|e| DocumentError::Utf8(e.utf8_error()))
    }
}

fn element_from_start(
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<Element, DocumentError> {
    let name = std::str::from_utf8(e.name().as_ref())?.to_string();
    let mut element = Element::new(name);
    let decoder = reader.decoder();
    for attr_result in e.attributes() {
        let attr = attr_result?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let value = attr.decode_and_unescape_value(decoder)?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), DocumentError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
    } else if root.is_none() {
        *root = Some(element);
    } else {
        return Err(DocumentError::Structure(format!(
            "second root element <{}>",
            element.name
        )));
    }
    Ok(())
}

fn append_text(stack: &mut [Element], text: &str) -> Result<(), DocumentError> {
    if text.is_empty() {
        return Ok(());
    }
    let parent = stack
        .last_mut()
        .ok_or_else(|| DocumentError::Structure("text outside of root element".into()))?;
    match &mut parent.text {
        Some(existing) => existing.push_str(text),
        None => parent.text = Some(text.to_string()),
    }
    Ok(())
}

fn write_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    element: &Element,
) -> Result<(), DocumentError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.text.is_none() && element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    if let Some(text) = &element.text {
        writer.write_event(Event::Text(BytesText::new(text)))?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}
