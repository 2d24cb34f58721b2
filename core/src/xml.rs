//! XML reading and writing for request and response bodies.
//!
//! # Design
//! Response bodies are parsed into a small owned `Element` tree; resource
//! types implement `FromXml` by looking up children by name. Request bodies
//! are written through `XmlWriter`, whose helpers carry the shared field
//! rules so resource types only list which fields to emit:
//!
//! - `string` omits empty strings.
//! - `nullable` omits null values (see `crate::null`).
//! - `Element::href_segment` / `href_id` project an `href` attribute to the
//!   trailing path segment of its URL.
//! - `Element::list` flattens `<wrapper><item/>...</wrapper>` into a `Vec`.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{Error, Result};
use crate::null::{NullValue, Nullable};

/// Types that can write themselves as an XML element.
pub trait ToXml {
    fn to_xml(&self, writer: &mut XmlWriter) -> Result<()>;
}

/// Types that can be decoded from a parsed element.
pub trait FromXml: Sized {
    fn from_xml(element: &Element) -> Result<Self>;
}

/// Serialize a value as a standalone document with an XML declaration.
pub fn to_document<T: ToXml + ?Sized>(value: &T) -> Result<String> {
    let mut writer = XmlWriter::new();
    writer.declaration()?;
    value.to_xml(&mut writer)?;
    String::from_utf8(writer.into_bytes()).map_err(|e| Error::Encode(e.to_string()))
}

/// An owned XML element with its attributes, text and child elements.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    /// Parse a document and return its root element.
    ///
    /// An empty or whitespace-only body yields `Ok(None)`.
    pub fn parse(input: &[u8]) -> Result<Option<Element>> {
        let text = std::str::from_utf8(input).map_err(decode_error)?;
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        loop {
            match reader.read_event().map_err(decode_error)? {
                Event::Start(start) => stack.push(Element::open(&start)?),
                Event::Empty(start) => {
                    let element = Element::open(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| Error::Decode("unbalanced end tag".to_string()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text.unescape().map_err(decode_error)?);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(Error::Decode(format!("unexpected end of document inside <{}>", open.name)));
        }
        Ok(root)
    }

    fn open(start: &BytesStart<'_>) -> Result<Element> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(decode_error)?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value().map_err(decode_error)?.into_owned();
            attributes.push((key, value));
        }
        Ok(Element {
            name,
            attributes,
            ..Element::default()
        })
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether the element carries the `nil` marker attribute.
    pub fn is_nil(&self) -> bool {
        self.attr("nil").is_some()
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Text of a child element; absent and nil children read as empty.
    pub fn child_text(&self, name: &str) -> String {
        match self.child(name) {
            Some(child) if !child.is_nil() => child.text.clone(),
            _ => String::new(),
        }
    }

    pub fn nullable<T: NullValue + Default>(&self, name: &str) -> Result<Nullable<T>> {
        Nullable::from_element(self.child(name))
    }

    /// Decode a required child element.
    pub fn decode_child<T: FromXml>(&self, name: &str) -> Result<T> {
        let child = self
            .child(name)
            .ok_or_else(|| Error::Decode(format!("<{}> is missing <{name}>", self.name)))?;
        T::from_xml(child)
    }

    /// Decode every child of the `wrapper` child element.
    pub fn list<T: FromXml>(&self, wrapper: &str) -> Result<Vec<T>> {
        match self.child(wrapper) {
            Some(wrapper) => wrapper.items(),
            None => Ok(Vec::new()),
        }
    }

    /// Decode every child of this element.
    pub fn items<T: FromXml>(&self) -> Result<Vec<T>> {
        self.children.iter().map(T::from_xml).collect()
    }

    /// Trailing path segment of the `href` attribute on a child element.
    pub fn href_segment(&self, name: &str) -> Option<String> {
        self.child(name)
            .and_then(|child| child.attr("href"))
            .map(trailing_segment)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
    }

    /// Like `href_segment`, for resources addressed by integer id.
    pub fn href_id(&self, name: &str) -> Result<Option<i64>> {
        self.href_segment(name)
            .map(|segment| {
                segment
                    .parse()
                    .map_err(|e| Error::Decode(format!("<{name}> href id {segment:?}: {e}")))
            })
            .transpose()
    }
}

/// Last non-empty path segment of a URL, ignoring any query or fragment.
///
/// `https://a.recurly.com/v2/accounts/abc?x=1` yields `abc`.
pub fn trailing_segment(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    path.trim_end_matches('/').rsplit('/').next().unwrap_or_default()
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(Error::Decode("document has more than one root element".to_string())),
    }
    Ok(())
}

fn decode_error(err: impl std::fmt::Display) -> Error {
    Error::Decode(err.to_string())
}

/// Streaming writer for request bodies.
pub struct XmlWriter {
    inner: Writer<Vec<u8>>,
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlWriter {
    pub fn new() -> Self {
        Self {
            inner: Writer::new(Vec::new()),
        }
    }

    fn write(&mut self, event: Event<'_>) -> Result<()> {
        self.inner
            .write_event(event)
            .map_err(|e| Error::Encode(e.to_string()))
    }

    pub fn declaration(&mut self) -> Result<()> {
        self.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
    }

    pub fn start(&mut self, name: &str) -> Result<()> {
        self.write(Event::Start(BytesStart::new(name)))
    }

    pub fn start_with_attributes(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let start = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.write(Event::Start(start))
    }

    pub fn end(&mut self, name: &str) -> Result<()> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    /// Write `<name>text</name>` unconditionally.
    pub fn element(&mut self, name: &str, text: &str) -> Result<()> {
        self.start(name)?;
        self.write(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    /// Write `<name>text</name>` unless `text` is empty.
    pub fn string(&mut self, name: &str, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.element(name, text)
    }

    /// Write the value's literal, or nothing when null.
    pub fn nullable<T: NullValue>(&mut self, name: &str, value: &Nullable<T>) -> Result<()> {
        match value.literal() {
            Some(literal) => self.element(name, &literal),
            None => Ok(()),
        }
    }

    /// Write `<wrapper>` around each item, omitting the wrapper when empty.
    pub fn list<T: ToXml>(&mut self, wrapper: &str, items: &[T]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        self.start(wrapper)?;
        for item in items {
            item.to_xml(self)?;
        }
        self.end(wrapper)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::null::NullBool;

    #[derive(Debug, PartialEq)]
    struct Plan {
        code: String,
        trial: NullBool,
    }

    impl FromXml for Plan {
        fn from_xml(element: &Element) -> Result<Self> {
            Ok(Plan {
                code: element.child_text("plan_code"),
                trial: element.nullable("trial")?,
            })
        }
    }

    impl ToXml for Plan {
        fn to_xml(&self, writer: &mut XmlWriter) -> Result<()> {
            writer.start("plan")?;
            writer.string("plan_code", &self.code)?;
            writer.nullable("trial", &self.trial)?;
            writer.end("plan")
        }
    }

    fn parse(xml: &str) -> Element {
        Element::parse(xml.as_bytes()).unwrap().unwrap()
    }

    #[test]
    fn parses_nested_elements_and_attributes() {
        let root = parse(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <account href="https://x.recurly.com/v2/accounts/a1">
              <account_code>a1</account_code>
              <email>a&amp;b@example.com</email>
              <closed_at nil="nil"></closed_at>
            </account>"#,
        );
        assert_eq!(root.name, "account");
        assert_eq!(root.attr("href"), Some("https://x.recurly.com/v2/accounts/a1"));
        assert_eq!(root.child_text("account_code"), "a1");
        assert_eq!(root.child_text("email"), "a&b@example.com");
        assert!(root.child("closed_at").unwrap().is_nil());
        assert_eq!(root.child_text("closed_at"), "");
        assert_eq!(root.child_text("missing"), "");
    }

    #[test]
    fn empty_body_has_no_root() {
        assert_eq!(Element::parse(b"").unwrap(), None);
        assert_eq!(Element::parse(b"  \n ").unwrap(), None);
    }

    #[test]
    fn malformed_documents_are_decode_errors() {
        assert!(matches!(Element::parse(b"<a><b></a>"), Err(Error::Decode(_))));
        assert!(matches!(Element::parse(b"<a>"), Err(Error::Decode(_))));
        assert!(matches!(Element::parse(b"<a/><b/>"), Err(Error::Decode(_))));
    }

    #[test]
    fn cdata_is_text() {
        let root = parse("<note><![CDATA[<b>bold</b>]]></note>");
        assert_eq!(root.text, "<b>bold</b>");
    }

    #[test]
    fn list_flattens_wrapper() {
        let root = parse(
            "<response><plans><plan><plan_code>gold</plan_code></plan>\
             <plan><plan_code>silver</plan_code><trial>false</trial></plan></plans></response>",
        );
        let plans: Vec<Plan> = root.list("plans").unwrap();
        assert_eq!(
            plans,
            vec![
                Plan { code: "gold".to_string(), trial: NullBool::null() },
                Plan { code: "silver".to_string(), trial: NullBool::new(false) },
            ]
        );
        let none: Vec<Plan> = root.list("add_ons").unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn href_projection() {
        let root = parse(
            r#"<transaction><account href="https://x.recurly.com/v2/accounts/abc-1"/>
               <invoice href="https://x.recurly.com/v2/invoices/1108/"/>
               <subscription href=""/></transaction>"#,
        );
        assert_eq!(root.href_segment("account").as_deref(), Some("abc-1"));
        assert_eq!(root.href_id("invoice").unwrap(), Some(1108));
        assert_eq!(root.href_segment("subscription"), None);
        assert_eq!(root.href_segment("missing"), None);
        assert_eq!(root.href_id("account").ok(), None);
    }

    #[test]
    fn trailing_segment_ignores_query() {
        assert_eq!(trailing_segment("https://x.recurly.com/v2/accounts/abc?cursor=1"), "abc");
        assert_eq!(trailing_segment("abc"), "abc");
        assert_eq!(trailing_segment(""), "");
    }

    #[test]
    fn writer_omits_empty_and_null_fields() {
        let plan = Plan { code: String::new(), trial: NullBool::null() };
        assert_eq!(to_document(&plan).unwrap(), r#"<?xml version="1.0" encoding="UTF-8"?><plan></plan>"#);

        let plan = Plan { code: "gold & co".to_string(), trial: NullBool::new(false) };
        assert_eq!(
            to_document(&plan).unwrap(),
            r#"<?xml version="1.0" encoding="UTF-8"?><plan><plan_code>gold &amp; co</plan_code><trial>false</trial></plan>"#
        );
    }

    #[test]
    fn writer_lists() {
        let mut writer = XmlWriter::new();
        writer.list::<Plan>("plans", &[]).unwrap();
        assert!(writer.into_bytes().is_empty());

        let mut writer = XmlWriter::new();
        writer
            .list("plans", &[Plan { code: "a".to_string(), trial: NullBool::null() }])
            .unwrap();
        assert_eq!(
            String::from_utf8(writer.into_bytes()).unwrap(),
            "<plans><plan><plan_code>a</plan_code></plan></plans>"
        );
    }

    #[test]
    fn written_documents_parse_back() {
        let plan = Plan { code: "gold".to_string(), trial: NullBool::new(true) };
        let root = parse(&to_document(&plan).unwrap());
        assert_eq!(Plan::from_xml(&root).unwrap(), plan);
    }
}
