//! XML helpers for the mock server.
//!
//! Request bodies are flattened into dotted leaf paths
//! (`<transaction><account><account_code>` becomes `account.account_code`);
//! response bodies are assembled with `Body`.

use std::collections::HashMap;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// A parsed request body: root tag plus leaf values. `None` marks `nil="nil"`.
#[derive(Debug, Default)]
pub struct Document {
    pub root: String,
    leaves: HashMap<String, Option<String>>,
}

struct Open {
    name: String,
    nil: bool,
    has_children: bool,
    text: String,
}

impl Open {
    fn new(start: &BytesStart<'_>) -> Self {
        let nil = start
            .attributes()
            .flatten()
            .any(|attribute| attribute.key.as_ref() == b"nil");
        Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            nil,
            has_children: false,
            text: String::new(),
        }
    }
}

impl Document {
    pub fn parse(body: &str) -> Result<Self, String> {
        let mut reader = Reader::from_str(body);
        reader.config_mut().trim_text(true);

        let mut document = Document::default();
        let mut stack: Vec<Open> = Vec::new();
        loop {
            match reader.read_event().map_err(|e| e.to_string())? {
                Event::Start(start) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.has_children = true;
                    }
                    stack.push(Open::new(&start));
                }
                Event::Empty(start) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.has_children = true;
                    }
                    document.close(&stack, Open::new(&start));
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text.unescape().map_err(|e| e.to_string())?);
                    }
                }
                Event::End(_) => {
                    let open = stack.pop().ok_or("unbalanced end tag")?;
                    document.close(&stack, open);
                }
                Event::Eof => break,
                _ => {}
            }
        }
        if !stack.is_empty() || document.root.is_empty() {
            return Err("incomplete document".to_string());
        }
        Ok(document)
    }

    fn close(&mut self, parents: &[Open], open: Open) {
        if parents.is_empty() {
            self.root = open.name;
            return;
        }
        if open.has_children {
            return;
        }
        let mut path: Vec<&str> = parents[1..].iter().map(|parent| parent.name.as_str()).collect();
        path.push(&open.name);
        let value = (!open.nil).then_some(open.text);
        self.leaves.insert(path.join("."), value);
    }

    /// `None` when absent, `Some(None)` when nil.
    pub fn get(&self, path: &str) -> Option<Option<&str>> {
        self.leaves.get(path).map(Option::as_deref)
    }

    /// Text of a present, non-nil leaf.
    pub fn text(&self, path: &str) -> Option<&str> {
        self.get(path).flatten()
    }
}

/// Append-only XML response body.
#[derive(Debug, Default)]
pub struct Body {
    out: String,
}

impl Body {
    pub fn new() -> Self {
        Self {
            out: String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#),
        }
    }

    pub fn open(&mut self, name: &str, attributes: &[(&str, &str)]) -> &mut Self {
        self.out.push('<');
        self.out.push_str(name);
        for (key, value) in attributes {
            self.out.push_str(&format!(r#" {key}="{}""#, escape(*value)));
        }
        self.out.push('>');
        self
    }

    pub fn close(&mut self, name: &str) -> &mut Self {
        self.out.push_str(&format!("</{name}>"));
        self
    }

    /// `<name attr="...">text</name>`, written even when `text` is empty.
    pub fn element(&mut self, name: &str, attributes: &[(&str, &str)], text: &str) -> &mut Self {
        self.open(name, attributes);
        self.out.push_str(&escape(text));
        self.close(name)
    }

    /// `<name href="..."/>`
    pub fn link(&mut self, name: &str, href: &str) -> &mut Self {
        self.out.push_str(&format!(r#"<{name} href="{}"/>"#, escape(href)));
        self
    }

    /// A text leaf, or a nil leaf when `value` is `None` or empty.
    pub fn text(&mut self, name: &str, value: Option<&str>) -> &mut Self {
        match value.filter(|value| !value.is_empty()) {
            Some(value) => self.out.push_str(&format!("<{name}>{}</{name}>", escape(value))),
            None => self.nil(name),
        };
        self
    }

    /// A leaf carrying a `type` attribute such as `integer` or `boolean`.
    pub fn typed(&mut self, name: &str, kind: &str, value: Option<String>) -> &mut Self {
        match value {
            Some(value) => self
                .out
                .push_str(&format!(r#"<{name} type="{kind}">{}</{name}>"#, escape(&value))),
            None => self.nil(name),
        };
        self
    }

    fn nil(&mut self, name: &str) {
        self.out.push_str(&format!(r#"<{name} nil="nil"></{name}>"#));
    }

    pub fn finish(&mut self) -> String {
        std::mem::take(&mut self.out)
    }
}
