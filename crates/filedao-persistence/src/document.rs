//! Structured document model used by [`crate::DocumentDao`].
//!
//! A document is an XML-like tree: elements with ordered attributes and
//! children, where a child is an element, text or a comment. Comments in the
//! prolog precede the root element. Documents are persisted as pretty-printed
//! JSON.
//!
//! ```
//! use filedao_persistence::{Document, Element};
//!
//! let mut root = Element::new("users");
//! root.append_element(Element::new("user").with_attribute("id", "1"))
//!     .append_text("alice");
//! let doc = Document::with_root(root);
//!
//! let json = doc.to_json().unwrap();
//! let parsed = Document::from_json(&json).unwrap();
//! assert_eq!(parsed.root().unwrap().first_child("user").unwrap().text(), "alice");
//! ```

use std::collections::BTreeMap;
use std::io::Read;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A child of an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
}

/// A named element with attributes and children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style [`Element::set_attribute`].
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Sets an attribute, replacing any previous value.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl ToString) {
        self.attributes.insert(name.into(), value.to_string());
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Parses an attribute value, `None` if absent or unparsable.
    pub fn attribute_as<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.attribute(name)?.parse().ok()
    }

    /// Appends a child element and returns a reference to it.
    pub fn append_element(&mut self, element: Element) -> &mut Element {
        self.children.push(Node::Element(element));
        match self.children.last_mut() {
            Some(Node::Element(e)) => e,
            _ => unreachable!("element was just pushed"),
        }
    }

    pub fn append_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn append_comment(&mut self, comment: impl Into<String>) -> &mut Self {
        self.children.push(Node::Comment(comment.into()));
        self
    }

    /// Iterates over all child elements.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Iterates over child elements named `name`.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.child_elements().filter(move |e| e.name == name)
    }

    pub fn first_child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.name == name)
    }

    /// Concatenated text of the direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// A document: prolog comments plus an optional root element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
    #[serde(default)]
    pub root: Option<Element>,
}

impl Document {
    /// An empty document without root element.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: Element) -> Self {
        Self {
            comments: Vec::new(),
            root: Some(root),
        }
    }

    pub fn root(&self) -> Option<&Element> {
        self.root.as_ref()
    }

    /// Inserts a comment right before the root element.
    pub fn insert_comment(&mut self, comment: impl Into<String>) {
        self.comments.push(comment.into());
    }

    pub fn from_reader(reader: impl Read) -> serde_json::Result<Self> {
        serde_json::from_reader(reader)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// The comment stamped into every document written by a managed object.
pub fn provenance_comment(written_at: DateTime<Utc>) -> String {
    format!(
        "This file was generated automatically - do NOT modify!\nWritten at {}",
        written_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Document {
        let mut root = Element::new("settings").with_attribute("version", 2);
        root.append_element(Element::new("entry").with_attribute("key", "mode"))
            .append_text("fast");
        root.append_comment("tuning below");
        root.append_element(Element::new("entry").with_attribute("key", "threads"))
            .append_text("4");
        Document::with_root(root)
    }

    #[test]
    fn test_navigation() {
        let doc = sample();
        let root = doc.root().unwrap();

        assert_eq!(root.attribute_as::<u32>("version"), Some(2));
        assert_eq!(root.child_elements().count(), 2);
        assert_eq!(root.children_named("entry").count(), 2);
        assert_eq!(root.first_child("entry").unwrap().text(), "fast");
        assert!(root.first_child("missing").is_none());
        assert_eq!(root.attribute_as::<u32>("missing"), None);
    }

    #[test]
    fn test_json_layout() {
        let mut doc = Document::with_root(Element::new("empty"));
        doc.insert_comment("hello");

        let value: serde_json::Value = serde_json::from_str(&doc.to_json().unwrap()).unwrap();
        assert_eq!(value["comments"][0], "hello");
        assert_eq!(value["root"]["name"], "empty");
        assert!(value["root"].get("attributes").is_none());
    }

    #[test]
    fn test_parse_preserves_structure() {
        let doc = sample();
        let json = doc.to_json().unwrap();

        let parsed = Document::from_reader(json.as_bytes()).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_first_child_with_borrowed_name() {
        let doc = sample();
        let name = String::from("entry");

        let found = doc.root().and_then(|root| root.first_child(&name));
        drop(name);

        let entry = found.unwrap();
        assert_eq!(entry.attribute("key"), Some("mode"));
        assert_eq!(entry.text(), "fast");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Document::from_json("<settings/>").is_err());
        assert!(Document::from_json("").is_err());
    }

    #[test]
    fn test_document_without_root_parses() {
        let doc = Document::from_json("{}").unwrap();
        assert!(doc.root().is_none());
        assert!(doc.comments.is_empty());
    }

    #[test]
    fn test_provenance_comment() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(
            provenance_comment(at),
            "This file was generated automatically - do NOT modify!\n\
             Written at 2024-03-01 12:30:00 UTC"
        );
    }
}
