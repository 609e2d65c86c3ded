//! In-memory model of the three navigation mount points.
//!
//! The host mirrors this tree onto the real page; the crate only ever reads
//! and writes it. Serialization is deterministic (attributes keep insertion
//! order) so two renders of the same tree produce identical markup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::NavError;
use crate::sanitize::escape_html;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Node {
    Element(ElementNode),
    Text(TextNode),
}

impl Node {
    pub fn text(value: &str) -> Self {
        Node::Text(TextNode {
            value: value.to_string(),
        })
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    fn write_html(&self, out: &mut String) {
        match self {
            Node::Element(el) => el.write_html(out),
            Node::Text(t) => out.push_str(&escape_html(&t.value)),
        }
    }
}

impl From<ElementNode> for Node {
    fn from(el: ElementNode) -> Self {
        Node::Element(el)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextNode {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementNode {
    pub tag: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

impl ElementNode {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.children.push(Node::text(text));
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name == name)
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(attr) => attr.value = value.to_string(),
            None => self.attributes.push(Attribute {
                name: name.to_string(),
                value: value.to_string(),
            }),
        }
    }

    pub fn remove_attr(&mut self, name: &str) {
        self.attributes.retain(|a| a.name != name);
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|c| c.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn is_hidden(&self) -> bool {
        self.has_attr("hidden")
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for attr in &self.attributes {
            out.push(' ');
            out.push_str(&attr.name);
            if !attr.value.is_empty() {
                out.push_str("=\"");
                out.push_str(&escape_html(&attr.value));
                out.push('"');
            }
        }
        out.push('>');
        if VOID_ELEMENTS.contains(&self.tag.as_str()) {
            return;
        }
        for child in &self.children {
            child.write_html(out);
        }
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(&t.value),
            Node::Element(el) => collect_text(&el.children, out),
        }
    }
}

/// Depth-first element visit, pre-order.
pub fn walk_elements<'a>(nodes: &'a [Node], visit: &mut dyn FnMut(&'a ElementNode)) {
    for node in nodes {
        if let Node::Element(el) = node {
            visit(el);
            walk_elements(&el.children, visit);
        }
    }
}

fn find_in<'a>(nodes: &'a [Node], id: &str) -> Option<&'a ElementNode> {
    for node in nodes {
        if let Node::Element(el) = node {
            if el.id() == Some(id) {
                return Some(el);
            }
            if let Some(found) = find_in(&el.children, id) {
                return Some(found);
            }
        }
    }
    None
}

fn find_in_mut<'a>(nodes: &'a mut [Node], id: &str) -> Option<&'a mut ElementNode> {
    for node in nodes.iter_mut() {
        if let Node::Element(el) = node {
            if el.id() == Some(id) {
                return Some(el);
            }
            if let Some(found) = find_in_mut(&mut el.children, id) {
                return Some(found);
            }
        }
    }
    None
}

/// The page fragment the navigation owns: named mount points plus focus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    mounts: BTreeMap<String, Vec<Node>>,
    focused: Option<String>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mounts(ids: &[&str]) -> Self {
        let mut doc = Self::new();
        for id in ids {
            doc.add_mount(id);
        }
        doc
    }

    pub fn add_mount(&mut self, id: &str) {
        self.mounts.entry(id.to_string()).or_default();
    }

    pub fn has_mount(&self, id: &str) -> bool {
        self.mounts.contains_key(id)
    }

    pub fn mount(&self, id: &str) -> Option<&[Node]> {
        self.mounts.get(id).map(Vec::as_slice)
    }

    /// Replace a mount point's whole content.
    pub fn replace_children(&mut self, id: &str, children: Vec<Node>) -> Result<(), NavError> {
        let slot = self
            .mounts
            .get_mut(id)
            .ok_or_else(|| NavError::RenderTargetMissing {
                target: id.to_string(),
            })?;
        *slot = children;
        if let Some(focused) = self.focused.clone() {
            if self.find_by_id(&focused).is_none() {
                self.focused = None;
            }
        }
        Ok(())
    }

    pub fn find_by_id(&self, id: &str) -> Option<&ElementNode> {
        self.mounts.values().find_map(|nodes| find_in(nodes, id))
    }

    pub fn find_by_id_mut(&mut self, id: &str) -> Option<&mut ElementNode> {
        self.mounts
            .values_mut()
            .find_map(|nodes| find_in_mut(nodes, id))
    }

    pub fn attribute(&self, id: &str, name: &str) -> Option<&str> {
        self.find_by_id(id).and_then(|el| el.attr(name))
    }

    /// Returns false when no element carries `id`.
    pub fn set_attribute(&mut self, id: &str, name: &str, value: &str) -> bool {
        match self.find_by_id_mut(id) {
            Some(el) => {
                el.set_attr(name, value);
                true
            }
            None => false,
        }
    }

    pub fn remove_attribute(&mut self, id: &str, name: &str) -> bool {
        match self.find_by_id_mut(id) {
            Some(el) => {
                el.remove_attr(name);
                true
            }
            None => false,
        }
    }

    pub fn focus(&mut self, id: &str) -> bool {
        if self.find_by_id(id).is_some() {
            self.focused = Some(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn blur(&mut self) {
        self.focused = None;
    }

    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    /// Elements of one mount point matching `pred`, document order.
    pub fn query(&self, mount: &str, pred: impl Fn(&ElementNode) -> bool) -> Vec<&ElementNode> {
        let mut found = Vec::new();
        if let Some(nodes) = self.mounts.get(mount) {
            walk_elements(nodes, &mut |el| {
                if pred(el) {
                    found.push(el);
                }
            });
        }
        found
    }

    pub fn mount_html(&self, id: &str) -> Option<String> {
        self.mounts.get(id).map(|nodes| {
            let mut out = String::new();
            for node in nodes {
                node.write_html(&mut out);
            }
            out
        })
    }
}
