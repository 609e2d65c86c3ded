//! Import of pre-rendered menu markup (`primary_html`, `mega_html`,
//! `langs_html`) into [`dom`](crate::dom) nodes.
//!
//! html5ever always builds a full document, so the `html`/`head`/`body`
//! wrappers it adds are flattened away and only the fragment's own nodes
//! are returned.

use markup5ever_rcdom::{Handle, NodeData, RcDom};
use tendril::TendrilSink;

use crate::dom::{Attribute, ElementNode, Node};
use crate::error::NavError;

pub fn parse_fragment(html: &str, source_name: &str) -> Result<Vec<Node>, NavError> {
    let dom = html5ever::parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
        .map_err(|e| NavError::payload(source_name, format!("failed to parse markup: {}", e)))?;

    let mut nodes = Vec::new();
    collect_body_content(&dom.document, &mut nodes);
    Ok(nodes)
}

fn collect_body_content(handle: &Handle, nodes: &mut Vec<Node>) {
    match &handle.data {
        NodeData::Document => {
            for child in handle.children.borrow().iter() {
                collect_body_content(child, nodes);
            }
        }
        NodeData::Element { name, .. } => {
            let tag = name.local.to_string().to_lowercase();
            if tag == "html" || tag == "head" || tag == "body" {
                for child in handle.children.borrow().iter() {
                    collect_body_content(child, nodes);
                }
            } else if let Some(node) = convert_node(handle) {
                nodes.push(node);
            }
        }
        // loose text between top-level links, e.g. `langs_html` separators
        NodeData::Text { .. } => {
            if let Some(node) = convert_node(handle) {
                nodes.push(node);
            }
        }
        _ => {}
    }
}

fn convert_node(handle: &Handle) -> Option<Node> {
    match &handle.data {
        NodeData::Text { contents } => {
            let text = contents.borrow().to_string();
            // indentation between tags
            if text.trim().is_empty() {
                None
            } else {
                Some(Node::text(&text))
            }
        }
        NodeData::Element { name, attrs, .. } => {
            let attributes = attrs
                .borrow()
                .iter()
                .map(|a| Attribute {
                    name: a.name.local.to_string(),
                    value: a.value.to_string(),
                })
                .collect();
            let children = handle
                .children
                .borrow()
                .iter()
                .filter_map(convert_node)
                .collect();
            Some(Node::Element(ElementNode {
                tag: name.local.to_string(),
                attributes,
                children,
            }))
        }
        // Comments, doctypes and processing instructions carry nothing the
        // menu needs.
        _ => None,
    }
}
