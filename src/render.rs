//! # Menu Rendering
//!
//! Turns a [`NavTree`] into nodes for the three mount points:
//!
//! - **Top bar**: one `<li>` per top-level node. Parents get a
//!   `.mega-toggle` button (`aria-haspopup`, `aria-expanded="false"`,
//!   `aria-controls`); leaves get a plain link.
//! - **Panel container**: one hidden `.mega` panel per parent, children laid
//!   out in 1..=5 columns.
//! - **Mobile list**: the same top level, parents as collapsed disclosures.
//!
//! Rendering is a pure function of the tree and the render config; the
//! fingerprint of the mounted markup is what revalidation compares.
//! No behavior is attached here beyond `data-prefetch` hints.

use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::config::{MountTargets, RenderConfig};
use crate::dom::{walk_elements, Document, ElementNode, Node};
use crate::error::NavError;
use crate::html_import::parse_fragment;
use crate::normalize::{NavNode, NavTree};
use crate::payload::PrerenderedPayload;
use crate::sanitize::{same_path, slugify};

pub const TOGGLE_CLASS: &str = "mega-toggle";
pub const PANEL_CLASS: &str = "mega";
pub const PREFETCH_ATTR: &str = "data-prefetch";
pub const PREFETCH_TTL_MS: u64 = 6_000;

/// Nodes for each mount point, before mounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedMenu {
    pub top_bar: Vec<Node>,
    pub panels: Vec<Node>,
    pub mobile: Vec<Node>,
}

impl RenderedMenu {
    pub fn top_bar_html(&self) -> String {
        nodes_html(&self.top_bar)
    }

    pub fn panels_html(&self) -> String {
        nodes_html(&self.panels)
    }

    pub fn mobile_html(&self) -> String {
        nodes_html(&self.mobile)
    }
}

fn nodes_html(nodes: &[Node]) -> String {
    nodes
        .iter()
        .map(|n| match n {
            Node::Element(el) => el.to_html(),
            Node::Text(t) => crate::sanitize::escape_html(&t.value),
        })
        .collect()
}

/// Outcome of mounting a menu into a [`Document`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderReport {
    pub rendered: Vec<String>,
    /// Mount points that were absent from the document.
    pub skipped: Vec<String>,
    pub fingerprint: String,
}

/// Ids generated for one top-level parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelIds {
    pub toggle: String,
    pub panel: String,
    pub mobile_toggle: String,
    pub mobile_sub: String,
}

impl PanelIds {
    fn for_slug(slug: &str) -> Self {
        Self {
            toggle: format!("nav-toggle-{}", slug),
            panel: format!("mega-{}", slug),
            mobile_toggle: format!("mobile-toggle-{}", slug),
            mobile_sub: format!("mobile-sub-{}", slug),
        }
    }
}

/// Build the menu nodes for a tree.
pub fn build_menu(tree: &[NavNode], config: &RenderConfig) -> RenderedMenu {
    let mut menu = RenderedMenu::default();
    let mut used = HashSet::new();

    for node in tree {
        let slug = unique_slug(&node.label, &mut used);
        if node.has_children() {
            let ids = PanelIds::for_slug(&slug);
            menu.top_bar.push(top_bar_toggle(node, &slug, &ids).into());
            menu.panels.push(panel(node, &slug, &ids, config).into());
            menu.mobile.push(mobile_disclosure(node, &ids, config).into());
        } else {
            menu.top_bar
                .push(top_bar_link(node, &format!("nav-link-{}", slug), config).into());
            menu.mobile.push(
                ElementNode::new("li")
                    .with_child(link(node, None, config))
                    .into(),
            );
        }
    }
    menu
}

/// Render a tree into the document, replacing each target's content.
pub fn render(
    tree: &NavTree,
    targets: &MountTargets,
    doc: &mut Document,
    config: &RenderConfig,
) -> RenderReport {
    let menu = build_menu(tree, config);
    mount_menu(menu, targets, doc)
}

pub fn mount_menu(menu: RenderedMenu, targets: &MountTargets, doc: &mut Document) -> RenderReport {
    let mut report = RenderReport::default();
    let parts = [
        (&targets.top_bar, menu.top_bar),
        (&targets.panel_container, menu.panels),
        (&targets.mobile_list, menu.mobile),
    ];
    for (target, nodes) in parts {
        mount_into(doc, target, nodes, &mut report);
    }
    report.fingerprint = fingerprint(doc, targets);
    report
}

fn mount_into(doc: &mut Document, target: &str, nodes: Vec<Node>, report: &mut RenderReport) {
    match doc.replace_children(target, nodes) {
        Ok(()) => report.rendered.push(target.to_string()),
        Err(e) => {
            tracing::warn!(code = e.code(), mount = target, "skipping render target: {}", e);
            report.skipped.push(target.to_string());
        }
    }
}

/// Render the legacy markup dialect.
///
/// Top-bar entries that are not panel parents and whose link also appears
/// inside the mega panels are removed; the mobile list becomes a copy of the
/// pruned top bar.
pub fn render_prerendered(
    payload: &PrerenderedPayload,
    targets: &MountTargets,
    doc: &mut Document,
) -> Result<RenderReport, NavError> {
    let mut report = RenderReport::default();

    let mut top_bar = match &payload.primary_html {
        Some(html) => Some(parse_fragment(html, "primary_html")?),
        None => None,
    };
    let panels = match &payload.mega_html {
        Some(html) => Some(parse_fragment(html, "mega_html")?),
        None => None,
    };
    let langs = match (&payload.langs_html, &targets.langs) {
        (Some(html), Some(_)) => Some(parse_fragment(html, "langs_html")?),
        _ => None,
    };

    if let (Some(bar), Some(panels)) = (top_bar.as_mut(), panels.as_ref()) {
        prune_child_duplicates(bar, panels);
    }

    if let Some(bar) = top_bar {
        let mobile: Vec<Node> = bar.iter().cloned().map(strip_ids).collect();
        mount_into(doc, &targets.top_bar, bar, &mut report);
        mount_into(doc, &targets.mobile_list, mobile, &mut report);
    }
    if let Some(panels) = panels {
        mount_into(doc, &targets.panel_container, panels, &mut report);
    }
    if let (Some(nodes), Some(target)) = (langs, &targets.langs) {
        mount_into(doc, target, nodes, &mut report);
    }

    report.fingerprint = fingerprint(doc, targets);
    Ok(report)
}

fn prune_child_duplicates(bar: &mut Vec<Node>, panels: &[Node]) {
    let mut child_hrefs = HashSet::new();
    walk_elements(panels, &mut |el| {
        if el.tag == "a" {
            if let Some(href) = el.attr("href").filter(|h| !h.is_empty()) {
                child_hrefs.insert(href.to_string());
            }
        }
    });

    bar.retain(|node| {
        let Some(li) = node.as_element() else {
            return true;
        };
        if li.has_attr("data-panel") {
            return true;
        }
        match first_link_href(li) {
            Some(href) => !child_hrefs.contains(href),
            None => true,
        }
    });
}

fn first_link_href(el: &ElementNode) -> Option<&str> {
    let mut found = None;
    walk_elements(&el.children, &mut |child| {
        if found.is_none() && child.tag == "a" {
            found = child.attr("href");
        }
    });
    found
}

fn strip_ids(node: Node) -> Node {
    match node {
        Node::Element(mut el) => {
            el.remove_attr("id");
            el.children = el.children.into_iter().map(strip_ids).collect();
            Node::Element(el)
        }
        text => text,
    }
}

/// sha256 over the serialized mount points, in target order.
pub fn fingerprint(doc: &Document, targets: &MountTargets) -> String {
    let mut hasher = Sha256::new();
    let mut ids = vec![
        targets.top_bar.as_str(),
        targets.panel_container.as_str(),
        targets.mobile_list.as_str(),
    ];
    if let Some(langs) = &targets.langs {
        ids.push(langs.as_str());
    }
    for id in ids {
        hasher.update(id.as_bytes());
        hasher.update([0u8]);
        hasher.update(doc.mount_html(id).unwrap_or_default().as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLUMN LAYOUT
// ═══════════════════════════════════════════════════════════════════════════════

/// Split a parent's children into panel columns.
///
/// Declared `column` values win (clamped to `max_explicit_columns`, rows
/// without one go to column 1, empty columns are skipped). Otherwise
/// `min(max_computed_columns, ceil(n / items_per_column))` columns are
/// filled in contiguous chunks.
pub fn distribute_columns<'a>(children: &'a [NavNode], config: &RenderConfig) -> Vec<Vec<&'a NavNode>> {
    if children.is_empty() {
        return Vec::new();
    }

    if children.iter().any(|c| c.column.is_some()) {
        let max = config.max_explicit_columns.max(1);
        let mut columns: Vec<Vec<&NavNode>> = vec![Vec::new(); max];
        for child in children {
            let col = child.column.unwrap_or(1).max(1) as usize;
            columns[col.min(max) - 1].push(child);
        }
        columns.retain(|c| !c.is_empty());
        return columns;
    }

    let per_column = config.items_per_column.max(1);
    let count = children
        .len()
        .div_ceil(per_column)
        .min(config.max_computed_columns.max(1))
        .max(1);
    let chunk = children.len().div_ceil(count);
    children.chunks(chunk).map(|c| c.iter().collect()).collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// ELEMENT BUILDERS
// ═══════════════════════════════════════════════════════════════════════════════

fn unique_slug(label: &str, used: &mut HashSet<String>) -> String {
    let base = slugify(label);
    if used.insert(base.clone()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Relative paths, or absolute URLs on the configured origin.
pub fn is_same_origin(href: &str, config: &RenderConfig) -> bool {
    if href.starts_with('/') && !href.starts_with("//") {
        return true;
    }
    match &config.origin {
        Some(origin) => {
            let origin = origin.trim_end_matches('/');
            href == origin || href.starts_with(&format!("{}/", origin))
        }
        None => false,
    }
}

fn link(node: &NavNode, id: Option<&str>, config: &RenderConfig) -> ElementNode {
    let mut a = ElementNode::new("a");
    if let Some(id) = id {
        a.set_attr("id", id);
    }
    a.set_attr("href", &node.href);
    if is_same_origin(&node.href, config) {
        a.set_attr(PREFETCH_ATTR, "hover");
    }
    a.with_text(&node.label)
}

fn top_bar_link(node: &NavNode, id: &str, config: &RenderConfig) -> ElementNode {
    let mut a = link(node, Some(id), config);
    if let Some(current) = &config.current_path {
        if !node.is_toggle_only() && same_path(&node.href, current) {
            a.set_attr("aria-current", "page");
        }
    }
    ElementNode::new("li").with_child(a)
}

fn top_bar_toggle(node: &NavNode, slug: &str, ids: &PanelIds) -> ElementNode {
    let mut button = ElementNode::new("button")
        .with_attr("type", "button")
        .with_attr("id", &ids.toggle)
        .with_attr("class", TOGGLE_CLASS)
        .with_attr("aria-haspopup", "true")
        .with_attr("aria-expanded", "false")
        .with_attr("aria-controls", &ids.panel);
    if !node.is_toggle_only() {
        button.set_attr("data-href", &node.href);
    }
    ElementNode::new("li")
        .with_attr("class", "has-mega")
        .with_attr("data-panel", slug)
        .with_child(button.with_text(&node.label))
}

fn panel(node: &NavNode, slug: &str, ids: &PanelIds, config: &RenderConfig) -> ElementNode {
    let columns = distribute_columns(&node.children, config);
    let mut grid = ElementNode::new("div")
        .with_attr("class", "mega-grid")
        .with_attr("data-columns", &columns.len().to_string());

    let mut index = 0;
    for column in columns {
        let mut list = ElementNode::new("ul");
        for child in column {
            let id = format!("{}-link-{}", ids.panel, index);
            index += 1;
            list.children
                .push(ElementNode::new("li").with_child(link(child, Some(&id), config)).into());
        }
        grid.children.push(
            ElementNode::new("div")
                .with_attr("class", "mega-col")
                .with_child(list)
                .into(),
        );
    }

    ElementNode::new("div")
        .with_attr("id", &ids.panel)
        .with_attr("class", PANEL_CLASS)
        .with_attr("role", "region")
        .with_attr("aria-label", &node.label)
        .with_attr("data-panel", slug)
        .with_attr("hidden", "")
        .with_attr("aria-hidden", "true")
        .with_child(grid)
}

fn mobile_disclosure(node: &NavNode, ids: &PanelIds, config: &RenderConfig) -> ElementNode {
    let button = ElementNode::new("button")
        .with_attr("type", "button")
        .with_attr("id", &ids.mobile_toggle)
        .with_attr("aria-expanded", "false")
        .with_attr("aria-controls", &ids.mobile_sub)
        .with_text(&node.label);
    let mut sub = ElementNode::new("ul")
        .with_attr("id", &ids.mobile_sub)
        .with_attr("class", "mobile-sub")
        .with_attr("hidden", "");
    for child in &node.children {
        sub.children
            .push(ElementNode::new("li").with_child(link(child, None, config)).into());
    }
    ElementNode::new("li")
        .with_attr("class", "has-sub")
        .with_child(button)
        .with_child(sub)
}

/// Prefetch request produced when the pointer enters a hinted link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchHint {
    pub href: String,
    pub expires_after_ms: u64,
}

/// Hint for a hovered element, if it is a link marked for prefetching.
pub fn prefetch_hint(doc: &Document, element_id: &str) -> Option<PrefetchHint> {
    let el = doc.find_by_id(element_id)?;
    if el.tag != "a" || el.attr(PREFETCH_ATTR) != Some("hover") {
        return None;
    }
    Some(PrefetchHint {
        href: el.attr("href")?.to_string(),
        expires_after_ms: PREFETCH_TTL_MS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::payload::RawRow;

    fn targets() -> MountTargets {
        MountTargets::default()
    }

    fn doc() -> Document {
        Document::with_mounts(&["navList", "megaPanels", "mobileList"])
    }

    fn parent_with(n: usize) -> NavNode {
        let mut parent = NavNode::leaf("Usługi", "/pl/uslugi/", 1);
        parent.children = (0..n)
            .map(|i| {
                let mut c = NavNode::leaf(&format!("Item {}", i), &format!("/pl/i{}/", i), i as i64);
                c.parent_label = Some("Usługi".to_string());
                c
            })
            .collect();
        parent
    }

    #[test]
    fn test_toggle_and_leaf_markup() {
        let tree = vec![parent_with(1), NavNode::leaf("Kontakt", "/pl/kontakt/", 2)];
        let menu = build_menu(&tree, &RenderConfig::default());
        assert_eq!(
            menu.top_bar_html(),
            concat!(
                r#"<li class="has-mega" data-panel="uslugi"><button type="button" id="nav-toggle-uslugi" class="mega-toggle" aria-haspopup="true" aria-expanded="false" aria-controls="mega-uslugi" data-href="/pl/uslugi/">Usługi</button></li>"#,
                r#"<li><a id="nav-link-kontakt" href="/pl/kontakt/" data-prefetch="hover">Kontakt</a></li>"#
            )
        );
        assert!(menu.panels_html().starts_with(
            r#"<div id="mega-uslugi" class="mega" role="region" aria-label="Usługi" data-panel="uslugi" hidden aria-hidden="true">"#
        ));
        assert!(menu.mobile_html().contains(
            r#"<button type="button" id="mobile-toggle-uslugi" aria-expanded="false" aria-controls="mobile-sub-uslugi">Usługi</button><ul id="mobile-sub-uslugi" class="mobile-sub" hidden>"#
        ));
    }

    #[test]
    fn test_computed_columns() {
        let config = RenderConfig::default();
        let parent = parent_with(1);
        assert_eq!(distribute_columns(&parent.children, &config).len(), 1);

        let parent = parent_with(7);
        let cols = distribute_columns(&parent.children, &config);
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[0].len(), 4);
        assert_eq!(cols[1].len(), 3);

        let parent = parent_with(40);
        let cols = distribute_columns(&parent.children, &config);
        assert_eq!(cols.len(), 4);
        assert_eq!(cols.iter().map(Vec::len).sum::<usize>(), 40);
    }

    #[test]
    fn test_explicit_columns_clamped() {
        let mut parent = parent_with(3);
        parent.children[0].column = Some(9);
        parent.children[1].column = Some(2);
        let cols = distribute_columns(&parent.children, &RenderConfig::default());
        // child 2 has no column -> column 1; child 0 clamps to 5
        assert_eq!(cols.len(), 3);
        assert_eq!(cols[0][0].label, "Item 2");
        assert_eq!(cols[1][0].label, "Item 1");
        assert_eq!(cols[2][0].label, "Item 0");
    }

    #[test]
    fn test_render_is_deterministic() {
        let rows = vec![
            RawRow::new("Services", "/s/").with_order(1),
            RawRow::new("Express", "/s/express/").with_parent("Services"),
            RawRow::new("Blog", "/blog/").with_order(2),
        ];
        let tree = normalize(&rows, "en");
        let mut a = doc();
        let mut b = doc();
        let ra = render(&tree, &targets(), &mut a, &RenderConfig::default());
        let rb = render(&tree, &targets(), &mut b, &RenderConfig::default());
        assert_eq!(ra.fingerprint, rb.fingerprint);
        assert_eq!(a, b);
        assert_eq!(ra.rendered.len(), 3);
    }

    #[test]
    fn test_missing_target_skipped() {
        let mut d = Document::with_mounts(&["navList"]);
        let report = render(
            &vec![parent_with(2)],
            &targets(),
            &mut d,
            &RenderConfig::default(),
        );
        assert_eq!(report.rendered, vec!["navList".to_string()]);
        assert_eq!(report.skipped.len(), 2);
        assert!(d.find_by_id("nav-toggle-uslugi").is_some());
    }

    #[test]
    fn test_aria_current_and_prefetch() {
        let config = RenderConfig {
            current_path: Some("/pl/kontakt".to_string()),
            origin: Some("https://kras-trans.pl".to_string()),
            ..RenderConfig::default()
        };
        let tree = vec![
            NavNode::leaf("Kontakt", "/pl/kontakt/", 1),
            NavNode::leaf("Blog", "https://kras-trans.pl/blog/", 2),
            NavNode::leaf("FB", "https://facebook.com/x", 3),
        ];
        let mut d = doc();
        render(&tree, &targets(), &mut d, &config);
        assert_eq!(d.attribute("nav-link-kontakt", "aria-current"), Some("page"));
        assert_eq!(d.attribute("nav-link-blog", "aria-current"), None);
        assert_eq!(
            prefetch_hint(&d, "nav-link-blog"),
            Some(PrefetchHint {
                href: "https://kras-trans.pl/blog/".to_string(),
                expires_after_ms: PREFETCH_TTL_MS,
            })
        );
        assert_eq!(prefetch_hint(&d, "nav-link-fb"), None);
    }

    #[test]
    fn test_duplicate_slugs_get_suffix() {
        let tree = vec![
            NavNode::leaf("Blog", "/blog/", 1),
            NavNode::leaf("blog", "/blog-2/", 2),
        ];
        let mut d = doc();
        render(&tree, &targets(), &mut d, &RenderConfig::default());
        assert!(d.find_by_id("nav-link-blog").is_some());
        assert!(d.find_by_id("nav-link-blog-2").is_some());
    }

    #[test]
    fn test_prerendered_prunes_child_duplicates() {
        let payload = PrerenderedPayload {
            primary_html: Some(
                r#"<li data-panel="uslugi"><a href="/pl/uslugi/">Usługi</a></li><li><a href="/pl/express/">Express</a></li><li><a href="/pl/kontakt/">Kontakt</a></li>"#
                    .to_string(),
            ),
            mega_html: Some(
                r#"<section class="mega__section" data-panel="uslugi"><a href="/pl/express/">Express</a></section>"#
                    .to_string(),
            ),
            langs_html: None,
            version: None,
        };
        let mut d = doc();
        let report = render_prerendered(&payload, &targets(), &mut d).unwrap();
        assert_eq!(report.skipped, Vec::<String>::new());
        let bar = d.mount_html("navList").unwrap();
        assert!(bar.contains("Usługi"));
        assert!(bar.contains("Kontakt"));
        assert!(!bar.contains("Express"));
        assert_eq!(d.mount_html("mobileList"), Some(bar));
    }
}
