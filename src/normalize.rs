//! # Navigation Normalization
//!
//! Converts CMS rows into the canonical two-level navigation tree.
//!
//! ## Invariants
//!
//! 1. **Dedup**: rows are unique by `(label, href, parent)` before grouping.
//! 2. **Parent precedence**: a top-level label that is also a grouping key
//!    becomes the single parent node; other same-named top-level rows are
//!    dropped (case-insensitive).
//! 3. **Depth two**: only top-level nodes carry children. Rows grouped under
//!    a label that is not a top-level node are orphans and are dropped
//!    (unless [`OrphanPolicy::Synthesize`] is configured).
//! 4. **Ordering**: `order` ascending, ties by case-insensitive label,
//!    remaining ties keep source order.
//! 5. **Stability**: `normalize(flatten(tree)) == tree` for any tree this
//!    module produced.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::config::OrphanPolicy;
use crate::payload::RawRow;
use crate::sanitize::{sanitize_href, sanitize_label, slug_route, DEFAULT_ORDER};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavNode {
    pub label: String,
    /// `"#"` marks a toggle-only entry.
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_label: Option<String>,
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NavNode>,
}

impl NavNode {
    pub fn leaf(label: &str, href: &str, order: i64) -> Self {
        Self {
            label: label.to_string(),
            href: href.to_string(),
            parent_label: None,
            order,
            column: None,
            children: Vec::new(),
        }
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Toggle-only entries do not navigate anywhere.
    pub fn is_toggle_only(&self) -> bool {
        self.href.is_empty() || self.href == "#"
    }
}

pub type NavTree = Vec<NavNode>;

#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
    pub orphan_policy: OrphanPolicy,
}

/// Normalize rows for one language, dropping orphaned groups.
pub fn normalize(rows: &[RawRow], lang: &str) -> NavTree {
    normalize_with(rows, lang, NormalizeOptions::default())
}

pub fn normalize_with(rows: &[RawRow], lang: &str, options: NormalizeOptions) -> NavTree {
    let cleaned = clean_rows(rows, lang);

    // Partition. Group keys are case-insensitive; the first spelling seen wins.
    let mut top_level: Vec<CleanRow> = Vec::new();
    let mut group_keys: Vec<String> = Vec::new();
    let mut groups: HashMap<String, (String, Vec<CleanRow>)> = HashMap::new();
    for row in cleaned {
        match row.parent.clone() {
            None => top_level.push(row),
            Some(parent) => {
                let key = parent.to_lowercase();
                groups
                    .entry(key.clone())
                    .or_insert_with(|| {
                        group_keys.push(key);
                        (parent, Vec::new())
                    })
                    .1
                    .push(row);
            }
        }
    }

    sort_rows(&mut top_level);

    let mut claimed: HashSet<String> = HashSet::new();
    let mut tree: NavTree = Vec::with_capacity(top_level.len());
    for row in top_level {
        let key = row.label.to_lowercase();
        if groups.contains_key(&key) {
            if !claimed.insert(key) {
                tracing::debug!(
                    label = row.label.as_str(),
                    href = row.href.as_str(),
                    "dropping standalone entry shadowed by a parent group"
                );
                continue;
            }
        }
        tree.push(NavNode {
            label: row.label,
            href: row.href,
            parent_label: None,
            order: row.order,
            column: row.column,
            children: Vec::new(),
        });
    }

    for key in &group_keys {
        if claimed.contains(key) {
            continue;
        }
        let (parent, children) = &groups[key];
        match options.orphan_policy {
            OrphanPolicy::Drop => {
                tracing::debug!(
                    parent = parent.as_str(),
                    children = children.len(),
                    "dropping orphaned group"
                );
            }
            OrphanPolicy::Synthesize => {
                tree.push(NavNode {
                    label: parent.clone(),
                    href: slug_route(lang, parent),
                    parent_label: None,
                    order: DEFAULT_ORDER,
                    column: None,
                    children: Vec::new(),
                });
                claimed.insert(key.clone());
            }
        }
    }
    if options.orphan_policy == OrphanPolicy::Synthesize {
        sort_nodes(&mut tree);
    }

    for node in tree.iter_mut() {
        let key = node.label.to_lowercase();
        if !claimed.contains(&key) {
            continue;
        }
        if let Some((_, rows)) = groups.remove(&key) {
            let mut rows = rows;
            sort_rows(&mut rows);
            node.children = rows
                .into_iter()
                .map(|r| NavNode {
                    label: r.label,
                    href: r.href,
                    parent_label: Some(node.label.clone()),
                    order: r.order,
                    column: r.column,
                    children: Vec::new(),
                })
                .collect();
        }
    }

    tree
}

/// Inverse of [`normalize`]: one row per node, children pointing at their
/// parent's label.
pub fn flatten(tree: &[NavNode]) -> Vec<RawRow> {
    let mut rows = Vec::new();
    for node in tree {
        rows.push(node_row(node, None));
        for child in &node.children {
            rows.push(node_row(child, Some(&node.label)));
        }
    }
    rows
}

fn node_row(node: &NavNode, parent: Option<&str>) -> RawRow {
    RawRow {
        label: node.label.clone(),
        href: node.href.clone(),
        parent: parent.map(str::to_string),
        order: Some(node.order),
        column: node.column,
        enabled: true,
        lang: None,
    }
}

#[derive(Debug, Clone)]
struct CleanRow {
    label: String,
    href: String,
    parent: Option<String>,
    order: i64,
    column: Option<u32>,
}

/// Language filter, enabled filter, cell cleanup and triple dedup.
fn clean_rows(rows: &[RawRow], lang: &str) -> Vec<CleanRow> {
    let mut seen: HashSet<(String, String, Option<String>)> = HashSet::new();
    let mut out = Vec::with_capacity(rows.len());

    for row in rows {
        if !row.enabled {
            continue;
        }
        if let Some(row_lang) = row.lang.as_deref() {
            let row_lang = row_lang.trim();
            if !row_lang.is_empty() && !row_lang.eq_ignore_ascii_case(lang) {
                continue;
            }
        }
        let label = sanitize_label(&row.label);
        if label.is_empty() {
            continue;
        }
        let href = sanitize_href(&row.href, lang, &label);
        if href.is_empty() {
            continue;
        }
        let parent = row
            .parent
            .as_deref()
            .map(sanitize_label)
            .filter(|p| !p.is_empty());

        // parents group case-insensitively, so they dedup that way too
        let parent_key = parent.as_ref().map(|p| p.to_lowercase());
        if !seen.insert((label.clone(), href.clone(), parent_key)) {
            continue;
        }
        out.push(CleanRow {
            label,
            href,
            parent,
            order: row.order.unwrap_or(DEFAULT_ORDER),
            column: row.column,
        });
    }
    out
}

fn sort_rows(rows: &mut [CleanRow]) {
    rows.sort_by(|a, b| {
        a.order
            .cmp(&b.order)
            .then_with(|| a.label.to_lowercase().cmp(&b.label.to_lowercase()))
    });
}

fn sort_nodes(nodes: &mut [NavNode]) {
    nodes.sort_by(|a, b| {
        a.order
            .cmp(&b.order)
            .then_with(|| a.label.to_lowercase().cmp(&b.label.to_lowercase()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn services_rows() -> Vec<RawRow> {
        vec![
            RawRow::new("Services", "/s/").with_order(1),
            RawRow::new("Express", "/s/express/")
                .with_parent("Services")
                .with_order(1),
        ]
    }

    #[test]
    fn test_happy_path_tree() {
        let tree = normalize(&services_rows(), "pl");
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].label, "Services");
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].label, "Express");
        assert_eq!(tree[0].children[0].href, "/s/express/");
        assert_eq!(tree[0].children[0].parent_label.as_deref(), Some("Services"));
    }

    #[test]
    fn test_empty_rows_empty_tree() {
        assert!(normalize(&[], "pl").is_empty());
    }

    #[test]
    fn test_language_and_enabled_filters() {
        let rows = vec![
            RawRow::new("Kontakt", "/pl/kontakt/").with_lang("pl"),
            RawRow::new("Contact", "/en/contact/").with_lang("en"),
            RawRow::new("Blog", "/blog/"),
            RawRow::new("Hidden", "/hidden/").disabled(),
        ];
        let tree = normalize(&rows, "PL");
        let labels: Vec<&str> = tree.iter().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, vec!["Blog", "Kontakt"]);
    }

    #[test]
    fn test_empty_label_and_href_excluded() {
        let rows = vec![
            RawRow::new("   ", "/x/"),
            RawRow::new("No link", ""),
            RawRow::new("Ok", "/ok/"),
        ];
        let tree = normalize(&rows, "pl");
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].label, "Ok");
    }

    #[test]
    fn test_duplicates_collapse() {
        let mut rows = services_rows();
        rows.extend(services_rows());
        rows.push(
            RawRow::new("Express", "/s/express/")
                .with_parent("Services")
                .with_order(1),
        );
        let tree = normalize(&rows, "pl");
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].children.len(), 1);
    }

    #[test]
    fn test_parent_spelling_does_not_split_duplicates() {
        let rows = vec![
            RawRow::new("Services", "/s/"),
            RawRow::new("X", "/x/").with_parent("Services"),
            RawRow::new("X", "/x/").with_parent("services "),
        ];
        let tree = normalize(&rows, "pl");
        assert_eq!(tree[0].children.len(), 1);
    }

    #[test]
    fn test_parent_wins_over_standalone() {
        let rows = vec![
            RawRow::new("Services", "/s/").with_order(1),
            RawRow::new("services", "/other/").with_order(2),
            RawRow::new("X", "/x/").with_parent("SERVICES"),
        ];
        let tree = normalize(&rows, "pl");
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].href, "/s/");
        assert_eq!(tree[0].children[0].label, "X");
    }

    #[test]
    fn test_orphans_dropped_or_synthesized() {
        let rows = vec![
            RawRow::new("Home", "/").with_order(0),
            RawRow::new("Pallets", "/pl/pallets/").with_parent("Transport"),
        ];
        let dropped = normalize(&rows, "pl");
        assert_eq!(dropped.len(), 1);

        let synthesized = normalize_with(
            &rows,
            "pl",
            NormalizeOptions {
                orphan_policy: OrphanPolicy::Synthesize,
            },
        );
        assert_eq!(synthesized.len(), 2);
        assert_eq!(synthesized[1].label, "Transport");
        assert_eq!(synthesized[1].href, "/pl/transport/");
        assert_eq!(synthesized[1].children.len(), 1);
    }

    #[test]
    fn test_grandchildren_not_modeled() {
        let rows = vec![
            RawRow::new("A", "/a/"),
            RawRow::new("B", "/b/").with_parent("A"),
            RawRow::new("C", "/c/").with_parent("B"),
        ];
        let tree = normalize(&rows, "pl");
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].children.len(), 1);
        assert!(tree[0].children[0].children.is_empty());
    }

    #[test]
    fn test_sort_order_and_ties() {
        let rows = vec![
            RawRow::new("beta", "/b/").with_order(2),
            RawRow::new("Alpha", "/a/").with_order(2),
            RawRow::new("Zeta", "/z/").with_order(1),
            RawRow::new("Last", "/l/"),
        ];
        let tree = normalize(&rows, "pl");
        let labels: Vec<&str> = tree.iter().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, vec!["Zeta", "Alpha", "beta", "Last"]);
        assert_eq!(tree[3].order, DEFAULT_ORDER);
    }

    #[test]
    fn test_flatten_then_normalize_is_stable() {
        let rows = vec![
            RawRow::new("Services", "/s").with_order(1),
            RawRow::new("B", "/s/b").with_parent("services").with_column(2),
            RawRow::new("A", "/s/a").with_parent("Services"),
            RawRow::new("Contact", "javascript:void(0)").with_order(9),
        ];
        let once = normalize(&rows, "en");
        let twice = normalize(&flatten(&once), "en");
        assert_eq!(once, twice);
        assert_eq!(once[1].href, "/en/contact/");
    }
}
