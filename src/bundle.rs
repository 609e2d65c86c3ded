//! Snapshot generation for the static `/assets/nav/` bundles.
//!
//! Reads the CMS export, builds one versioned bundle per language and writes
//! `bundle_<lang>.json` files that [`fetch`](crate::fetch) serves back. The
//! version is a sha256 over the bundle's items, so it changes exactly when
//! the menu does.

#[cfg(feature = "napi")]
use napi_derive::napi;

use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::NavError;
use crate::normalize::{flatten, normalize_with, NormalizeOptions};
use crate::payload::{NavPayload, RawRow};
use crate::sanitize::sanitize_label;

lazy_static! {
    static ref BUNDLE_FILE_RE: Regex =
        Regex::new(r"^bundle_([a-z]{2,3}(?:-[a-z0-9]+)?)\.json$").unwrap();
}

/// Lookup order within each directory: JSON exports win over CSV.
const CMS_FILE_NAMES: &[&str] = &["cms.json", "CMS.json", "cms.csv", "CMS.csv"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavBundle {
    pub lang: String,
    pub version: String,
    pub items: Vec<RawRow>,
}

/// `sha256:<hex>` over the compact JSON of `items`.
pub fn content_version(items: &[RawRow]) -> String {
    let canonical = serde_json::to_string(items).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("sha256:{:x}", hasher.finalize())
}

/// Locate the CMS export in `dir`, then in its parent.
pub fn find_cms_source(dir: &Path) -> Option<PathBuf> {
    let mut roots = vec![dir];
    if let Some(parent) = dir.parent() {
        roots.push(parent);
    }
    roots
        .into_iter()
        .flat_map(|root| CMS_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|p| p.is_file())
}

/// Load CMS rows from a JSON file (a bare array of rows, or any row-based
/// payload `{items}` / `{nav}`) or from a CSV sheet with a header row.
pub fn load_rows(path: &Path) -> Result<Vec<RawRow>, NavError> {
    let source_name = path.display().to_string();
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if is_csv {
        return load_csv_rows(path, &source_name);
    }
    let data = fs::read_to_string(path).map_err(|e| NavError::io(&source_name, e))?;
    let value: Value = serde_json::from_str(&data)
        .map_err(|e| NavError::payload(&source_name, format!("invalid JSON: {}", e)))?;
    rows_from_value(value, &source_name)
}

fn load_csv_rows(path: &Path, source_name: &str) -> Result<Vec<RawRow>, NavError> {
    let data = fs::read_to_string(path).map_err(|e| NavError::io(source_name, e))?;
    rows_from_csv(&data, source_name)
}

/// Parse a CSV export. Columns are matched by header name (`lang`, `label`,
/// `href`, `parent`, `order`, `col`, `enabled`); unknown columns are ignored.
pub fn rows_from_csv(data: &str, source_name: &str) -> Result<Vec<RawRow>, NavError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(data.trim_start_matches('\u{feff}').as_bytes());
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| NavError::payload(source_name, format!("invalid CSV header: {}", e)))?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!(source = source_name, line = idx + 2, "skipping CMS row: {}", e);
                continue;
            }
        };
        let obj: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(h, cell)| (h.clone(), Value::String(cell.to_string())))
            .collect();
        rows.push(RawRow::try_from(Value::Object(obj)).map_err(|e| NavError::payload(source_name, e))?);
    }
    Ok(rows)
}

pub fn rows_from_value(value: Value, source_name: &str) -> Result<Vec<RawRow>, NavError> {
    if let Value::Array(items) = value {
        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            match RawRow::try_from(item) {
                Ok(row) => rows.push(row),
                Err(e) => tracing::debug!(source = source_name, "skipping CMS row: {}", e),
            }
        }
        return Ok(rows);
    }
    match NavPayload::from_value(&value, source_name)? {
        NavPayload::RowBased(payload) => Ok(payload.items),
        NavPayload::Prerendered(_) => Err(NavError::payload(
            source_name,
            "pre-rendered markup cannot be bundled",
        )),
    }
}

/// Declared languages, lowercased and sorted.
pub fn languages(rows: &[RawRow]) -> Vec<String> {
    rows.iter()
        .filter_map(|r| r.lang.as_deref())
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn build_bundle_for_lang(rows: &[RawRow], lang: &str, options: NormalizeOptions) -> NavBundle {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for row in rows.iter().filter(|r| applies_to(r, lang)) {
        let label = sanitize_label(&row.label);
        if label.is_empty() {
            continue;
        }
        if !seen.insert(label.clone()) {
            tracing::warn!(lang, label = label.as_str(), "duplicate label; keeping the first");
            continue;
        }
        unique.push(row.clone());
    }

    let tree = normalize_with(&unique, lang, options);
    let items: Vec<RawRow> = flatten(&tree)
        .into_iter()
        .map(|row| row.with_lang(lang))
        .collect();
    NavBundle {
        lang: lang.to_string(),
        version: content_version(&items),
        items,
    }
}

/// One bundle per language, built in parallel, in `langs` order.
pub fn build_all(rows: &[RawRow], langs: &[String], options: NormalizeOptions) -> Vec<NavBundle> {
    langs
        .par_iter()
        .map(|lang| build_bundle_for_lang(rows, lang, options))
        .collect()
}

pub fn bundle_file_name(lang: &str) -> String {
    format!("bundle_{}.json", lang)
}

pub fn write_snapshots(dir: &Path, bundles: &[NavBundle]) -> Result<Vec<PathBuf>, NavError> {
    fs::create_dir_all(dir).map_err(|e| NavError::io(dir.display().to_string(), e))?;
    let mut written = Vec::with_capacity(bundles.len());
    for bundle in bundles {
        let path = dir.join(bundle_file_name(&bundle.lang));
        let data = serde_json::to_string_pretty(bundle)
            .map_err(|e| NavError::payload(&bundle.lang, e.to_string()))?;
        fs::write(&path, data).map_err(|e| NavError::io(path.display().to_string(), e))?;
        written.push(path);
    }
    tracing::info!(count = written.len(), dir = %dir.display(), "navigation snapshots written");
    Ok(written)
}

/// Existing `bundle_<lang>.json` files under `dir`, by language.
pub fn discover_snapshots(dir: &Path) -> BTreeMap<String, PathBuf> {
    let mut found = BTreeMap::new();
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if let Some(caps) = BUNDLE_FILE_RE.captures(&name) {
            found
                .entry(caps[1].to_string())
                .or_insert_with(|| entry.path().to_path_buf());
        }
    }
    found
}

fn applies_to(row: &RawRow, lang: &str) -> bool {
    match row.lang.as_deref().map(str::trim) {
        Some(l) if !l.is_empty() => l.eq_ignore_ascii_case(lang),
        _ => true,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODE BRIDGE
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
#[napi]
pub fn build_bundle_native(rows_json: String, lang: String) -> napi::Result<serde_json::Value> {
    let value: Value =
        serde_json::from_str(&rows_json).map_err(|e| napi::Error::from_reason(e.to_string()))?;
    let rows = rows_from_value(value, "rows_json").map_err(|e| napi::Error::from_reason(e.to_string()))?;
    let bundle = build_bundle_for_lang(&rows, &lang, NormalizeOptions::default());
    serde_json::to_value(bundle).map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn cms() -> Vec<RawRow> {
        rows_from_value(
            json!([
                {"lang": "pl", "label": "Usługi", "href": "/pl/uslugi/", "order": 1},
                {"lang": "pl", "label": "Express", "href": "/pl/express/", "parent": "Usługi", "col": 2},
                {"lang": "pl", "label": "Express", "href": "/pl/express-2/", "parent": "Usługi"},
                {"lang": "pl", "label": "Ukryte", "href": "/pl/x/", "enabled": "nie"},
                {"lang": "en", "label": "Services", "href": "/en/services/", "order": 1},
                {"lang": "EN", "label": "Contact", "href": "javascript:alert(1)", "order": 2}
            ]),
            "cms.json",
        )
        .unwrap()
    }

    #[test]
    fn test_languages_are_collected() {
        assert_eq!(languages(&cms()), vec!["en".to_string(), "pl".to_string()]);
    }

    #[test]
    fn test_bundle_for_lang() {
        let bundle = build_bundle_for_lang(&cms(), "pl", NormalizeOptions::default());
        let labels: Vec<&str> = bundle.items.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["Usługi", "Express"]);
        assert_eq!(bundle.items[1].href, "/pl/express/");
        assert_eq!(bundle.items[1].column, Some(2));
        assert!(bundle.version.starts_with("sha256:"));
        assert_eq!(bundle.version.len(), "sha256:".len() + 64);
    }

    #[test]
    fn test_unsafe_href_rewritten() {
        let bundle = build_bundle_for_lang(&cms(), "en", NormalizeOptions::default());
        assert_eq!(bundle.items[1].href, "/en/contact/");
    }

    #[test]
    fn test_version_tracks_content() {
        let rows = cms();
        let a = build_bundle_for_lang(&rows, "pl", NormalizeOptions::default());
        let b = build_bundle_for_lang(&rows, "pl", NormalizeOptions::default());
        assert_eq!(a.version, b.version);

        let mut changed = rows;
        changed[0].label = "Oferta".to_string();
        let c = build_bundle_for_lang(&changed, "pl", NormalizeOptions::default());
        assert_ne!(a.version, c.version);
    }

    #[test]
    fn test_parallel_build_keeps_order() {
        let langs = vec!["pl".to_string(), "en".to_string(), "de".to_string()];
        let bundles = build_all(&cms(), &langs, NormalizeOptions::default());
        let got: Vec<&str> = bundles.iter().map(|b| b.lang.as_str()).collect();
        assert_eq!(got, vec!["pl", "en", "de"]);
        assert!(bundles[2].items.is_empty());
    }

    #[test]
    fn test_write_then_discover_then_fetchable() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("assets").join("nav");
        let langs = languages(&cms());
        let bundles = build_all(&cms(), &langs, NormalizeOptions::default());
        let written = write_snapshots(&out, &bundles).unwrap();
        assert_eq!(written.len(), 2);
        fs::write(out.join("notes.json"), "{}").unwrap();

        let found = discover_snapshots(dir.path());
        assert_eq!(found.keys().cloned().collect::<Vec<_>>(), langs);

        let body = fs::read_to_string(&found["pl"]).unwrap();
        let payload = NavPayload::from_json_str(&body, "bundle_pl.json").unwrap();
        assert_eq!(payload.version(), Some(bundles[1].version.as_str()));
    }

    #[test]
    fn test_find_cms_source_checks_parent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("cms");
        fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_cms_source(&nested), None);
        fs::write(dir.path().join("cms.json"), "[]").unwrap();
        assert_eq!(find_cms_source(&nested), Some(dir.path().join("cms.json")));
        assert!(load_rows(&dir.path().join("cms.json")).unwrap().is_empty());
    }

    #[test]
    fn test_csv_rows_feed_bundles() {
        let sheet = "lang,label,href,parent,order,col,enabled\n\
                     pl,Usługi,/pl/uslugi/,,1,,\n\
                     pl,Express,/pl/express/,Usługi,2.0,2,tak\n\
                     pl,Ukryte,/pl/x/,,3,,0\n";
        let rows = rows_from_csv(sheet, "cms.csv").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].parent.as_deref(), Some("Usługi"));
        assert_eq!(rows[1].order, Some(2));
        assert_eq!(rows[1].column, Some(2));
        assert!(!rows[2].enabled);

        let bundle = build_bundle_for_lang(&rows, "pl", NormalizeOptions::default());
        let labels: Vec<&str> = bundle.items.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["Usługi", "Express"]);
    }

    #[test]
    fn test_json_export_preferred_over_csv() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cms.csv"), "lang,label,href\npl,Blog,/pl/blog/\n").unwrap();
        assert_eq!(find_cms_source(dir.path()), Some(dir.path().join("cms.csv")));
        let rows = load_rows(&dir.path().join("cms.csv")).unwrap();
        assert_eq!(rows[0].label, "Blog");

        fs::write(dir.path().join("cms.json"), "[]").unwrap();
        assert_eq!(find_cms_source(dir.path()), Some(dir.path().join("cms.json")));
    }
}
