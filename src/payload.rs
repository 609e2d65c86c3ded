//! Payload dialects served by the CMS endpoint and the static snapshots.
//!
//! The boundary check happens once, here: a JSON body either becomes a
//! [`NavPayload`] or a `MalformedPayload` error. Nothing past this module
//! looks at raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::convert::TryFrom;

use crate::error::NavError;
use crate::sanitize::{cell_text, parse_enabled, parse_int};

/// One row as authored in the CMS sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct RawRow {
    pub label: String,
    pub href: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(rename = "col", skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl RawRow {
    pub fn new(label: &str, href: &str) -> Self {
        Self {
            label: label.to_string(),
            href: href.to_string(),
            parent: None,
            order: None,
            column: None,
            enabled: true,
            lang: None,
        }
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_column(mut self, column: u32) -> Self {
        self.column = Some(column);
        self
    }

    pub fn with_lang(mut self, lang: &str) -> Self {
        self.lang = Some(lang.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    fn from_object(obj: &Map<String, Value>) -> Self {
        let text = |key: &str| -> Option<String> {
            let s = cell_text(obj.get(key));
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        };
        Self {
            label: cell_text(obj.get("label")),
            href: cell_text(obj.get("href")),
            parent: text("parent"),
            order: parse_int(obj.get("order")),
            column: parse_int(obj.get("col").or_else(|| obj.get("column")))
                .filter(|c| *c > 0)
                .map(|c| c.min(u32::MAX as i64) as u32),
            enabled: parse_enabled(obj.get("enabled")),
            lang: text("lang").map(|l| l.to_lowercase()),
        }
    }
}

impl TryFrom<Value> for RawRow {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(obj) => Ok(Self::from_object(&obj)),
            other => Err(format!("expected a row object, got {}", json_kind(&other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowBasedPayload {
    pub items: Vec<RawRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrerenderedPayload {
    #[serde(default)]
    pub primary_html: Option<String>,
    #[serde(default)]
    pub mega_html: Option<String>,
    #[serde(default)]
    pub langs_html: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// The two payload dialects, discriminated at the fetch boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavPayload {
    RowBased(RowBasedPayload),
    /// Legacy markup snapshot; bypasses normalization and rendering.
    Prerendered(PrerenderedPayload),
}

impl NavPayload {
    pub fn from_json_str(body: &str, source_name: &str) -> Result<Self, NavError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| NavError::payload(source_name, format!("invalid JSON: {}", e)))?;
        Self::from_value(&value, source_name)
    }

    /// Shape check and dialect detection.
    ///
    /// Accepted shapes: `{items: [...]}` (flat rows or nested items with
    /// `children`/`cols`), `{nav: [...]}`, `{primary_html | mega_html}` and the
    /// same markup wrapped in `{nav_current: {...}}`.
    pub fn from_value(value: &Value, source_name: &str) -> Result<Self, NavError> {
        let obj = value.as_object().ok_or_else(|| {
            NavError::payload(
                source_name,
                format!("expected an object, got {}", json_kind(value)),
            )
        })?;
        let version = obj
            .get("version")
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        if let Some(items) = obj
            .get("items")
            .and_then(Value::as_array)
            .or_else(|| obj.get("nav").and_then(Value::as_array))
        {
            let mut rows = Vec::with_capacity(items.len());
            for item in items {
                collect_rows(item, None, None, &mut rows);
            }
            return Ok(NavPayload::RowBased(RowBasedPayload {
                items: rows,
                version,
            }));
        }

        let markup = obj
            .get("nav_current")
            .and_then(Value::as_object)
            .unwrap_or(obj);
        let html = |key: &str| markup.get(key).and_then(Value::as_str).map(str::to_string);
        let primary_html = html("primary_html");
        let mega_html = html("mega_html");
        if primary_html.is_some() || mega_html.is_some() {
            return Ok(NavPayload::Prerendered(PrerenderedPayload {
                primary_html,
                mega_html,
                langs_html: html("langs_html"),
                version,
            }));
        }

        Err(NavError::payload(
            source_name,
            "no items[], nav[], primary_html or mega_html",
        ))
    }

    pub fn version(&self) -> Option<&str> {
        match self {
            NavPayload::RowBased(p) => p.version.as_deref(),
            NavPayload::Prerendered(p) => p.version.as_deref(),
        }
    }

    pub fn set_version_if_missing(&mut self, version: Option<String>) {
        let slot = match self {
            NavPayload::RowBased(p) => &mut p.version,
            NavPayload::Prerendered(p) => &mut p.version,
        };
        if slot.is_none() {
            *slot = version;
        }
    }
}

/// Flatten one item, expanding nested `children` or `cols` into rows whose
/// parent is the item's label.
fn collect_rows(item: &Value, parent: Option<&str>, column: Option<u32>, out: &mut Vec<RawRow>) {
    let obj = match item.as_object() {
        Some(obj) => obj,
        None => {
            tracing::debug!(kind = json_kind(item), "skipping non-object nav row");
            return;
        }
    };
    let mut row = RawRow::from_object(obj);
    if row.parent.is_none() {
        row.parent = parent.map(str::to_string);
    }
    if row.column.is_none() {
        row.column = column;
    }
    let label = row.label.trim().to_string();
    let lang = row.lang.clone();
    out.push(row);

    let inherit_lang = |rows: &mut [RawRow]| {
        for r in rows.iter_mut() {
            if r.lang.is_none() {
                r.lang = lang.clone();
            }
        }
    };

    if let Some(children) = obj.get("children").and_then(Value::as_array) {
        let start = out.len();
        for child in children {
            collect_rows(child, Some(&label), None, out);
        }
        inherit_lang(&mut out[start..]);
    }
    if let Some(cols) = obj.get("cols").and_then(Value::as_array) {
        let start = out.len();
        for (idx, col) in cols.iter().enumerate() {
            let col_no = Some(idx as u32 + 1);
            let entries = match col {
                Value::Array(entries) => Some(entries),
                Value::Object(o) => o.get("items").and_then(Value::as_array),
                _ => None,
            };
            for entry in entries.into_iter().flatten() {
                collect_rows(entry, Some(&label), col_no, out);
            }
        }
        inherit_lang(&mut out[start..]);
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
