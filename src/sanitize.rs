//! Cell-level cleanup for CMS rows: labels, hrefs, slugs and the loosely
//! typed spreadsheet values (`"TRUE"`, `"2.0"`, `""`) editors put in them.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

pub const MAX_LABEL_CHARS: usize = 120;
pub const DEFAULT_ORDER: i64 = 999;

const SAFE_PREFIXES: &[&str] = &["http://", "https://", "/", "#", "mailto:", "tel:"];

const FALSE_WORDS: &[&str] = &["false", "0", "no", "n", "off", "nie"];

lazy_static! {
    static ref NON_SLUG_RE: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
}

/// ASCII slug: NFKD-folded, lowercase, runs of other characters collapsed to `-`.
pub fn slugify(s: &str) -> String {
    let folded: String = s
        .chars()
        .map(fold_stroked)
        .collect::<String>()
        .nfkd()
        .filter(|c| c.is_ascii())
        .collect::<String>()
        .to_lowercase();
    let slug = NON_SLUG_RE
        .replace_all(&folded, "-")
        .trim_matches('-')
        .to_string();
    if slug.is_empty() {
        "item".to_string()
    } else {
        slug
    }
}

// Letters NFKD leaves alone.
fn fold_stroked(c: char) -> char {
    match c {
        'ł' => 'l',
        'Ł' => 'L',
        'đ' => 'd',
        'Đ' => 'D',
        'ø' => 'o',
        'Ø' => 'O',
        _ => c,
    }
}

/// Trim and cap a label at [`MAX_LABEL_CHARS`] characters.
pub fn sanitize_label(raw: &str) -> String {
    let capped: String = raw.trim().chars().take(MAX_LABEL_CHARS).collect();
    capped.trim_end().to_string()
}

/// Clean an href coming from the CMS.
///
/// Empty hrefs stay empty (callers drop those rows). Hrefs outside the
/// allowed schemes are replaced by the language-scoped slug route. Internal
/// paths get a trailing slash before any query or fragment.
pub fn sanitize_href(raw: &str, lang: &str, label: &str) -> String {
    let href = raw.trim();
    if href.is_empty() {
        return String::new();
    }
    if !SAFE_PREFIXES.iter().any(|p| href.starts_with(p)) {
        return slug_route(lang, label);
    }
    if href.starts_with('/') && !href.starts_with("//") {
        return ensure_trailing_slash(href);
    }
    href.to_string()
}

/// `/{lang}/{slug}/`, the canonical route for a label without a usable href.
pub fn slug_route(lang: &str, label: &str) -> String {
    format!("/{}/{}/", lang, slugify(label))
}

fn ensure_trailing_slash(href: &str) -> String {
    let split = href.find(|c: char| c == '?' || c == '#').unwrap_or(href.len());
    let (path, rest) = href.split_at(split);
    if path.ends_with('/') {
        return href.to_string();
    }
    let last_segment = path.rsplit('/').next().unwrap_or("");
    if last_segment.contains('.') {
        // file-like path (`/cennik.pdf`)
        return href.to_string();
    }
    format!("{}/{}", path, rest)
}

/// Compare two paths ignoring trailing slashes.
pub fn same_path(a: &str, b: &str) -> bool {
    fn trim(p: &str) -> &str {
        let p = p.split(|c: char| c == '?' || c == '#').next().unwrap_or("");
        let t = p.trim_end_matches('/');
        if t.is_empty() {
            "/"
        } else {
            t
        }
    }
    trim(a) == trim(b)
}

/// Whether a row's `enabled` cell allows it. Missing and null mean enabled.
pub fn parse_enabled(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Some(Value::String(s)) => {
            let s = s.trim().to_lowercase();
            !FALSE_WORDS.contains(&s.as_str())
        }
        Some(_) => true,
    }
}

/// Parse an integer cell that may be a number or a numeric string.
pub fn parse_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Render a scalar cell as text. Numbers are common in label columns.
pub fn cell_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Escape text for HTML element content and attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
