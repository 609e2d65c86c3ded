//! Hydrator configuration.
//!
//! Every timing constant the menu scripts disagreed on (fetch timeouts, cache
//! TTLs, hover-intent delays) lives here instead of being baked into the
//! pipeline. All sections deserialize from camelCase JSON and fall back to
//! their defaults field by field.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::NavError;

/// Placeholder substituted with the language code in candidate URLs.
pub const LANG_PLACEHOLDER: &str = "{lang}";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchConfig {
    /// Candidate URL templates, tried in order.
    pub candidates: Vec<String>,
    pub timeout_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            candidates: vec![
                "/assets/nav/bundle_{lang}.json".to_string(),
                "/assets/nav/{lang}.json".to_string(),
            ],
            timeout_ms: 4_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    pub ttl_ms: u64,
    /// Schema tag baked into storage keys; bump it to orphan old entries.
    pub schema: String,
    /// Serve an expired entry when every candidate fails.
    pub serve_stale_on_failure: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 5 * 60 * 1000,
            schema: "v1".to_string(),
            serve_stale_on_failure: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MenuTiming {
    pub open_delay_ms: u64,
    pub close_delay_ms: u64,
    /// Delay before closing once the pointer leaves the hover corridor.
    /// Zero closes immediately.
    pub corridor_grace_ms: u64,
    /// Extra pixels accepted around the corridor edges.
    pub corridor_tolerance_px: f64,
}

impl Default for MenuTiming {
    fn default() -> Self {
        Self {
            open_delay_ms: 150,
            close_delay_ms: 300,
            corridor_grace_ms: 200,
            corridor_tolerance_px: 8.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderConfig {
    pub max_explicit_columns: usize,
    pub max_computed_columns: usize,
    pub items_per_column: usize,
    /// Site origin (`https://example.com`) for same-origin prefetch hints.
    pub origin: Option<String>,
    /// Path of the current page, used for `aria-current`.
    pub current_path: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_explicit_columns: 5,
            max_computed_columns: 4,
            items_per_column: 6,
            origin: None,
            current_path: None,
        }
    }
}

/// What to do with a group whose parent label has no top-level row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    #[default]
    Drop,
    /// Create the parent with href `/{lang}/{slug}/`.
    Synthesize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FallbackLink {
    pub label: String,
    /// May contain `{lang}`.
    pub href: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MountTargets {
    pub top_bar: String,
    pub panel_container: String,
    pub mobile_list: String,
    /// Language switcher, only filled by pre-rendered payloads.
    pub langs: Option<String>,
}

impl Default for MountTargets {
    fn default() -> Self {
        Self {
            top_bar: "navList".to_string(),
            panel_container: "megaPanels".to_string(),
            mobile_list: "mobileList".to_string(),
            langs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct HydratorConfig {
    pub fetch: FetchConfig,
    pub cache: CacheConfig,
    pub menu: MenuTiming,
    pub render: RenderConfig,
    pub targets: MountTargets,
    pub orphan_policy: OrphanPolicy,
    pub revalidate_interval_ms: u64,
    pub initial_revalidate_delay_ms: u64,
    pub fallback_menu: Vec<FallbackLink>,
}

impl Default for HydratorConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            cache: CacheConfig::default(),
            menu: MenuTiming::default(),
            render: RenderConfig::default(),
            targets: MountTargets::default(),
            orphan_policy: OrphanPolicy::default(),
            revalidate_interval_ms: 5 * 60 * 1000,
            initial_revalidate_delay_ms: 600,
            fallback_menu: vec![
                FallbackLink {
                    label: "Home".to_string(),
                    href: "/".to_string(),
                },
                FallbackLink {
                    label: "Contact".to_string(),
                    href: "/{lang}/kontakt/".to_string(),
                },
            ],
        }
    }
}

impl HydratorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, NavError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| NavError::Config(format!("cannot parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, NavError> {
        let data =
            fs::read_to_string(path).map_err(|e| NavError::io(path.display().to_string(), e))?;
        Self::from_json_str(&data)
    }

    pub fn validate(&self) -> Result<(), NavError> {
        if self.fetch.candidates.is_empty() {
            return Err(NavError::Config(
                "fetch.candidates must list at least one URL".to_string(),
            ));
        }
        if self.fetch.timeout_ms == 0 {
            return Err(NavError::Config("fetch.timeoutMs must be positive".to_string()));
        }
        if self.cache.ttl_ms == 0 {
            return Err(NavError::Config("cache.ttlMs must be positive".to_string()));
        }
        if self.revalidate_interval_ms == 0 {
            return Err(NavError::Config(
                "revalidateIntervalMs must be positive".to_string(),
            ));
        }
        for candidate in &self.fetch.candidates {
            if !candidate.contains(LANG_PLACEHOLDER) {
                tracing::warn!(
                    candidate = candidate.as_str(),
                    "candidate URL has no {{lang}} placeholder; every language shares it"
                );
            }
        }
        Ok(())
    }
}

/// Substitute `{lang}` in a URL or href template.
pub fn expand_template(template: &str, lang: &str) -> String {
    template.replace(LANG_PLACEHOLDER, lang)
}
