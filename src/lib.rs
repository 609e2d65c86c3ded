//! # Navigation Hydration Core
//!
//! Loads the site navigation for one language, renders it into three mount
//! points (top bar, mega panels, mobile drawer) and drives the mega-menu
//! open/close state.
//!
//! ## Pipeline
//!
//! `fetch` → `payload` → `normalize` → `cache` → `render` → `controller`
//!
//! The browser is a host: it supplies time, geometry and input events, and
//! mirrors the in-memory [`dom::Document`] onto the page. Every decision is
//! made here.
//!
//! ## Invariants
//!
//! 1. **Tree shape**: the canonical tree is two levels deep and has no
//!    duplicate `(label, href, parent)` triple. A label used as a group key
//!    is always a parent, never also a standalone link.
//!
//! 2. **Deterministic render**: the same tree always produces the same
//!    markup, so the render fingerprint is a valid change detector.
//!
//! 3. **Single open panel**: at most one toggle carries
//!    `aria-expanded="true"`, and only the controller writes it.
//!
//! 4. **Last fetch wins**: a refresh older than the newest one started
//!    never renders.
//!
//! 5. **Never throw at the page**: fetch, payload, storage and mount
//!    failures degrade (next candidate, cache, fallback menu, skipped target)
//!    and are only logged. Error codes live in [`error`].

#[cfg(feature = "napi")]
use napi_derive::napi;

pub mod bundle;
pub mod cache;
pub mod config;
pub mod controller;
pub mod dom;
pub mod error;
pub mod fetch;
pub mod html_import;
pub mod hydrator;
pub mod normalize;
pub mod payload;
pub mod render;
pub mod sanitize;

#[cfg(test)]
mod scenario_tests;

pub use cache::{CacheEntry, CacheGate, CacheStorage, FsStorage, MemoryStorage};
pub use config::{HydratorConfig, MenuTiming, MountTargets, OrphanPolicy, RenderConfig};
pub use controller::{toggle_disclosure, Key, MegaMenuController, MenuInput, MenuState, Point, Rect};
pub use dom::{Document, ElementNode, Node};
pub use error::NavError;
pub use fetch::{FetchedSnapshot, FsTransport, SnapshotFetcher, StaticTransport, Transport};
#[cfg(feature = "http")]
pub use fetch::HttpTransport;
pub use hydrator::{
    Clock, HydrateOutcome, ManualClock, NavEvent, NavSource, NavigationHydrator, RefreshOutcome,
    RefreshTicket, SystemClock,
};
pub use normalize::{flatten, normalize, normalize_with, NavNode, NavTree, NormalizeOptions};
pub use payload::{NavPayload, PrerenderedPayload, RawRow, RowBasedPayload};
pub use render::{render, render_prerendered, RenderReport, RenderedMenu};

#[cfg(feature = "napi")]
pub use bundle::build_bundle_native;

/// Server-side render of a row payload: JSON in, the three mount points'
/// markup out.
pub fn render_nav_html(
    payload_json: &str,
    lang: &str,
    config: &HydratorConfig,
) -> Result<RenderedMenu, NavError> {
    match NavPayload::from_json_str(payload_json, "payload_json")? {
        NavPayload::RowBased(payload) => {
            let options = NormalizeOptions {
                orphan_policy: config.orphan_policy,
            };
            let tree = normalize_with(&payload.items, lang, options);
            Ok(render::build_menu(&tree, &config.render))
        }
        NavPayload::Prerendered(_) => Err(NavError::payload(
            "payload_json",
            "pre-rendered markup is already HTML",
        )),
    }
}

#[cfg(feature = "napi")]
#[napi]
pub fn render_nav_html_native(
    payload_json: String,
    lang: String,
    config_json: Option<String>,
) -> napi::Result<serde_json::Value> {
    let config = match config_json {
        Some(json) => HydratorConfig::from_json_str(&json),
        None => Ok(HydratorConfig::default()),
    }
    .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    let menu = render_nav_html(&payload_json, &lang, &config)
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    Ok(serde_json::json!({
        "topBar": menu.top_bar_html(),
        "panels": menu.panels_html(),
        "mobile": menu.mobile_html(),
    }))
}
