//! End-to-end behaviour of the hydration pipeline and the menu controller
//! against an in-memory page.

use pretty_assertions::assert_eq;
use std::sync::Arc;

use crate::cache::{CacheEntry, CacheGate, MemoryStorage};
use crate::config::HydratorConfig;
use crate::controller::{Key, MenuInput, MenuState};
use crate::dom::Document;
use crate::fetch::{FetchedSnapshot, StaticTransport};
use crate::hydrator::{ManualClock, NavEvent, NavSource, NavigationHydrator, RefreshOutcome};
use crate::normalize::{normalize, NavNode};
use crate::payload::{NavPayload, RawRow};

const HAPPY: &str = r#"{"items":[
    {"label":"Services","href":"/s/","parent":"","order":1},
    {"label":"Express","href":"/s/express/","parent":"Services","order":1}
]}"#;

const BUNDLE_URL: &str = "/assets/nav/bundle_en.json";
const PLAIN_URL: &str = "/assets/nav/en.json";

fn page() -> Document {
    Document::with_mounts(&["navList", "megaPanels", "mobileList"])
}

struct Harness {
    hydrator: NavigationHydrator,
    clock: ManualClock,
    storage: MemoryStorage,
    transport: Arc<StaticTransport>,
}

fn harness(transport: StaticTransport, storage: MemoryStorage, start_ms: u64) -> Harness {
    let clock = ManualClock::new(start_ms);
    let transport = Arc::new(transport);
    let hydrator = NavigationHydrator::new(
        HydratorConfig::default(),
        "en",
        Box::new(transport.clone()),
        Box::new(storage.clone()),
        Box::new(clock.clone()),
    );
    Harness {
        hydrator,
        clock,
        storage,
        transport,
    }
}

fn snapshot(body: &str) -> Option<FetchedSnapshot> {
    Some(FetchedSnapshot {
        url: BUNDLE_URL.to_string(),
        payload: NavPayload::from_json_str(body, BUNDLE_URL).unwrap(),
    })
}

fn top_bar_labels(doc: &Document) -> Vec<String> {
    doc.query("navList", |el| el.tag == "a" || el.tag == "button")
        .into_iter()
        .map(|el| el.text_content())
        .collect()
}

fn expanded_toggles(doc: &Document) -> usize {
    doc.query("navList", |el| el.attr("aria-expanded") == Some("true"))
        .len()
}

// ═══════════════════════════════════════════════════════════════════════════════
// HYDRATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn happy_path_renders_toggle_and_panel_link() {
    let mut h = harness(
        StaticTransport::new().with_body(BUNDLE_URL, HAPPY),
        MemoryStorage::new(),
        0,
    );
    let mut doc = page();
    let outcome = h.hydrator.hydrate(&mut doc);

    assert_eq!(outcome.source, NavSource::Network);
    assert_eq!(top_bar_labels(&doc), vec!["Services".to_string()]);
    let toggle = doc.find_by_id("nav-toggle-services").unwrap();
    assert_eq!(toggle.attr("aria-haspopup"), Some("true"));
    assert_eq!(toggle.attr("aria-expanded"), Some("false"));

    let links = doc.query("megaPanels", |el| el.tag == "a");
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].text_content(), "Express");
    assert_eq!(links[0].attr("href"), Some("/s/express/"));
}

#[test]
fn failed_fetch_with_fresh_cache_serves_cache() {
    let storage = MemoryStorage::new();
    let now = 10 * 60 * 1000;
    let cached = normalize(
        &[
            RawRow::new("Blog", "/en/blog/").with_order(1),
            RawRow::new("About", "/en/about/").with_order(2),
        ],
        "en",
    );
    CacheGate::new(Box::new(storage.clone()), HydratorConfig::default().cache)
        .write("en", &CacheEntry::new(now - 2 * 60 * 1000, cached, None));

    let transport = StaticTransport::new()
        .with_failure(BUNDLE_URL, "timed out")
        .with_response(PLAIN_URL, crate::fetch::TransportResponse::status(404));
    let mut h = harness(transport, storage, now);
    let mut doc = page();

    let outcome = h.hydrator.hydrate(&mut doc);
    assert_eq!(outcome.source, NavSource::Cache);
    assert_eq!(top_bar_labels(&doc), vec!["Blog".to_string(), "About".to_string()]);
    assert!(h.transport.requests().is_empty());

    // background revalidation fails on both candidates; the cached menu stays
    let before = doc.clone();
    h.clock.advance(600);
    assert_eq!(h.hydrator.poll(&mut doc), Some(RefreshOutcome::Failed));
    assert_eq!(h.transport.requests(), vec![BUNDLE_URL, PLAIN_URL]);
    assert_eq!(doc, before);
    assert!(doc.find_by_id("nav-link-contact").is_none());
}

#[test]
fn failed_fetch_without_cache_shows_fallback() {
    let transport = StaticTransport::new()
        .with_failure(BUNDLE_URL, "timed out")
        .with_failure(PLAIN_URL, "connection reset");
    let mut h = harness(transport, MemoryStorage::new(), 0);
    let mut doc = page();

    let outcome = h.hydrator.hydrate(&mut doc);
    assert_eq!(outcome.source, NavSource::Fallback);
    assert_eq!(
        top_bar_labels(&doc),
        vec!["Home".to_string(), "Contact".to_string()]
    );
    assert_eq!(doc.attribute("nav-link-home", "href"), Some("/"));
    assert_eq!(doc.attribute("nav-link-contact", "href"), Some("/en/kontakt/"));
    assert!(h.storage.is_empty());
}

#[test]
fn expired_cache_is_not_served_by_default() {
    let storage = MemoryStorage::new();
    let ttl = HydratorConfig::default().cache.ttl_ms;
    CacheGate::new(Box::new(storage.clone()), HydratorConfig::default().cache).write(
        "en",
        &CacheEntry::new(0, vec![NavNode::leaf("Blog", "/en/blog/", 1)], None),
    );
    let mut h = harness(StaticTransport::new(), storage, ttl + 1);
    assert_eq!(h.hydrator.hydrate(&mut page()).source, NavSource::Fallback);
}

#[test]
fn missing_mount_point_does_not_block_others() {
    let mut h = harness(
        StaticTransport::new().with_body(BUNDLE_URL, HAPPY),
        MemoryStorage::new(),
        0,
    );
    let mut doc = Document::with_mounts(&["navList", "mobileList"]);
    let outcome = h.hydrator.hydrate(&mut doc);
    assert_eq!(outcome.report.skipped, vec!["megaPanels".to_string()]);
    assert_eq!(top_bar_labels(&doc), vec!["Services".to_string()]);
    // toggle without a panel in the page is not bound
    assert_eq!(h.hydrator.controller().panels().count(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════════
// REVALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn revalidation_with_new_content_rerenders_and_rebinds() {
    let mut h = harness(
        StaticTransport::new().with_body(BUNDLE_URL, HAPPY),
        MemoryStorage::new(),
        0,
    );
    let mut doc = page();
    h.hydrator.hydrate(&mut doc);
    h.hydrator.drain_events();

    let updated = r#"{"version":"2","items":[
        {"label":"Services","href":"/s/","order":1},
        {"label":"Express","href":"/s/express/","parent":"Services"},
        {"label":"Blog","href":"/blog/","order":2}
    ]}"#;
    let ticket = h.hydrator.begin_refresh();
    let outcome = h.hydrator.apply_refresh(ticket, snapshot(updated), &mut doc);

    assert!(matches!(outcome, RefreshOutcome::Applied(_)));
    assert_eq!(
        top_bar_labels(&doc),
        vec!["Services".to_string(), "Blog".to_string()]
    );
    assert_eq!(h.hydrator.current_version(), Some("2"));
    assert_eq!(h.hydrator.controller().state(), &MenuState::Closed);
    let events = h.hydrator.drain_events();
    assert!(matches!(
        events.as_slice(),
        [NavEvent::Updated { source: NavSource::Network, version: Some(v), .. }] if v == "2"
    ));
    assert_eq!(
        h.hydrator.cache().read("en").unwrap().version.as_deref(),
        Some("2")
    );
}

#[test]
fn identical_revalidation_keeps_open_panel() {
    let mut h = harness(
        StaticTransport::new().with_body(BUNDLE_URL, HAPPY),
        MemoryStorage::new(),
        0,
    );
    let mut doc = page();
    h.hydrator.hydrate(&mut doc);
    h.hydrator.drain_events();
    h.hydrator.handle_input(
        MenuInput::Click {
            target: Some("nav-toggle-services".to_string()),
            inside_header: true,
        },
        &mut doc,
    );
    assert_eq!(h.hydrator.controller().open_panel(), Some("mega-services"));

    assert_eq!(h.hydrator.revalidate(&mut doc), RefreshOutcome::Unchanged);
    assert_eq!(h.hydrator.controller().open_panel(), Some("mega-services"));
    assert_eq!(doc.attribute("nav-toggle-services", "aria-expanded"), Some("true"));
    assert!(h.hydrator.drain_events().is_empty());
}

#[test]
fn older_refresh_never_overwrites_newer() {
    let mut h = harness(
        StaticTransport::new().with_body(BUNDLE_URL, HAPPY),
        MemoryStorage::new(),
        0,
    );
    let mut doc = page();
    h.hydrator.hydrate(&mut doc);

    let older = h.hydrator.begin_refresh();
    let newer = h.hydrator.begin_refresh();
    assert!(!h.hydrator.is_current(older));

    let newer_body = r#"{"version":"new","items":[{"label":"Newer","href":"/newer/"}]}"#;
    let older_body = r#"{"version":"old","items":[{"label":"Older","href":"/older/"}]}"#;
    assert!(matches!(
        h.hydrator.apply_refresh(newer, snapshot(newer_body), &mut doc),
        RefreshOutcome::Applied(_)
    ));
    assert_eq!(
        h.hydrator.apply_refresh(older, snapshot(older_body), &mut doc),
        RefreshOutcome::Superseded
    );
    assert_eq!(top_bar_labels(&doc), vec!["Newer".to_string()]);
    assert_eq!(h.hydrator.current_version(), Some("new"));
}

#[test]
fn starting_a_refresh_aborts_the_one_in_flight() {
    let mut h = harness(
        StaticTransport::new().with_body(BUNDLE_URL, HAPPY),
        MemoryStorage::new(),
        0,
    );
    let mut doc = page();
    h.hydrator.hydrate(&mut doc);
    let first = h.hydrator.begin_refresh();
    let _second = h.hydrator.begin_refresh();
    let requests_before = h.transport.requests().len();
    assert_eq!(
        h.hydrator.complete_refresh(first, &mut doc),
        RefreshOutcome::Superseded
    );
    assert_eq!(h.transport.requests().len(), requests_before);
}

// ═══════════════════════════════════════════════════════════════════════════════
// MENU BEHAVIOUR
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn keyboard_open_and_close_restores_focus() {
    let mut h = harness(
        StaticTransport::new().with_body(BUNDLE_URL, HAPPY),
        MemoryStorage::new(),
        0,
    );
    let mut doc = page();
    h.hydrator.hydrate(&mut doc);

    h.hydrator
        .handle_input(MenuInput::Focus("nav-toggle-services".to_string()), &mut doc);
    h.hydrator.handle_input(
        MenuInput::KeyDown {
            key: Key::from_dom("ArrowDown"),
            target: None,
        },
        &mut doc,
    );
    assert_eq!(doc.attribute("nav-toggle-services", "aria-expanded"), Some("true"));
    assert_eq!(doc.attribute("mega-services", "hidden"), None);
    assert_eq!(doc.focused(), Some("mega-services-link-0"));

    h.hydrator.handle_input(
        MenuInput::KeyDown {
            key: Key::from_dom("Escape"),
            target: None,
        },
        &mut doc,
    );
    assert_eq!(doc.attribute("nav-toggle-services", "aria-expanded"), Some("false"));
    assert_eq!(doc.attribute("mega-services", "aria-hidden"), Some("true"));
    assert_eq!(doc.focused(), Some("nav-toggle-services"));
}

#[test]
fn hover_switch_between_panels_keeps_one_open() {
    let body = r##"{"items":[
        {"label":"A","href":"#","order":1},
        {"label":"A1","href":"/a1/","parent":"A"},
        {"label":"B","href":"#","order":2},
        {"label":"B1","href":"/b1/","parent":"B"}
    ]}"##;
    let mut h = harness(
        StaticTransport::new().with_body(BUNDLE_URL, body),
        MemoryStorage::new(),
        0,
    );
    let mut doc = page();
    h.hydrator.hydrate(&mut doc);

    h.hydrator
        .handle_input(MenuInput::PointerEnterToggle("nav-toggle-a".to_string()), &mut doc);
    h.clock.advance(150);
    assert!(h.hydrator.tick(&mut doc));
    assert_eq!(expanded_toggles(&doc), 1);

    h.hydrator
        .handle_input(MenuInput::PointerLeaveToggle("nav-toggle-a".to_string()), &mut doc);
    h.hydrator
        .handle_input(MenuInput::PointerEnterToggle("nav-toggle-b".to_string()), &mut doc);
    assert_eq!(expanded_toggles(&doc), 1);
    h.clock.advance(150);
    h.hydrator.tick(&mut doc);

    assert_eq!(expanded_toggles(&doc), 1);
    assert_eq!(doc.attribute("nav-toggle-b", "aria-expanded"), Some("true"));
    assert_eq!(doc.attribute("mega-a", "hidden"), Some(""));
}

#[test]
fn prerendered_snapshot_is_injected_and_pruned() {
    let body = r#"{"primary_html":"<li data-panel=\"services\"><button class=\"mega-toggle\" id=\"t-services\" aria-controls=\"p-services\">Services</button></li><li><a href=\"/s/express/\">Express</a></li>","mega_html":"<div id=\"p-services\" class=\"mega\" hidden><a id=\"p-link\" href=\"/s/express/\">Express</a></div>"}"#;
    let mut h = harness(
        StaticTransport::new().with_body(BUNDLE_URL, body),
        MemoryStorage::new(),
        0,
    );
    let mut doc = page();
    h.hydrator.hydrate(&mut doc);

    assert_eq!(top_bar_labels(&doc), vec!["Services".to_string()]);
    assert_eq!(h.hydrator.controller().panels().collect::<Vec<_>>(), vec!["p-services"]);

    h.hydrator.handle_input(
        MenuInput::Click {
            target: Some("t-services".to_string()),
            inside_header: true,
        },
        &mut doc,
    );
    assert_eq!(doc.attribute("t-services", "aria-expanded"), Some("true"));
    assert_eq!(doc.attribute("p-services", "hidden"), None);
}
