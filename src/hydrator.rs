//! # Navigation Hydration
//!
//! The pipeline tying fetch, normalization, cache, rendering and the
//! mega-menu controller together for one page language.
//!
//! ## Source precedence
//!
//! 1. Fresh cache entry (then revalidate in the background)
//! 2. First valid candidate snapshot
//! 3. Expired cache entry, only with `serveStaleOnFailure`
//! 4. Configured fallback menu
//!
//! ## Ordering
//!
//! Every refresh holds a [`RefreshTicket`]. Issuing a ticket aborts all
//! older ones, so a slow response can never overwrite a render made from a
//! newer one. Nothing here returns an error to the host; failures degrade
//! to the next source and are logged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cache::{CacheEntry, CacheGate, CacheStorage};
use crate::config::{expand_template, HydratorConfig};
use crate::controller::{MegaMenuController, MenuInput};
use crate::dom::Document;
use crate::fetch::{FetchedSnapshot, SnapshotFetcher, Transport};
use crate::normalize::{normalize_with, NavNode, NavTree, NormalizeOptions};
use crate::payload::NavPayload;
use crate::render::{render, render_prerendered, RenderReport};

// ═══════════════════════════════════════════════════════════════════════════════
// TIME
// ═══════════════════════════════════════════════════════════════════════════════

pub trait Clock {
    fn now_ms(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

/// Host-driven clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self(Arc::new(AtomicU64::new(start_ms)))
    }

    pub fn set(&self, now_ms: u64) {
        self.0.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.0.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTCOMES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavSource {
    Cache,
    Network,
    StaleCache,
    Fallback,
}

/// Signal for other page scripts that the menu markup changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavEvent {
    Updated {
        lang: String,
        version: Option<String>,
        source: NavSource,
        fingerprint: String,
    },
}

impl NavEvent {
    /// DOM event name the host dispatches.
    pub fn name(&self) -> &'static str {
        match self {
            NavEvent::Updated { .. } => "nav:updated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HydrateOutcome {
    pub source: NavSource,
    pub version: Option<String>,
    pub report: RenderReport,
    /// When the first background revalidation is due.
    pub revalidate_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefreshTicket {
    seq: u64,
}

impl RefreshTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New content was rendered.
    Applied(RenderReport),
    /// Same version or identical markup; the page was left alone.
    Unchanged,
    /// A newer refresh was started; this one was dropped.
    Superseded,
    /// No source produced data; the current menu stays.
    Failed,
}

#[derive(Debug, Clone)]
struct Rendered {
    version: Option<String>,
    fingerprint: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// HYDRATOR
// ═══════════════════════════════════════════════════════════════════════════════

pub struct NavigationHydrator {
    config: HydratorConfig,
    lang: String,
    fetcher: SnapshotFetcher,
    cache: CacheGate,
    clock: Box<dyn Clock>,
    controller: MegaMenuController,
    current: Option<Rendered>,
    latest_issued: u64,
    next_revalidate_at: Option<u64>,
    events: Vec<NavEvent>,
}

impl NavigationHydrator {
    pub fn new(
        config: HydratorConfig,
        lang: &str,
        transport: Box<dyn Transport>,
        storage: Box<dyn CacheStorage>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let fetcher = SnapshotFetcher::new(transport, config.fetch.clone());
        let cache = CacheGate::new(storage, config.cache.clone());
        let controller = MegaMenuController::new(config.menu.clone());
        Self {
            config,
            lang: lang.to_string(),
            fetcher,
            cache,
            clock,
            controller,
            current: None,
            latest_issued: 0,
            next_revalidate_at: None,
            events: Vec::new(),
        }
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }

    pub fn cache(&self) -> &CacheGate {
        &self.cache
    }

    pub fn controller(&self) -> &MegaMenuController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut MegaMenuController {
        &mut self.controller
    }

    /// Version of what is currently on the page.
    pub fn current_version(&self) -> Option<&str> {
        self.current.as_ref().and_then(|c| c.version.as_deref())
    }

    /// First load. Always renders something.
    pub fn hydrate(&mut self, doc: &mut Document) -> HydrateOutcome {
        let now = self.clock.now_ms();
        // anything still in flight is older than this load
        self.issue();

        let (source, version, report) = if let Some(entry) = self.cache.read_fresh(&self.lang, now) {
            tracing::debug!(lang = self.lang.as_str(), "serving fresh cached navigation");
            let report = self.render_tree(&entry.payload, doc);
            (NavSource::Cache, entry.version, report)
        } else if let Some((version, report)) = self
            .fetcher
            .fetch(&self.lang)
            .and_then(|snapshot| self.apply_snapshot(snapshot, now, doc))
        {
            (NavSource::Network, version, report)
        } else if let Some(entry) = self.stale_entry() {
            tracing::info!(lang = self.lang.as_str(), "serving expired cached navigation");
            let report = self.render_tree(&entry.payload, doc);
            (NavSource::StaleCache, entry.version, report)
        } else {
            tracing::warn!(lang = self.lang.as_str(), "rendering fallback navigation");
            let tree = self.fallback_tree();
            (NavSource::Fallback, None, self.render_tree(&tree, doc))
        };

        self.finish_render(source, version.clone(), &report, doc);
        let revalidate_at = now + self.config.initial_revalidate_delay_ms;
        self.next_revalidate_at = Some(revalidate_at);

        HydrateOutcome {
            source,
            version,
            report,
            revalidate_at,
        }
    }

    /// Start a refresh. Every older ticket is aborted.
    pub fn begin_refresh(&mut self) -> RefreshTicket {
        RefreshTicket { seq: self.issue() }
    }

    pub fn is_current(&self, ticket: RefreshTicket) -> bool {
        ticket.seq == self.latest_issued
    }

    /// Fetch and apply for `ticket`.
    pub fn complete_refresh(&mut self, ticket: RefreshTicket, doc: &mut Document) -> RefreshOutcome {
        if !self.is_current(ticket) {
            return RefreshOutcome::Superseded;
        }
        let fetched = self.fetcher.fetch(&self.lang);
        self.apply_refresh(ticket, fetched, doc)
    }

    /// Apply a snapshot fetched by the host for `ticket`.
    ///
    /// The new markup is rendered into a copy of the page first and only
    /// swapped in when its fingerprint differs, so an unchanged menu keeps
    /// its open panel and focus.
    pub fn apply_refresh(
        &mut self,
        ticket: RefreshTicket,
        fetched: Option<FetchedSnapshot>,
        doc: &mut Document,
    ) -> RefreshOutcome {
        if !self.is_current(ticket) {
            tracing::debug!(seq = ticket.seq, latest = self.latest_issued, "refresh superseded");
            return RefreshOutcome::Superseded;
        }
        let Some(snapshot) = fetched else {
            return RefreshOutcome::Failed;
        };

        let incoming = snapshot.payload.version().map(str::to_string);
        if let (Some(new), Some(old)) = (&incoming, self.current_version()) {
            if new == old {
                self.touch_cache(&snapshot.payload);
                return RefreshOutcome::Unchanged;
            }
        }

        let now = self.clock.now_ms();
        let mut scratch = doc.clone();
        let Some((version, report)) = self.apply_snapshot(snapshot, now, &mut scratch) else {
            return RefreshOutcome::Failed;
        };

        if self.current.as_ref().map(|c| c.fingerprint.as_str()) == Some(report.fingerprint.as_str()) {
            if let Some(current) = self.current.as_mut() {
                current.version = version;
            }
            return RefreshOutcome::Unchanged;
        }

        *doc = scratch;
        self.finish_render(NavSource::Network, version, &report, doc);
        RefreshOutcome::Applied(report)
    }

    pub fn revalidate(&mut self, doc: &mut Document) -> RefreshOutcome {
        let ticket = self.begin_refresh();
        self.complete_refresh(ticket, doc)
    }

    /// Run the periodic revalidation when due.
    pub fn poll(&mut self, doc: &mut Document) -> Option<RefreshOutcome> {
        let now = self.clock.now_ms();
        let due = self.next_revalidate_at?;
        if now < due {
            return None;
        }
        self.next_revalidate_at = Some(now + self.config.revalidate_interval_ms);
        Some(self.revalidate(doc))
    }

    /// Earliest time the host should call back: controller timers or the
    /// next revalidation.
    pub fn next_wakeup(&self) -> Option<u64> {
        match (self.controller.next_deadline(), self.next_revalidate_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Forward a UI event to the controller at the current time.
    pub fn handle_input(&mut self, input: MenuInput, doc: &mut Document) {
        let now = self.clock.now_ms();
        self.controller.handle(input, doc, now);
    }

    pub fn tick(&mut self, doc: &mut Document) -> bool {
        let now = self.clock.now_ms();
        self.controller.tick(doc, now)
    }

    pub fn drain_events(&mut self) -> Vec<NavEvent> {
        std::mem::take(&mut self.events)
    }

    // ───────────────────────────────────────────────────────────────────────

    fn issue(&mut self) -> u64 {
        self.latest_issued += 1;
        self.latest_issued
    }

    /// Normalize, cache and render a snapshot. `None` when it yields nothing
    /// to show.
    fn apply_snapshot(
        &mut self,
        snapshot: FetchedSnapshot,
        now: u64,
        doc: &mut Document,
    ) -> Option<(Option<String>, RenderReport)> {
        let version = snapshot.payload.version().map(str::to_string);
        match snapshot.payload {
            NavPayload::RowBased(payload) => {
                let tree = normalize_with(&payload.items, &self.lang, self.normalize_options());
                if tree.is_empty() {
                    tracing::warn!(url = snapshot.url.as_str(), "snapshot has no entries for this language");
                    return None;
                }
                self.cache
                    .write(&self.lang, &CacheEntry::new(now, tree.clone(), version.clone()));
                Some((version, self.render_tree(&tree, doc)))
            }
            NavPayload::Prerendered(payload) => {
                match render_prerendered(&payload, &self.config.targets, doc) {
                    Ok(report) => Some((version, report)),
                    Err(e) => {
                        tracing::warn!(code = e.code(), "pre-rendered snapshot rejected: {}", e);
                        None
                    }
                }
            }
        }
    }

    /// Re-stamp the cached tree after a revalidation that found the same
    /// version.
    fn touch_cache(&self, payload: &NavPayload) {
        if let NavPayload::RowBased(rows) = payload {
            let tree = normalize_with(&rows.items, &self.lang, self.normalize_options());
            if !tree.is_empty() {
                let entry = CacheEntry::new(self.clock.now_ms(), tree, rows.version.clone());
                self.cache.write(&self.lang, &entry);
            }
        }
    }

    fn stale_entry(&self) -> Option<CacheEntry> {
        if !self.config.cache.serve_stale_on_failure {
            return None;
        }
        self.cache.read(&self.lang).filter(|e| !e.payload.is_empty())
    }

    fn fallback_tree(&self) -> NavTree {
        self.config
            .fallback_menu
            .iter()
            .enumerate()
            .map(|(i, link)| {
                NavNode::leaf(&link.label, &expand_template(&link.href, &self.lang), i as i64)
            })
            .collect()
    }

    fn render_tree(&self, tree: &NavTree, doc: &mut Document) -> RenderReport {
        render(tree, &self.config.targets, doc, &self.config.render)
    }

    fn finish_render(
        &mut self,
        source: NavSource,
        version: Option<String>,
        report: &RenderReport,
        doc: &mut Document,
    ) {
        self.controller.bind(doc, &self.config.targets.top_bar);
        self.current = Some(Rendered {
            version: version.clone(),
            fingerprint: report.fingerprint.clone(),
        });
        self.events.push(NavEvent::Updated {
            lang: self.lang.clone(),
            version,
            source,
            fingerprint: report.fingerprint.clone(),
        });
    }

    fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            orphan_policy: self.config.orphan_policy,
        }
    }
}
