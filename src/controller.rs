//! # Mega-Menu Controller
//!
//! Finite-state machine deciding which single panel is visible.
//!
//! ## States
//!
//! - `Closed`
//! - `OpenPending(panel)`: hover-intent timer running
//! - `Open(panel)`
//!
//! ## Invariants
//!
//! 1. **Single open**: at most one toggle has `aria-expanded="true"`.
//!    Opening a panel hides every other panel in the same call, before the
//!    new one is shown.
//! 2. **Explicit time**: every timer is a deadline in host milliseconds.
//!    Nothing fires until [`MegaMenuController::tick`] is called with a time
//!    past it, and cancelling a timer is clearing its deadline.
//! 3. **Focus restoration**: `Escape` returns focus to the toggle that
//!    opened the panel; focus never stays inside a hidden panel.
//! 4. **Ownership**: only this controller writes `aria-expanded`, `hidden`
//!    and `aria-hidden` on toggles and panels.

use std::collections::HashMap;

use crate::config::MenuTiming;
use crate::dom::{Document, ElementNode, Node};
use crate::render::{PANEL_CLASS, TOGGLE_CLASS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuState {
    Closed,
    OpenPending { panel: String },
    Open { panel: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }
}

/// Whether `p` lies in the trapezoid joining the toggle's bottom edge to the
/// panel's top edge, widened by `tolerance` pixels.
pub fn in_corridor(toggle: &Rect, panel: &Rect, p: Point, tolerance: f64) -> bool {
    let y0 = toggle.bottom();
    let y1 = panel.y;
    if (y1 - y0).abs() < f64::EPSILON {
        let left = toggle.x.min(panel.x) - tolerance;
        let right = toggle.right().max(panel.right()) + tolerance;
        return (p.y - y0).abs() <= tolerance && p.x >= left && p.x <= right;
    }
    let (lo, hi) = if y0 < y1 { (y0, y1) } else { (y1, y0) };
    if p.y < lo - tolerance || p.y > hi + tolerance {
        return false;
    }
    let f = ((p.y - y0) / (y1 - y0)).clamp(0.0, 1.0);
    let left = toggle.x + f * (panel.x - toggle.x) - tolerance;
    let right = toggle.right() + f * (panel.right() - toggle.right()) + tolerance;
    p.x >= left && p.x <= right
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowDown,
    ArrowUp,
    ArrowLeft,
    ArrowRight,
    Escape,
    Enter,
    Space,
    Tab,
    Other,
}

impl Key {
    /// Map a DOM `KeyboardEvent.key` value.
    pub fn from_dom(key: &str) -> Self {
        match key {
            "ArrowDown" | "Down" => Key::ArrowDown,
            "ArrowUp" | "Up" => Key::ArrowUp,
            "ArrowLeft" | "Left" => Key::ArrowLeft,
            "ArrowRight" | "Right" => Key::ArrowRight,
            "Escape" | "Esc" => Key::Escape,
            "Enter" => Key::Enter,
            " " | "Spacebar" => Key::Space,
            "Tab" => Key::Tab,
            _ => Key::Other,
        }
    }
}

/// Host events, already resolved to element ids.
#[derive(Debug, Clone, PartialEq)]
pub enum MenuInput {
    PointerEnterToggle(String),
    PointerLeaveToggle(String),
    PointerEnterPanel(String),
    PointerLeavePanel(String),
    PointerMove(Point),
    Focus(String),
    Blur(String),
    /// `target` defaults to the focused element.
    KeyDown { key: Key, target: Option<String> },
    Click {
        target: Option<String>,
        inside_header: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    toggle: String,
    panel: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Zone {
    Outside,
    Toggle,
    Panel,
}

#[derive(Debug)]
pub struct MegaMenuController {
    timing: MenuTiming,
    bindings: Vec<Binding>,
    top_items: Vec<String>,
    state: MenuState,
    /// Panel currently shown; lags `state` while a switch is pending.
    displayed: Option<String>,
    opened_by: Option<String>,
    open_deadline: Option<u64>,
    close_deadline: Option<u64>,
    zone: Zone,
    geometry: HashMap<String, Rect>,
}

impl MegaMenuController {
    pub fn new(timing: MenuTiming) -> Self {
        Self {
            timing,
            bindings: Vec::new(),
            top_items: Vec::new(),
            state: MenuState::Closed,
            displayed: None,
            opened_by: None,
            open_deadline: None,
            close_deadline: None,
            zone: Zone::Outside,
            geometry: HashMap::new(),
        }
    }

    /// Discover toggles and panels after a render and reset to `Closed`.
    ///
    /// Toggles are `.mega-toggle` elements with `aria-controls` pointing at
    /// an element present in the document. Top-bar focus order is every
    /// id-carrying link or toggle in `top_bar`, skipping panel subtrees.
    pub fn bind(&mut self, doc: &mut Document, top_bar: &str) {
        self.bindings = doc
            .query(top_bar, |el| el.has_class(TOGGLE_CLASS) && el.id().is_some())
            .into_iter()
            .filter_map(|el| {
                let toggle = el.id()?.to_string();
                let panel = el.attr("aria-controls")?.to_string();
                Some(Binding { toggle, panel })
            })
            .filter(|b| doc.find_by_id(&b.panel).is_some())
            .collect();

        self.top_items.clear();
        if let Some(nodes) = doc.mount(top_bar) {
            collect_top_items(nodes, &mut self.top_items);
        }

        self.state = MenuState::Closed;
        self.displayed = None;
        self.opened_by = None;
        self.open_deadline = None;
        self.close_deadline = None;
        self.zone = Zone::Outside;
        self.geometry.clear();
        self.hide_all(doc);

        tracing::debug!(
            toggles = self.bindings.len(),
            top_items = self.top_items.len(),
            "mega-menu bound"
        );
    }

    pub fn state(&self) -> &MenuState {
        &self.state
    }

    /// Panel currently visible, if any.
    pub fn open_panel(&self) -> Option<&str> {
        self.displayed.as_deref()
    }

    pub fn panels(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|b| b.panel.as_str())
    }

    /// Earliest pending deadline, for the host's timer.
    pub fn next_deadline(&self) -> Option<u64> {
        match (self.open_deadline, self.close_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Layout box of a toggle or panel, reported by the host.
    pub fn set_geometry(&mut self, id: &str, rect: Rect) {
        self.geometry.insert(id.to_string(), rect);
    }

    // ───────────────────────────────────────────────────────────────────────
    // Transitions
    // ───────────────────────────────────────────────────────────────────────

    /// `Closed | Open(other) → OpenPending(panel)`.
    pub fn request_open(&mut self, panel: &str, now: u64) {
        if !self.knows_panel(panel) {
            return;
        }
        self.cancel_close();
        if self.displayed.as_deref() == Some(panel) {
            self.open_deadline = None;
            self.state = MenuState::Open {
                panel: panel.to_string(),
            };
            return;
        }
        if let MenuState::OpenPending { panel: pending } = &self.state {
            if pending == panel {
                return;
            }
        }
        self.state = MenuState::OpenPending {
            panel: panel.to_string(),
        };
        self.open_deadline = Some(now + self.timing.open_delay_ms);
    }

    /// `OpenPending(panel) → Open(panel)`, hiding any other panel first.
    pub fn confirm_open(&mut self, doc: &mut Document) {
        let panel = match &self.state {
            MenuState::OpenPending { panel } => panel.clone(),
            _ => return,
        };
        self.open_deadline = None;
        self.show(doc, &panel);
        self.claim_opener(&panel);
        self.state = MenuState::Open { panel };
    }

    /// Schedule a close `delay_ms` from `now`. A pending open is cancelled.
    pub fn request_close(&mut self, now: u64, delay_ms: u64) {
        if let MenuState::OpenPending { .. } = self.state {
            self.open_deadline = None;
            match self.displayed.clone() {
                Some(shown) => {
                    self.claim_opener(&shown);
                    self.state = MenuState::Open { panel: shown };
                }
                None => {
                    self.opened_by = None;
                    self.state = MenuState::Closed;
                }
            }
        }
        if self.displayed.is_none() {
            return;
        }
        let deadline = now + delay_ms;
        self.close_deadline = Some(match self.close_deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
    }

    pub fn cancel_close(&mut self) {
        self.close_deadline = None;
    }

    /// Close immediately. Focus inside the closed panel moves back to its
    /// toggle.
    pub fn close_now(&mut self, doc: &mut Document) {
        let closed = self.displayed.take();
        let opener = self.opened_by.take();
        self.open_deadline = None;
        self.close_deadline = None;
        self.state = MenuState::Closed;
        self.hide_all(doc);

        if let (Some(panel), Some(focused)) = (closed, doc.focused().map(str::to_string)) {
            if self.panel_contains(doc, &panel, &focused) {
                let toggle = opener.or_else(|| self.toggle_for(&panel).map(str::to_string));
                match toggle {
                    Some(t) => {
                        doc.focus(&t);
                    }
                    None => doc.blur(),
                }
            }
        }
    }

    /// Fire due timers. Returns true when visibility changed.
    pub fn tick(&mut self, doc: &mut Document, now: u64) -> bool {
        let mut changed = false;
        if self.open_deadline.is_some_and(|d| now >= d) {
            self.confirm_open(doc);
            changed = true;
        }
        if self.close_deadline.is_some_and(|d| now >= d) {
            self.close_now(doc);
            changed = true;
        }
        changed
    }

    // ───────────────────────────────────────────────────────────────────────
    // Input handling
    // ───────────────────────────────────────────────────────────────────────

    pub fn handle(&mut self, input: MenuInput, doc: &mut Document, now: u64) {
        match input {
            MenuInput::PointerEnterToggle(toggle) => {
                self.zone = Zone::Toggle;
                if let Some(panel) = self.panel_for(&toggle).map(str::to_string) {
                    self.request_open(&panel, now);
                }
            }
            MenuInput::PointerLeaveToggle(_) | MenuInput::PointerLeavePanel(_) => {
                self.zone = Zone::Outside;
                self.request_close(now, self.timing.close_delay_ms);
            }
            MenuInput::PointerEnterPanel(panel) => {
                self.zone = Zone::Panel;
                if self.displayed.as_deref() == Some(panel.as_str()) {
                    self.cancel_close();
                    // heading into the visible panel wins over a pending switch
                    self.open_deadline = None;
                    self.state = MenuState::Open { panel };
                }
            }
            MenuInput::PointerMove(point) => self.pointer_moved(point, now),
            MenuInput::Focus(id) => self.focused(&id, doc, now),
            MenuInput::Blur(id) => {
                if self.panel_for(&id).is_some() || self.panel_owning(doc, &id).is_some() {
                    self.request_close(now, self.timing.close_delay_ms);
                }
            }
            MenuInput::KeyDown { key, target } => {
                let target = target.or_else(|| doc.focused().map(str::to_string));
                self.key_down(key, target.as_deref(), doc, now);
            }
            MenuInput::Click {
                target,
                inside_header,
            } => {
                if let Some(panel) = target
                    .as_deref()
                    .and_then(|t| self.panel_for(t))
                    .map(str::to_string)
                {
                    let toggle = target.unwrap_or_default();
                    self.toggle_panel(&toggle, &panel, doc, false);
                } else if !inside_header {
                    self.close_now(doc);
                }
            }
        }
    }

    fn pointer_moved(&mut self, point: Point, now: u64) {
        if self.zone != Zone::Outside {
            return;
        }
        let Some(panel) = self.displayed.clone() else {
            return;
        };
        let Some(toggle) = self.toggle_for(&panel) else {
            return;
        };
        let (Some(t), Some(p)) = (self.geometry.get(toggle), self.geometry.get(&panel)) else {
            return;
        };
        if t.contains(point) || p.contains(point) {
            return;
        }
        if in_corridor(t, p, point, self.timing.corridor_tolerance_px) {
            self.cancel_close();
        } else {
            self.request_close(now, self.timing.corridor_grace_ms);
        }
    }

    fn focused(&mut self, id: &str, doc: &mut Document, now: u64) {
        doc.focus(id);
        if let Some(panel) = self.panel_for(id).map(str::to_string) {
            self.opened_by = Some(id.to_string());
            self.request_open(&panel, now);
        } else if let Some(panel) = self.panel_owning(doc, id) {
            if self.displayed.as_deref() == Some(panel.as_str()) {
                self.cancel_close();
            }
        }
    }

    fn key_down(&mut self, key: Key, target: Option<&str>, doc: &mut Document, now: u64) {
        if key == Key::Escape {
            if self.displayed.is_some() || matches!(self.state, MenuState::OpenPending { .. }) {
                let restore = self
                    .opened_by
                    .clone()
                    .or_else(|| self.displayed.as_deref().and_then(|p| self.toggle_for(p)).map(str::to_string));
                self.close_now(doc);
                if let Some(toggle) = restore {
                    doc.focus(&toggle);
                }
            }
            return;
        }

        let Some(target) = target else {
            return;
        };

        if let Some(panel) = self.panel_for(target).map(str::to_string) {
            match key {
                Key::ArrowDown => {
                    self.opened_by = Some(target.to_string());
                    self.open_immediately(&panel, doc, now);
                    self.focus_panel_link(doc, &panel, 0);
                }
                Key::Enter | Key::Space => {
                    self.toggle_panel(target, &panel, doc, true);
                }
                Key::ArrowLeft | Key::ArrowRight => self.rove_top(target, key, doc),
                _ => {}
            }
            return;
        }

        if self.top_items.iter().any(|t| t == target) {
            if matches!(key, Key::ArrowLeft | Key::ArrowRight) {
                self.rove_top(target, key, doc);
            }
            return;
        }

        if let Some(panel) = self.panel_owning(doc, target) {
            let links = panel_links(doc, &panel);
            if let Some(idx) = links.iter().position(|l| l == target) {
                let next = match key {
                    Key::ArrowDown => Some((idx + 1) % links.len()),
                    Key::ArrowUp => Some((idx + links.len() - 1) % links.len()),
                    _ => None,
                };
                if let Some(next) = next {
                    doc.focus(&links[next]);
                }
            }
        }
    }

    fn open_immediately(&mut self, panel: &str, doc: &mut Document, now: u64) {
        self.request_open(panel, now);
        self.confirm_open(doc);
    }

    fn toggle_panel(&mut self, toggle: &str, panel: &str, doc: &mut Document, move_focus: bool) {
        if self.displayed.as_deref() == Some(panel) {
            self.close_now(doc);
            return;
        }
        self.opened_by = Some(toggle.to_string());
        self.cancel_close();
        self.state = MenuState::OpenPending {
            panel: panel.to_string(),
        };
        self.confirm_open(doc);
        if move_focus {
            self.focus_panel_link(doc, panel, 0);
        }
    }

    fn rove_top(&self, current: &str, key: Key, doc: &mut Document) {
        let Some(idx) = self.top_items.iter().position(|t| t == current) else {
            return;
        };
        let len = self.top_items.len();
        let next = match key {
            Key::ArrowRight => (idx + 1) % len,
            Key::ArrowLeft => (idx + len - 1) % len,
            _ => return,
        };
        doc.focus(&self.top_items[next]);
    }

    fn focus_panel_link(&self, doc: &mut Document, panel: &str, index: usize) {
        if let Some(link) = panel_links(doc, panel).get(index) {
            doc.focus(link);
        }
    }

    // ───────────────────────────────────────────────────────────────────────
    // DOM writes
    // ───────────────────────────────────────────────────────────────────────

    fn show(&mut self, doc: &mut Document, panel: &str) {
        if let Some(focused) = doc.focused().map(str::to_string) {
            let hiding = self
                .bindings
                .iter()
                .find(|b| b.panel != panel && self.panel_contains(doc, &b.panel, &focused));
            if let Some(binding) = hiding {
                doc.focus(&binding.toggle);
            }
        }
        for binding in &self.bindings {
            if binding.panel != panel {
                set_closed(doc, binding);
            }
        }
        if let Some(binding) = self.bindings.iter().find(|b| b.panel == panel) {
            doc.set_attribute(&binding.toggle, "aria-expanded", "true");
            doc.remove_attribute(&binding.panel, "hidden");
            doc.set_attribute(&binding.panel, "aria-hidden", "false");
        }
        self.displayed = Some(panel.to_string());
    }

    fn hide_all(&self, doc: &mut Document) {
        for binding in &self.bindings {
            set_closed(doc, binding);
        }
    }

    // ───────────────────────────────────────────────────────────────────────
    // Lookups
    // ───────────────────────────────────────────────────────────────────────

    fn knows_panel(&self, panel: &str) -> bool {
        self.bindings.iter().any(|b| b.panel == panel)
    }

    fn panel_for(&self, toggle: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|b| b.toggle == toggle)
            .map(|b| b.panel.as_str())
    }

    /// Keep `opened_by` only if it controls `panel`; otherwise the panel's
    /// own toggle becomes the opener.
    fn claim_opener(&mut self, panel: &str) {
        let owns = self
            .opened_by
            .as_deref()
            .and_then(|t| self.panel_for(t))
            == Some(panel);
        if !owns {
            self.opened_by = self.toggle_for(panel).map(str::to_string);
        }
    }

    fn toggle_for(&self, panel: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|b| b.panel == panel)
            .map(|b| b.toggle.as_str())
    }

    fn panel_owning(&self, doc: &Document, id: &str) -> Option<String> {
        self.bindings
            .iter()
            .find(|b| self.panel_contains(doc, &b.panel, id))
            .map(|b| b.panel.clone())
    }

    fn panel_contains(&self, doc: &Document, panel: &str, id: &str) -> bool {
        match doc.find_by_id(panel) {
            Some(el) => el.id() == Some(id) || contains_id(&el.children, id),
            None => false,
        }
    }
}

/// Toggle a mobile disclosure button and the list it controls.
/// Returns the new expanded state, or `None` if `button` is unknown.
pub fn toggle_disclosure(doc: &mut Document, button: &str) -> Option<bool> {
    let el = doc.find_by_id(button)?;
    let expanded = el.attr("aria-expanded") == Some("true");
    let controls = el.attr("aria-controls").map(str::to_string);
    let next = !expanded;
    doc.set_attribute(button, "aria-expanded", if next { "true" } else { "false" });
    if let Some(list) = controls {
        if next {
            doc.remove_attribute(&list, "hidden");
        } else {
            doc.set_attribute(&list, "hidden", "");
        }
    }
    Some(next)
}

fn set_closed(doc: &mut Document, binding: &Binding) {
    doc.set_attribute(&binding.toggle, "aria-expanded", "false");
    doc.set_attribute(&binding.panel, "hidden", "");
    doc.set_attribute(&binding.panel, "aria-hidden", "true");
}

fn contains_id(nodes: &[Node], id: &str) -> bool {
    nodes.iter().any(|n| match n {
        Node::Element(el) => el.id() == Some(id) || contains_id(&el.children, id),
        Node::Text(_) => false,
    })
}

/// Focusable ids inside a panel, document order.
fn panel_links(doc: &Document, panel: &str) -> Vec<String> {
    let mut links = Vec::new();
    if let Some(el) = doc.find_by_id(panel) {
        crate::dom::walk_elements(&el.children, &mut |child| {
            if child.tag == "a" || child.tag == "button" {
                if let Some(id) = child.id() {
                    links.push(id.to_string());
                }
            }
        });
    }
    links
}

fn collect_top_items(nodes: &[Node], out: &mut Vec<String>) {
    for node in nodes {
        if let Node::Element(el) = node {
            if el.has_class(PANEL_CLASS) {
                continue;
            }
            if is_top_focusable(el) {
                if let Some(id) = el.id() {
                    out.push(id.to_string());
                }
                continue;
            }
            collect_top_items(&el.children, out);
        }
    }
}

fn is_top_focusable(el: &ElementNode) -> bool {
    el.tag == "a" || (el.tag == "button" && el.has_class(TOGGLE_CLASS))
}
