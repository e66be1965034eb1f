use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::tracker::TrackerKind;

/// Which attribute a DOM match came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DomAction {
    Link,
    Image,
    Onclick,
}

impl DomAction {
    /// Maps an attribute name to its report label.
    pub fn from_attribute(attribute: &str) -> Self {
        match attribute {
            "href" => DomAction::Link,
            "src" => DomAction::Image,
            _ => DomAction::Onclick,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DomAction::Link => "link",
            DomAction::Image => "img",
            DomAction::Onclick => "onclick",
        }
    }
}

/// A matching DOM attribute, with the page's network-pixel sets as they
/// stood when the DOM scan ran.
#[derive(Debug, Clone, Serialize)]
pub struct DomEvent {
    pub action: DomAction,
    pub element: String,
    pub pixels_at_scan: BTreeMap<TrackerKind, Vec<String>>,
}

/// Accumulated observations for one input URL.
#[derive(Debug, Serialize)]
pub struct PageResult {
    /// Unique matched request addresses per tracker kind.
    pub pixels: BTreeMap<TrackerKind, BTreeSet<String>>,
    pub dom_events: Vec<DomEvent>,
    /// Total outgoing requests observed, matched or not.
    pub requests_seen: usize,
    pub failed: bool,
}

impl PageResult {
    pub fn new() -> Self {
        let mut pixels = BTreeMap::new();
        for kind in TrackerKind::ALL {
            pixels.insert(kind, BTreeSet::new());
        }
        PageResult {
            pixels,
            dom_events: Vec::new(),
            requests_seen: 0,
            failed: false,
        }
    }

    /// The degrade-to-empty record written for a URL whose fetch failed.
    pub fn failed_record() -> Self {
        let mut page = PageResult::new();
        page.failed = true;
        page
    }

    pub fn pixel_count(&self, kind: TrackerKind) -> usize {
        self.pixels.get(&kind).map_or(0, |set| set.len())
    }

    /// Snapshot of the per-kind pixel sets, list form, for DOM events.
    pub fn snapshot(&self) -> BTreeMap<TrackerKind, Vec<String>> {
        self.pixels
            .iter()
            .map(|(kind, set)| (*kind, set.iter().cloned().collect()))
            .collect()
    }
}

impl Default for PageResult {
    fn default() -> Self {
        PageResult::new()
    }
}

/// All results for one run: per-URL records in input order plus the global
/// deduplicated address sets. Created empty at run start, mutated only while
/// its URL's observation window is open, serialized once at run end.
#[derive(Debug, Serialize)]
pub struct ScanResults {
    pub pages: Vec<(String, PageResult)>,
    pub totals: BTreeMap<TrackerKind, BTreeSet<String>>,
    /// Input lines that did not parse as absolute URLs.
    pub urls_skipped: u32,
    pub started_at: DateTime<Utc>,
}

impl ScanResults {
    pub fn new() -> Self {
        let mut totals = BTreeMap::new();
        for kind in TrackerKind::ALL {
            totals.insert(kind, BTreeSet::new());
        }
        ScanResults {
            pages: Vec::new(),
            totals,
            urls_skipped: 0,
            started_at: Utc::now(),
        }
    }

    /// Record a matched address into the page's and the run's sets.
    /// Idempotent: re-inserting an address is a no-op.
    pub fn record(&mut self, page: &mut PageResult, address: &str, kinds: &[TrackerKind]) {
        for kind in kinds {
            if let Some(set) = page.pixels.get_mut(kind) {
                set.insert(address.to_string());
            }
            if let Some(set) = self.totals.get_mut(kind) {
                set.insert(address.to_string());
            }
        }
    }

    pub fn push_page(&mut self, url: String, page: PageResult) {
        self.pages.push((url, page));
    }

    pub fn failed_page_count(&self) -> usize {
        self.pages.iter().filter(|(_, page)| page.failed).count()
    }

    pub fn total_count(&self, kind: TrackerKind) -> usize {
        self.totals.get(&kind).map_or(0, |set| set.len())
    }
}

impl Default for ScanResults {
    fn default() -> Self {
        ScanResults::new()
    }
}
