use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use url::Url;

use crate::chrome::ObservedPage;
use crate::results::{DomAction, DomEvent, PageResult, ScanResults};
use crate::tracker::{FragmentSet, TrackerKind};

/// Loop-level knobs; per-session knobs live in [`crate::chrome::FetchOptions`].
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Courtesy pause between URLs.
    pub pause: Duration,
}

/// Parse a newline-separated URL list. Blank lines and `#` comments are
/// dropped; lines that are not absolute URLs are warned about and counted.
pub fn parse_url_list(content: &str) -> (Vec<String>, u32) {
    let mut urls = Vec::new();
    let mut skipped = 0;

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match Url::parse(line) {
            Ok(_) => urls.push(line.to_string()),
            Err(e) => {
                warn!(action = "parse", component = "url_list", line_number = line_num + 1, input = line, error = %e, "Skipping line that is not an absolute URL");
                skipped += 1;
            }
        }
    }

    (urls, skipped)
}

/// Visit every URL strictly in order, one session at a time.
///
/// `fetch` performs the actual browser work; any error it returns is
/// downgraded to an all-empty record for that URL and the loop moves on.
pub fn run_scan<F>(
    urls: &[String],
    fragments: &FragmentSet,
    options: &ScanOptions,
    mut fetch: F,
) -> ScanResults
where
    F: FnMut(&str) -> Result<ObservedPage>,
{
    let total_start_time = Instant::now();
    info!(
        action = "start",
        component = "scan",
        url_count = urls.len(),
        "Starting pixel scan"
    );

    let mut results = ScanResults::new();

    for (index, url) in urls.iter().enumerate() {
        info!(action = "fetch", component = "scan", url = url.as_str(), position = index + 1, total = urls.len(), "Scanning URL");

        match fetch(url) {
            Ok(observed) => apply_observation(&mut results, url, &observed, fragments),
            Err(e) => {
                warn!(action = "fetch", component = "scan", url = url.as_str(), error = %e, "Fetch failed; recording empty result");
                results.push_page(url.clone(), PageResult::failed_record());
            }
        }

        if index + 1 < urls.len() {
            std::thread::sleep(options.pause);
        }
    }

    let total_time = total_start_time.elapsed();
    info!(
        action = "complete",
        component = "scan",
        pages = results.pages.len(),
        failed_pages = results.failed_page_count(),
        duration_ms = total_time.as_millis(),
        "Pixel scan completed"
    );

    results
}

/// Fold one session's observations into the results.
///
/// Requests below the DOM-scan watermark are recorded first so each DOM
/// event's snapshot reflects exactly the pixels seen when the scan ran;
/// post-scroll requests are folded in afterwards.
pub fn apply_observation(
    results: &mut ScanResults,
    url: &str,
    observed: &ObservedPage,
    fragments: &FragmentSet,
) {
    let mut page = PageResult::new();
    page.requests_seen = observed.requests.len();

    let cutoff = observed.dom_scan_index.min(observed.requests.len());
    for address in &observed.requests[..cutoff] {
        let kinds = fragments.classify(address);
        results.record(&mut page, address, &kinds);
    }

    for dom_attribute in &observed.dom_attributes {
        if fragments.classify(&dom_attribute.value).is_empty() {
            continue;
        }
        page.dom_events.push(DomEvent {
            action: DomAction::from_attribute(&dom_attribute.attribute),
            element: dom_attribute.value.clone(),
            pixels_at_scan: page.snapshot(),
        });
    }

    for address in &observed.requests[cutoff..] {
        let kinds = fragments.classify(address);
        results.record(&mut page, address, &kinds);
    }

    info!(
        action = "aggregate",
        component = "scan",
        url = url,
        requests_seen = page.requests_seen,
        dom_events = page.dom_events.len(),
        dcm = page.pixel_count(TrackerKind::Dcm),
        ttd = page.pixel_count(TrackerKind::Ttd),
        facebook = page.pixel_count(TrackerKind::Facebook),
        linkedin = page.pixel_count(TrackerKind::LinkedIn),
        "URL aggregated"
    );

    results.push_page(url.to_string(), page);
}
