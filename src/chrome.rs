use anyhow::{Context, Result};
use headless_chrome::browser::tab::RequestPausedDecision;
use headless_chrome::protocol::cdp::Fetch::{events::RequestPausedEvent, RequestPattern, RequestStage};
use headless_chrome::{Browser, LaunchOptions};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Session knobs for one page observation.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Navigation deadline.
    pub nav_timeout: Duration,
    /// Wait after navigation so asynchronous trackers fire.
    pub settle: Duration,
    /// Wait after scrolling to the bottom of the page.
    pub scroll_wait: Duration,
    pub user_agent: String,
    pub dom_scan: bool,
    pub scroll: bool,
}

/// An attribute harvested from the rendered DOM.
#[derive(Debug, Clone)]
pub struct DomAttribute {
    pub attribute: String,
    pub value: String,
}

/// Everything observed during one page's session.
#[derive(Debug)]
pub struct ObservedPage {
    /// Every outgoing request address, in arrival order.
    pub requests: Vec<String>,
    /// Number of requests already observed when the DOM scan ran. Requests
    /// past this index arrived during the post-scroll wait.
    pub dom_scan_index: usize,
    pub dom_attributes: Vec<DomAttribute>,
}

const DOM_ATTRIBUTE_SCRIPT: &str = r#"
    (function() {
        const found = [];
        document.querySelectorAll('[href], [src], [onclick]').forEach(el => {
            for (const attr of ['href', 'src', 'onclick']) {
                const value = el.getAttribute(attr);
                if (value) {
                    found.push({ attribute: attr, value: value });
                }
            }
        });
        return JSON.stringify(found);
    })()
"#;

/// Open `url` in a fresh headless Chrome session and passively observe it.
///
/// Every outgoing request is recorded via CDP fetch interception and always
/// continued unmodified. The browser and tab are dropped on every exit path,
/// so a failed navigation never leaks a session.
pub fn observe_page(url: &str, opts: &FetchOptions) -> Result<ObservedPage> {
    let start_time = Instant::now();
    info!(action = "start", component = "chrome_session", url = url, "Opening page");

    let browser = Browser::new(
        LaunchOptions::default_builder()
            .headless(true)
            .window_size(Some((1280, 800)))
            .idle_browser_timeout(opts.nav_timeout + opts.settle + opts.scroll_wait + Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("Browser launch options error: {}", e))?,
    )
    .context("Failed to launch Chrome/Chromium")?;

    let tab = browser.new_tab().context("Failed to create new tab")?;
    tab.set_default_timeout(opts.nav_timeout);
    tab.set_user_agent(&opts.user_agent, None, None)
        .context("Failed to override user agent")?;

    // Observe every request at the Request stage; never block or modify.
    let requests: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let requests_clone = Arc::clone(&requests);

    let patterns = vec![RequestPattern {
        url_pattern: Some("*".to_string()),
        resource_Type: None,
        request_stage: Some(RequestStage::Request),
    }];

    tab.enable_fetch(Some(&patterns), None)
        .context("Failed to enable fetch interception")?;

    tab.enable_request_interception(Arc::new(
        move |_transport, _session_id, intercepted: RequestPausedEvent| {
            let address = intercepted.params.request.url.clone();
            debug!(action = "observe", component = "request_listener", address = %address, "Outgoing request");
            if let Ok(mut seen) = requests_clone.lock() {
                seen.push(address);
            }
            RequestPausedDecision::Continue(None)
        },
    ))
    .context("Failed to register request interceptor")?;

    tab.navigate_to(url).context("Failed to navigate to URL")?;
    tab.wait_until_navigated().context("Navigation timeout")?;

    // Let asynchronous trackers fire before we look at anything.
    std::thread::sleep(opts.settle);

    let dom_scan_index = requests.lock().map(|seen| seen.len()).unwrap_or(0);

    let dom_attributes = if opts.dom_scan {
        harvest_dom_attributes(&tab)?
    } else {
        Vec::new()
    };

    if opts.scroll {
        // Bottom of the page triggers lazy-loaded trackers.
        tab.evaluate("window.scrollTo(0, document.body.scrollHeight);", false)
            .context("Failed to scroll page")?;
        std::thread::sleep(opts.scroll_wait);
    }

    let _ = tab.disable_fetch();

    let requests = requests
        .lock()
        .map(|seen| seen.clone())
        .unwrap_or_default();

    let session_time = start_time.elapsed();
    info!(
        action = "complete",
        component = "chrome_session",
        url = url,
        request_count = requests.len(),
        dom_attribute_count = dom_attributes.len(),
        duration_ms = session_time.as_millis(),
        "Page observed"
    );

    Ok(ObservedPage {
        requests,
        dom_scan_index,
        dom_attributes,
    })
}

/// Collect `href`/`src`/`onclick` values from every element carrying them.
/// Matching happens in the caller; the page only reports raw attributes.
fn harvest_dom_attributes(tab: &headless_chrome::Tab) -> Result<Vec<DomAttribute>> {
    let result = tab
        .evaluate(DOM_ATTRIBUTE_SCRIPT, true)
        .context("Failed to run DOM attribute scan")?;

    let mut attributes = Vec::new();
    if let Some(value) = result.value {
        if let Some(json_str) = value.as_str() {
            let entries: Vec<serde_json::Value> =
                serde_json::from_str(json_str).context("Malformed DOM scan payload")?;
            for entry in entries {
                let attribute = entry.get("attribute").and_then(|v| v.as_str());
                let attr_value = entry.get("value").and_then(|v| v.as_str());
                if let (Some(attribute), Some(attr_value)) = (attribute, attr_value) {
                    attributes.push(DomAttribute {
                        attribute: attribute.to_string(),
                        value: attr_value.to_string(),
                    });
                }
            }
        }
    }

    debug!(
        action = "harvest",
        component = "dom_scan",
        attribute_count = attributes.len(),
        "DOM attributes collected"
    );
    Ok(attributes)
}
