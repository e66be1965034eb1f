use std::time::Duration;

use anyhow::Result;
use pixelscan::chrome::{DomAttribute, ObservedPage};
use pixelscan::scan::{self, ScanOptions};
use pixelscan::tracker::FragmentSet;
use pixelscan::{report, TrackerKind};

fn fragments() -> FragmentSet {
    let mut set = FragmentSet::new();
    set.add(
        TrackerKind::Dcm,
        "https://ad.doubleclick.net/activity;register_conversion=1",
    );
    set.add(TrackerKind::Ttd, "adsrvr.org");
    set.add(TrackerKind::Facebook, "https://www.facebook.com/tr/");
    set.add(TrackerKind::LinkedIn, "https://px.ads.linkedin.com/");
    set
}

fn options() -> ScanOptions {
    ScanOptions {
        pause: Duration::from_secs(0),
    }
}

fn stub_fetch(url: &str) -> Result<ObservedPage> {
    match url {
        "https://shop.example" => Ok(ObservedPage {
            requests: vec![
                "https://ad.doubleclick.net/activity;register_conversion=1&src=1".to_string(),
                "https://cdn.shop.example/app.js".to_string(),
                "https://insight.adsrvr.org/track/conv".to_string(),
                // Arrives during the post-scroll wait.
                "https://www.facebook.com/tr/?id=late".to_string(),
            ],
            dom_scan_index: 3,
            dom_attributes: vec![
                DomAttribute {
                    attribute: "src".to_string(),
                    value: "https://insight.adsrvr.org/track/px.gif".to_string(),
                },
                DomAttribute {
                    attribute: "href".to_string(),
                    value: "https://shop.example/contact".to_string(),
                },
            ],
        }),
        "https://down.example" => anyhow::bail!("net::ERR_NAME_NOT_RESOLVED"),
        _ => Ok(ObservedPage {
            requests: vec!["https://insight.adsrvr.org/track/conv".to_string()],
            dom_scan_index: 1,
            dom_attributes: Vec::new(),
        }),
    }
}

#[test]
fn full_pipeline_from_url_list_to_csv() {
    let (urls, skipped) = scan::parse_url_list(
        "https://shop.example\n# staging\nhttps://down.example\nnot a url\nhttps://blog.example\n",
    );
    assert_eq!(urls.len(), 3);
    assert_eq!(skipped, 1);

    let mut results = scan::run_scan(&urls, &fragments(), &options(), stub_fetch);
    results.urls_skipped = skipped;

    // Failure isolation: the dead URL is present, empty, and did not stop the run.
    assert_eq!(results.pages.len(), 3);
    assert!(results.pages[1].1.failed);
    assert_eq!(results.pages[2].1.pixel_count(TrackerKind::Ttd), 1);

    // The same TTD address fired on both live pages; globally it counts once.
    assert_eq!(results.total_count(TrackerKind::Ttd), 1);
    assert_eq!(results.total_count(TrackerKind::Dcm), 1);
    assert_eq!(results.total_count(TrackerKind::Facebook), 1);
    assert_eq!(results.total_count(TrackerKind::LinkedIn), 0);

    // The matching img attribute became a DOM event whose snapshot excludes
    // the post-scroll Facebook request.
    let shop = &results.pages[0].1;
    assert_eq!(shop.dom_events.len(), 1);
    let event = &shop.dom_events[0];
    assert_eq!(event.element, "https://insight.adsrvr.org/track/px.gif");
    assert!(event.pixels_at_scan[&TrackerKind::Facebook].is_empty());
    assert_eq!(shop.pixel_count(TrackerKind::Facebook), 1);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pixel_results.csv");
    report::write_report(&path, &results).unwrap();
    let content = std::fs::read_to_string(&path).unwrap();

    assert!(content.starts_with("Per-URL Pixel Counts and URLs"));
    assert!(content.contains("Total Unique Pixel Counts and URLs"));
    // Summary row for the failed URL is all zeroes.
    assert!(content.contains("https://down.example,,,0,,0,,0,,0,"));
    // DOM event row keeps the snapshot, not the final counts.
    assert!(content.contains("https://shop.example,img,https://insight.adsrvr.org/track/px.gif,"));
    assert!(content.contains("TTD,1,https://insight.adsrvr.org/track/conv"));
}
