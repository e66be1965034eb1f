use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tracing::info;

use crate::results::{PageResult, ScanResults};
use crate::tracker::TrackerKind;
use crate::utils::format_number;

const PIXEL_JOIN: &str = "; ";

/// Write the two-section report, overwriting any previous run's file.
///
/// Section 1 carries one summary row per URL (final counts, empty
/// Action/Element) followed by one row per DOM-derived match event with the
/// counts as they stood when the DOM scan ran. Section 2 carries the global
/// unique address sets. Both sections are always present, even at zero.
pub fn write_report(path: &Path, results: &ScanResults) -> Result<()> {
    let start_time = Instant::now();
    info!(action = "start", component = "report_writer", output_path = ?path, "Writing CSV report");

    let file = File::create(path)
        .with_context(|| format!("Failed to create output file {:?}", path))?;
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(file);

    // Section 1: per-URL results
    writer.write_record(["Per-URL Pixel Counts and URLs"])?;
    writer.write_record([
        "URL",
        "Action",
        "Element",
        "DCM Count",
        "DCM Pixels",
        "TTD Count",
        "TTD Pixels",
        "Facebook Count",
        "Facebook Pixels",
        "LinkedIn Count",
        "LinkedIn Pixels",
    ])?;

    for (url, page) in &results.pages {
        write_page_summary_row(&mut writer, url, page)?;
        for event in &page.dom_events {
            let mut record = vec![
                url.clone(),
                event.action.label().to_string(),
                event.element.clone(),
            ];
            for kind in TrackerKind::ALL {
                let pixels = event
                    .pixels_at_scan
                    .get(&kind)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                record.push(pixels.len().to_string());
                record.push(pixels.join(PIXEL_JOIN));
            }
            writer.write_record(&record)?;
        }
    }

    // Blank row for separation
    writer.write_record([""])?;

    // Section 2: total unique pixels
    writer.write_record(["Total Unique Pixel Counts and URLs"])?;
    writer.write_record(["Type", "Count", "Pixel URLs"])?;
    for kind in TrackerKind::ALL {
        let pixels = &results.totals[&kind];
        let joined: Vec<&str> = pixels.iter().map(String::as_str).collect();
        writer.write_record([
            kind.label().to_uppercase(),
            pixels.len().to_string(),
            joined.join(PIXEL_JOIN),
        ])?;
    }

    writer.flush().context("Failed to flush CSV report")?;

    let write_time = start_time.elapsed();
    info!(
        action = "complete",
        component = "report_writer",
        output_path = ?path,
        pages = results.pages.len(),
        duration_ms = write_time.as_millis(),
        "CSV report written"
    );
    Ok(())
}

fn write_page_summary_row<W: std::io::Write>(
    writer: &mut csv::Writer<W>,
    url: &str,
    page: &PageResult,
) -> Result<()> {
    let mut record = vec![url.to_string(), String::new(), String::new()];
    for kind in TrackerKind::ALL {
        let pixels = &page.pixels[&kind];
        let joined: Vec<&str> = pixels.iter().map(String::as_str).collect();
        record.push(pixels.len().to_string());
        record.push(joined.join(PIXEL_JOIN));
    }
    writer.write_record(&record)?;
    Ok(())
}

/// Console summary printed after the report file is written.
pub fn print_scan_summary(results: &ScanResults, output_path: &Path) {
    println!("\n--- Pixel Scan Summary ---");
    println!(
        "Started: {}",
        results.started_at.format("%B %-d, %Y %H:%M UTC")
    );
    println!(
        "URLs scanned: {}",
        format_number(results.pages.len() as u32)
    );
    if results.failed_page_count() > 0 {
        println!(
            "URLs failed: {}",
            format_number(results.failed_page_count() as u32)
        );
    }
    if results.urls_skipped > 0 {
        println!("Input lines skipped: {}", format_number(results.urls_skipped));
    }

    println!("\nUnique pixels across all URLs:");
    for kind in TrackerKind::ALL {
        println!(
            "- {}: {}",
            kind.heading(),
            format_number(results.total_count(kind) as u32)
        );
    }

    println!("\nResults saved to {:?}", output_path);
}
