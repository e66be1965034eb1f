use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::error;

use pixelscan::args::Args;
use pixelscan::chrome::{self, FetchOptions};
use pixelscan::scan::{self, ScanOptions};
use pixelscan::{report, tracker, utils};

fn main() -> Result<()> {
    let args = Args::parse();
    utils::setup_logging(args.verbose);

    if args.init {
        return tracker::init_default_fragments();
    }

    utils::validate_args(&args)?;

    match run(&args) {
        Ok(()) => Ok(()),
        Err(e) => {
            error!(error = %e, "Scan failed");
            std::process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let content = read_url_input(args)?;
    let (urls, skipped) = scan::parse_url_list(&content);
    if urls.is_empty() {
        anyhow::bail!("No valid URLs to scan");
    }

    let fragments = tracker::load_tracker_fragments(args.fragments.as_deref())?;

    let fetch_options = FetchOptions {
        nav_timeout: Duration::from_secs(args.nav_timeout_secs),
        settle: Duration::from_secs(args.settle_secs),
        scroll_wait: Duration::from_secs(args.scroll_wait_secs),
        user_agent: args.user_agent.clone(),
        dom_scan: !args.no_dom_scan,
        scroll: !args.no_scroll,
    };
    let scan_options = ScanOptions {
        pause: Duration::from_secs(args.pause_secs),
    };

    let mut results = scan::run_scan(&urls, &fragments, &scan_options, |url| {
        chrome::observe_page(url, &fetch_options)
    });
    results.urls_skipped = skipped;

    report::write_report(&args.output, &results)?;
    report::print_scan_summary(&results, &args.output);
    Ok(())
}

fn read_url_input(args: &Args) -> Result<String> {
    match args.urls.as_deref() {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read URL list {:?}", path)),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read URLs from stdin")?;
            Ok(buf)
        }
    }
}
