use clap::Parser;
use std::path::PathBuf;

/// Desktop Chrome UA presented unless --user-agent overrides it.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";

#[derive(Parser, Debug)]
#[command(
    name = "pixelscan",
    about = "Visit URLs in headless Chrome and report known advertising tracking pixels",
    version,
    long_about = None
)]
pub struct Args {
    /// File with one URL per line ('-' or omitted reads stdin)
    pub urls: Option<PathBuf>,

    /// Output CSV path, overwritten on each run
    #[arg(short, long, default_value = "pixel_results.csv")]
    pub output: PathBuf,

    /// Path to custom tracker fragment file
    #[arg(short, long)]
    pub fragments: Option<PathBuf>,

    /// Skip scanning DOM element attributes for tracker links
    #[arg(long)]
    pub no_dom_scan: bool,

    /// Skip scrolling to the bottom of each page
    #[arg(long)]
    pub no_scroll: bool,

    /// Navigation timeout per URL, in seconds
    #[arg(long, default_value_t = 30)]
    pub nav_timeout_secs: u64,

    /// Wait after navigation so asynchronous trackers fire, in seconds
    #[arg(long, default_value_t = 5)]
    pub settle_secs: u64,

    /// Wait after scrolling to the page bottom, in seconds
    #[arg(long, default_value_t = 10)]
    pub scroll_wait_secs: u64,

    /// Pause between URLs, in seconds
    #[arg(long, default_value_t = 2)]
    pub pause_secs: u64,

    /// User agent sent by the headless browser
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Initialize tracker_fragments.txt with default fragments
    #[arg(long)]
    pub init: bool,
}
