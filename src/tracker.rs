use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;
use tracing::{info, warn};

// Include default fragments at compile time
const DEFAULT_FRAGMENTS_BYTES: &[u8] = include_bytes!("../default_tracker_fragments.txt");

/// The four tracker platforms the scanner recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum TrackerKind {
    /// DCM conversion-registration tag
    Dcm,
    /// The Trade Desk bid-tracking tag
    Ttd,
    /// Facebook tag
    Facebook,
    /// LinkedIn insight tag
    LinkedIn,
}

impl TrackerKind {
    pub const ALL: [TrackerKind; 4] = [
        TrackerKind::Dcm,
        TrackerKind::Ttd,
        TrackerKind::Facebook,
        TrackerKind::LinkedIn,
    ];

    /// Lowercase label used in fragment files and log fields.
    pub fn label(&self) -> &'static str {
        match self {
            TrackerKind::Dcm => "dcm",
            TrackerKind::Ttd => "ttd",
            TrackerKind::Facebook => "facebook",
            TrackerKind::LinkedIn => "linkedin",
        }
    }

    /// Uppercase heading used in the CSV report.
    pub fn heading(&self) -> &'static str {
        match self {
            TrackerKind::Dcm => "DCM",
            TrackerKind::Ttd => "TTD",
            TrackerKind::Facebook => "Facebook",
            TrackerKind::LinkedIn => "LinkedIn",
        }
    }
}

impl fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TrackerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dcm" => Ok(TrackerKind::Dcm),
            "ttd" => Ok(TrackerKind::Ttd),
            "facebook" => Ok(TrackerKind::Facebook),
            "linkedin" => Ok(TrackerKind::LinkedIn),
            other => anyhow::bail!("Unknown tracker kind '{}'", other),
        }
    }
}

/// Literal URL fragments per tracker kind, matched by containment.
///
/// Fragments are stored lowercase; [`FragmentSet::classify`] lowercases the
/// candidate address once, so matching is case-insensitive. Matched addresses
/// keep their original case everywhere else.
#[derive(Debug, Clone)]
pub struct FragmentSet {
    fragments: BTreeMap<TrackerKind, Vec<String>>,
}

impl FragmentSet {
    pub fn new() -> Self {
        FragmentSet {
            fragments: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, kind: TrackerKind, fragment: &str) {
        self.fragments
            .entry(kind)
            .or_default()
            .push(fragment.to_lowercase());
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.values().all(|f| f.is_empty())
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.values().map(|f| f.len()).sum()
    }

    /// Classify an address against every kind's fragments.
    ///
    /// Returns the kinds whose fragment is contained in the address — zero,
    /// one, or several. Pure containment, never equality or patterns.
    pub fn classify(&self, address: &str) -> Vec<TrackerKind> {
        let address_lower = address.to_lowercase();
        let mut kinds = Vec::new();
        for (kind, fragments) in &self.fragments {
            if fragments.iter().any(|f| address_lower.contains(f)) {
                kinds.push(*kind);
            }
        }
        kinds
    }

    /// Parse `kind=fragment` lines. Blank lines and `#` comments are skipped.
    /// `strict` controls whether a malformed line aborts or just warns.
    pub fn parse(content: &str, strict: bool) -> Result<Self> {
        let mut set = FragmentSet::new();

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match parse_fragment_line(line) {
                Ok((kind, fragment)) => set.add(kind, fragment),
                Err(e) => {
                    if strict {
                        anyhow::bail!("Invalid fragment at line {}: {}", line_num + 1, e);
                    }
                    warn!(action = "parse", component = "fragment_line", line_number = line_num + 1, error = %e, "Invalid fragment line");
                }
            }
        }

        Ok(set)
    }
}

impl Default for FragmentSet {
    fn default() -> Self {
        FragmentSet::new()
    }
}

fn parse_fragment_line(line: &str) -> Result<(TrackerKind, &str)> {
    let (kind, fragment) = line
        .split_once('=')
        .with_context(|| format!("expected 'kind=fragment', got '{}'", line))?;
    let kind = TrackerKind::from_str(kind.trim())?;
    let fragment = fragment.trim();
    if fragment.is_empty() {
        anyhow::bail!("empty fragment for kind '{}'", kind);
    }
    Ok((kind, fragment))
}

pub fn load_tracker_fragments(fragment_file_path: Option<&Path>) -> Result<FragmentSet> {
    let start_time = Instant::now();
    info!(
        action = "start",
        component = "fragment_loading",
        "Starting tracker fragment loading"
    );

    let set = if let Some(path) = fragment_file_path {
        info!(action = "load", component = "fragment_file", file_path = ?path, "Loading fragments from specified file");
        if !path.exists() {
            anyhow::bail!("Fragment file not found: {:?}", path);
        }

        let content = fs::read_to_string(path)?;
        let set = FragmentSet::parse(&content, true)?;
        info!(action = "loaded", component = "fragment_file", fragment_count = set.fragment_count(), file_path = ?path, "Loaded fragments from file");
        set
    } else {
        // Try default file
        let default_file = Path::new("tracker_fragments.txt");
        let mut set = FragmentSet::new();
        if default_file.exists() {
            info!(action = "load", component = "default_fragment_file", file_path = ?default_file, "Loading fragments from default file");
            let content = fs::read_to_string(default_file)?;
            set = FragmentSet::parse(&content, false)?;
            info!(action = "loaded", component = "default_fragment_file", fragment_count = set.fragment_count(), file_path = ?default_file, "Loaded fragments from default file");
        }

        // If no fragments loaded, use embedded defaults
        if set.is_empty() {
            info!(
                action = "load",
                component = "embedded_fragments",
                "Using embedded default fragments"
            );
            let default_content = std::str::from_utf8(DEFAULT_FRAGMENTS_BYTES)
                .context("Failed to decode embedded default fragments")?;
            set = FragmentSet::parse(default_content, false)?;
            info!(
                action = "loaded",
                component = "embedded_fragments",
                fragment_count = set.fragment_count(),
                "Loaded fragments from embedded defaults"
            );
        }
        set
    };

    if set.is_empty() {
        anyhow::bail!("No tracker fragments loaded; nothing to match against");
    }

    let load_time = start_time.elapsed();
    info!(
        action = "complete",
        component = "fragment_loading",
        fragment_count = set.fragment_count(),
        duration_ms = load_time.as_millis(),
        "Successfully loaded fragments"
    );
    Ok(set)
}

pub fn init_default_fragments() -> Result<()> {
    let default_file = Path::new("tracker_fragments.txt");

    if default_file.exists() {
        anyhow::bail!(
            "tracker_fragments.txt already exists. Remove it first if you want to reinitialize."
        );
    }

    let default_content = std::str::from_utf8(DEFAULT_FRAGMENTS_BYTES)
        .context("Failed to decode embedded default fragments")?;

    fs::write(default_file, default_content)?;
    println!("Created tracker_fragments.txt with default fragments");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_set() -> FragmentSet {
        let content = std::str::from_utf8(DEFAULT_FRAGMENTS_BYTES).unwrap();
        FragmentSet::parse(content, true).unwrap()
    }

    #[test]
    fn embedded_defaults_cover_all_kinds() {
        let set = default_set();
        for kind in TrackerKind::ALL {
            assert!(
                set.fragments.get(&kind).is_some_and(|f| !f.is_empty()),
                "no default fragment for {}",
                kind
            );
        }
    }

    #[test]
    fn classify_conversion_tag() {
        let set = default_set();
        let kinds =
            set.classify("https://ad.doubleclick.net/activity;register_conversion=1&foo=bar");
        assert_eq!(kinds, vec![TrackerKind::Dcm]);
    }

    #[test]
    fn classify_requires_literal_containment() {
        let set = default_set();
        // The domain alone is not the conversion-registration fragment.
        assert!(set
            .classify("https://example.com/ad.doubleclick.net")
            .is_empty());
        assert!(set.classify("https://example.com/page").is_empty());
    }

    #[test]
    fn classify_is_case_insensitive() {
        let set = default_set();
        let kinds = set.classify("HTTPS://WWW.FACEBOOK.COM/TR/?id=123");
        assert_eq!(kinds, vec![TrackerKind::Facebook]);
    }

    #[test]
    fn classify_repeated_fragment_yields_single_membership() {
        let set = default_set();
        let kinds = set.classify("https://insight.adsrvr.org/track/?r=adsrvr.org");
        assert_eq!(kinds, vec![TrackerKind::Ttd]);
    }

    #[test]
    fn classify_can_match_multiple_kinds() {
        let mut set = FragmentSet::new();
        set.add(TrackerKind::Facebook, "facebook.com/tr/");
        set.add(TrackerKind::LinkedIn, "px.ads.linkedin.com");
        let kinds =
            set.classify("https://www.facebook.com/tr/?redirect=px.ads.linkedin.com/collect");
        assert_eq!(kinds, vec![TrackerKind::Facebook, TrackerKind::LinkedIn]);
    }

    #[test]
    fn parse_skips_comments_and_blank_lines() {
        let set = FragmentSet::parse("# comment\n\nttd=adsrvr.org\n", true).unwrap();
        assert_eq!(set.fragment_count(), 1);
        assert_eq!(set.classify("https://x.adsrvr.org/"), vec![TrackerKind::Ttd]);
    }

    #[test]
    fn parse_strict_rejects_bad_lines() {
        assert!(FragmentSet::parse("not-a-fragment-line", true).is_err());
        assert!(FragmentSet::parse("mystery=https://x.test/", true).is_err());
        assert!(FragmentSet::parse("dcm=", true).is_err());
    }

    #[test]
    fn parse_lenient_keeps_good_lines() {
        let set = FragmentSet::parse("garbage\nfacebook=facebook.com/tr/\n", false).unwrap();
        assert_eq!(set.fragment_count(), 1);
    }

    #[test]
    fn fragments_are_lowercased_at_load() {
        let set = FragmentSet::parse("linkedin=HTTPS://PX.ADS.LINKEDIN.COM/", true).unwrap();
        assert_eq!(
            set.classify("https://px.ads.linkedin.com/collect"),
            vec![TrackerKind::LinkedIn]
        );
    }
}
