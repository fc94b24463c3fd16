/// Parsing of MER archive directory listings
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Files at or below this size are thumbnails or truncated uploads
pub const MIN_IMAGE_KB: f64 = 10.0;

/// A `.jpg` row from an archive directory listing
#[derive(Debug, Clone, PartialEq)]
pub struct ListingEntry {
    pub filename: String,
    pub size_kb: f64,
}

/// Extracts image rows from listing markup.
///
/// The archive only offers an HTML index, so the parsing strategy sits behind
/// this trait and can be replaced without touching `MerService`.
pub trait ListingParser: Send + Sync {
    fn parse(&self, html: &str) -> Vec<ListingEntry>;
}

/// Line-pattern parser for Apache-style `<a href>...</td><td>size</td>` rows
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexListingParser;

fn row_regex() -> &'static Regex {
    static ROW: OnceLock<Regex> = OnceLock::new();
    ROW.get_or_init(|| {
        Regex::new(
            r#"(?i)<a href="([^"]+\.jpg)">[^<]+</a></td><td[^>]*>[^<]*</td><td[^>]*>\s*([0-9.]+)([KMG]?)"#,
        )
        .expect("listing row pattern is valid")
    })
}

impl ListingParser for RegexListingParser {
    fn parse(&self, html: &str) -> Vec<ListingEntry> {
        row_regex()
            .captures_iter(html)
            .filter_map(|caps| {
                let filename = caps.get(1)?.as_str().to_string();
                let amount: f64 = caps.get(2)?.as_str().parse().ok()?;
                let unit = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
                Some(ListingEntry {
                    filename,
                    size_kb: to_kilobytes(amount, unit),
                })
            })
            .collect()
    }
}

fn to_kilobytes(amount: f64, unit: &str) -> f64 {
    match unit.to_ascii_uppercase().as_str() {
        "K" => amount,
        "M" => amount * 1024.0,
        "G" => amount * 1024.0 * 1024.0,
        _ => amount / 1024.0,
    }
}

/// Drops entries at or below `MIN_IMAGE_KB`, then removes repeated
/// filenames keeping first-seen order.
pub fn filter_listing(entries: Vec<ListingEntry>) -> Vec<String> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| e.size_kb > MIN_IMAGE_KB)
        .filter_map(|e| seen.insert(e.filename.clone()).then_some(e.filename))
        .collect()
}
